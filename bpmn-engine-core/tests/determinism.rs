mod common;

use bpmn_engine_core::record::*;
use bpmn_engine_core::*;
use common::*;
use serde_json::json;
use std::time::Duration;

use ProcessInstanceIntent::ElementCompleted;

async fn play_first_half(h: &mut Harness) {
    h.create("fork_join", json!({})).await;
    h.create("reminders", json!({})).await;
    h.create("abortable", json!({ "order_id": "o-1" })).await;
    h.create("payment", json!({ "order_id": "o-2" })).await;
    h.advance(1000).await;
    h.complete_job("type1", json!({ "a": 1 })).await;
}

async fn play_second_half(h: &mut Harness) {
    h.publish("abort", "o-1", 0).await;
    h.publish("payment", "o-2", 5_000).await;
    h.advance(1000).await;
    h.complete_job("type2", json!({})).await;
    h.complete_job("slow", json!({ "b": [1, 2] })).await;
    h.create("exclusive", json!({ "foo": 9 })).await;
}

async fn play(h: &mut Harness) {
    play_first_half(h).await;
    play_second_half(h).await;
}

#[tokio::test]
async fn test_same_commands_produce_same_records() {
    let mut first = Harness::new(ALL_MODELS).await;
    let mut second = Harness::new(ALL_MODELS).await;
    play(&mut first).await;
    play(&mut second).await;

    let records = first.records().await;
    assert!(records.len() > 50);
    assert_eq!(records, second.records().await);
    assert_eq!(
        first.partition.state().fingerprint(),
        second.partition.state().fingerprint()
    );
}

#[tokio::test]
async fn test_replaying_the_log_rebuilds_the_state() {
    let mut live = Harness::new(ALL_MODELS).await;
    play(&mut live).await;

    let replayed = Harness::with_log(ALL_MODELS, MemoryLog::from_records(live.records().await)).await;
    assert_eq!(
        replayed.partition.state().fingerprint(),
        live.partition.state().fingerprint()
    );
    assert_eq!(replayed.records().await, live.records().await);
}

#[tokio::test]
async fn test_recovered_partition_continues_where_it_stopped() {
    let mut uninterrupted = Harness::new(ALL_MODELS).await;
    play(&mut uninterrupted).await;

    let mut before = Harness::new(ALL_MODELS).await;
    play_first_half(&mut before).await;

    let mut after = Harness::with_log(ALL_MODELS, MemoryLog::from_records(before.records().await)).await;
    after.clock.set(before.clock.now());
    assert_eq!(
        after.partition.state().fingerprint(),
        before.partition.state().fingerprint()
    );
    play_second_half(&mut after).await;

    assert_eq!(after.records().await, uninterrupted.records().await);
    assert_eq!(
        after.partition.state().fingerprint(),
        uninterrupted.partition.state().fingerprint()
    );
}

#[tokio::test]
async fn test_unprocessed_command_is_processed_after_recovery() {
    let before = Harness::new(&[EXCLUSIVE]).await;
    before
        .partition
        .submit(Command::create_instance("exclusive", vars(json!({ "foo": 4 }))))
        .await
        .unwrap();

    let mut after = Harness::with_log(&[EXCLUSIVE], MemoryLog::from_records(before.records().await)).await;
    assert_eq!(after.partition.state().element_instances.instances().count(), 0);

    let records = after.partition.run_until_idle().await.unwrap();
    assert_eq!(count_element(&records, "end_a", ElementCompleted), 1);
    assert_eq!(count_element(&records, "exclusive", ElementCompleted), 1);
}

#[tokio::test]
async fn test_keys_are_unique_and_prefixed_with_the_partition() {
    let mut h = Harness::new(ALL_MODELS).await;
    play(&mut h).await;

    let records = h.records().await;
    let mut created: Vec<Key> = records
        .iter()
        .filter(|r| {
            r.is_event()
                && matches!(
                    r.intent,
                    Intent::ProcessInstance(ProcessInstanceIntent::ElementActivating)
                        | Intent::Job(JobIntent::Created)
                        | Intent::Timer(TimerIntent::Created)
                        | Intent::MessageSubscription(MessageSubscriptionIntent::Opened)
                )
        })
        .filter_map(|r| r.key)
        .collect();
    let total = created.len();
    created.sort_unstable();
    created.dedup();
    assert_eq!(created.len(), total);
    assert!(created
        .iter()
        .all(|key| key >> KEY_BITS == u64::from(EngineConfig::default().partition_id)));

    let positions: Vec<Position> = records.iter().map(|r| r.position).collect();
    let expected: Vec<Position> = (1..=records.len() as Position).collect();
    assert_eq!(positions, expected);
}

#[tokio::test]
async fn test_spawned_partition_processes_commands() {
    let h = Harness::new(&[EXCLUSIVE]).await;
    let handle = h.partition.spawn();

    let records = handle
        .execute(Command::create_instance("exclusive", vars(json!({ "foo": 4 }))))
        .await
        .unwrap();
    assert_eq!(count_element(&records, "end_a", ElementCompleted), 1);

    let fingerprint = handle.fingerprint().await.unwrap();
    assert_eq!(fingerprint.len(), 64);
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_spawned_partition_fires_due_timers() {
    let h = Harness::new(&[EQUAL_TIMERS]).await;
    let log = h.log.clone();
    let clock = h.clock.clone();
    let handle = h.partition.spawn();

    handle
        .execute(Command::create_instance("equal_timers", Variables::new()))
        .await
        .unwrap();
    clock.advance(1000);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let records = log.snapshot().await;
    assert_eq!(events_of(&records, Intent::Timer(TimerIntent::Triggered)).len(), 1);
    assert_eq!(count_element(&records, "equal_timers", ElementCompleted), 1);
    handle.shutdown().await.unwrap();
}
