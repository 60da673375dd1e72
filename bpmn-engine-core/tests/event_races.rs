mod common;

use bpmn_engine_core::record::*;
use bpmn_engine_core::*;
use common::*;
use serde_json::json;

use ProcessInstanceIntent::{ElementActivating, ElementCompleted};

#[tokio::test]
async fn test_equal_timers_on_event_gateway_trigger_once() {
    let mut h = Harness::new(&[EQUAL_TIMERS]).await;
    let (pi, records) = h.create("equal_timers", json!({})).await;
    assert_eq!(events_of(&records, Intent::Timer(TimerIntent::Created)).len(), 2);

    // not due yet
    assert!(h.advance(999).await.is_empty());

    let records = h.advance(1).await;
    assert_eq!(events_of(&records, Intent::Timer(TimerIntent::Triggered)).len(), 1);

    let rejected = rejections_of(&records, Intent::Timer(TimerIntent::Trigger));
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejection_type(rejected[0]), RejectionType::InvalidState);

    let canceled = events_of(&records, Intent::Timer(TimerIntent::Canceled));
    assert_eq!(canceled.len(), 1);
    assert_eq!(canceled[0].key, rejected[0].key);

    assert_eq!(count_element(&records, "end_1", ElementCompleted), 1);
    assert_eq!(count_element(&records, "timer_2", ElementActivating), 0);
    assert_eq!(count_element(&records, "end_2", ElementActivating), 0);
    assert_eq!(h.element_state(pi), LifecycleState::Completed);
    assert!(h.partition.state().subscriptions.next_due_date().is_none());
}

#[tokio::test]
async fn test_event_gateway_trigger_is_written_before_completion() {
    let mut h = Harness::new(&[EQUAL_TIMERS]).await;
    h.create("equal_timers", json!({})).await;
    let records = h.advance(1000).await;

    let triggering = events_of(&records, Intent::ProcessEvent(ProcessEventIntent::Triggering));
    let triggered = events_of(&records, Intent::ProcessEvent(ProcessEventIntent::Triggered));
    assert_eq!(triggering.len(), 1);
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggering[0].key, triggered[0].key);

    let gateway_completed = position_of(&records, "race", ElementCompleted);
    assert!(triggering[0].position < gateway_completed);
    assert!(triggered[0].position > gateway_completed);
    assert!(triggered[0].position < position_of(&records, "timer_1", ElementActivating));
}

#[tokio::test]
async fn test_non_interrupting_event_sub_process_correlates_every_message() {
    let mut h = Harness::new(&[NOTES]).await;
    let (pi, records) = h.create("notes", json!({ "order_id": "o-1" })).await;
    assert_eq!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Opened)).len(),
        1
    );

    h.publish("note", "o-1", 0).await;
    h.publish("note", "o-1", 0).await;

    let records = h.records().await;
    let correlated = events_of(
        &records,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlated),
    );
    assert_eq!(correlated.len(), 2);
    assert_eq!(count_element(&records, "on_note", ElementCompleted), 2);
    assert_eq!(count_element(&records, "note_end", ElementCompleted), 2);
    assert_eq!(h.element_state(pi), LifecycleState::Activated);

    // a message with another correlation key is not correlated
    let records = h.publish("note", "o-2", 0).await;
    assert!(events_of(
        &records,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlating)
    )
    .is_empty());

    let records = h.complete_job("work", json!({})).await;
    assert_eq!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Deleted)).len(),
        1
    );
    assert_eq!(count_element(&records, "notes", ElementCompleted), 1);
}

#[tokio::test]
async fn test_simultaneous_messages_reach_both_event_gateways() {
    let mut h = Harness::new(&[TWO_GATEWAYS]).await;
    let (pi, _) = h.create("two_gateways", json!({ "id": "k-1" })).await;

    let records = h
        .submit_all(vec![
            Command::publish_message("ping", "k-1", 0, Variables::new()),
            Command::publish_message("ping", "k-1", 0, Variables::new()),
        ])
        .await;

    let correlated = events_of(
        &records,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlated),
    );
    assert_eq!(correlated.len(), 2);
    assert_ne!(correlated[0].key, correlated[1].key);

    let message_keys: Vec<_> = correlated
        .iter()
        .filter_map(|r| match &r.value {
            RecordValue::MessageSubscription(sub) => sub.message_key,
            _ => None,
        })
        .collect();
    assert_eq!(message_keys.len(), 2);
    assert_ne!(message_keys[0], message_keys[1]);

    assert_eq!(count_element(&records, "end_1", ElementCompleted), 1);
    assert_eq!(count_element(&records, "end_2", ElementCompleted), 1);
    assert_eq!(events_of(&records, Intent::Timer(TimerIntent::Canceled)).len(), 2);
    assert_eq!(count_element(&records, "two_gateways", ElementCompleted), 1);
    assert_eq!(h.element_state(pi), LifecycleState::Completed);
}

#[tokio::test]
async fn test_one_message_correlates_once_per_instance() {
    let mut h = Harness::new(&[TWO_GATEWAYS]).await;
    let (pi, _) = h.create("two_gateways", json!({ "id": "k-1" })).await;

    let records = h.publish("ping", "k-1", 0).await;
    assert_eq!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Correlated))
            .len(),
        1
    );
    assert_eq!(count_element(&records, "end_1", ElementCompleted), 1);
    assert_eq!(count_element(&records, "end_2", ElementCompleted), 0);
    assert_eq!(h.element_state(pi), LifecycleState::Activated);
}

#[tokio::test]
async fn test_buffered_message_correlates_when_subscription_opens() {
    let mut h = Harness::new(&[PAYMENT]).await;

    let records = h.publish("payment", "o-1", 10_000).await;
    assert_eq!(events_of(&records, Intent::Message(MessageIntent::Published)).len(), 1);
    assert_eq!(h.partition.state().messages.expired(START + 10_000).len(), 1);

    let (pi, records) = h.create("payment", json!({ "order_id": "o-1" })).await;
    assert_eq!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Correlated))
            .len(),
        1
    );
    assert_eq!(count_element(&records, "end", ElementCompleted), 1);
    assert_eq!(h.element_state(pi), LifecycleState::Completed);
}

#[tokio::test]
async fn test_buffered_message_expires_after_time_to_live() {
    let mut h = Harness::new(&[PAYMENT]).await;
    let published = h.publish("payment", "o-1", 10_000).await;
    let message_key = events_of(&published, Intent::Message(MessageIntent::Published))[0].key;

    assert!(h.advance(9_999).await.is_empty());
    let records = h.advance(1).await;
    let expired = events_of(&records, Intent::Message(MessageIntent::Expired));
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].key, message_key);

    // arrives too late for a new instance
    let (pi, records) = h.create("payment", json!({ "order_id": "o-1" })).await;
    assert!(events_of(
        &records,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlating)
    )
    .is_empty());
    assert_eq!(h.element_state(pi), LifecycleState::Activated);
}

#[tokio::test]
async fn test_message_without_time_to_live_is_not_buffered() {
    let mut h = Harness::new(&[PAYMENT]).await;
    h.publish("payment", "o-1", 0).await;

    let (pi, _) = h.create("payment", json!({ "order_id": "o-1" })).await;
    assert_eq!(h.element_state(pi), LifecycleState::Activated);

    let records = h.publish("payment", "o-1", 0).await;
    assert_eq!(count_element(&records, "end", ElementCompleted), 1);
    assert_eq!(h.element_state(pi), LifecycleState::Completed);
}

#[tokio::test]
async fn test_missing_correlation_key_raises_incident() {
    let mut h = Harness::new(&[PAYMENT]).await;
    let (pi, records) = h.create("payment", json!({})).await;

    let incidents = events_of(&records, Intent::Incident(IncidentIntent::Created));
    assert_eq!(incidents.len(), 1);
    let RecordValue::Incident(incident) = &incidents[0].value else {
        panic!("incident record expected");
    };
    assert_eq!(incident.error_type, ErrorType::ExtractValueError);
    assert_eq!(incident.element_id, "wait_for_payment");
    let incident_key = incidents[0].key.unwrap();

    h.execute(Command::update_variables(pi, vars(json!({ "order_id": "o-7" }))))
        .await;
    let records = h.execute(Command::resolve_incident(incident_key)).await;
    assert_eq!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Opened)).len(),
        1
    );

    let records = h.publish("payment", "o-7", 0).await;
    assert_eq!(count_element(&records, "payment", ElementCompleted), 1);
}

#[tokio::test]
async fn test_timer_cycle_on_non_interrupting_boundary() {
    let mut h = Harness::new(&[REMINDERS]).await;
    let (pi, _) = h.create("reminders", json!({})).await;

    let mut fired = 0;
    let mut recreated = 0;
    for _ in 0..4 {
        let records = h.advance(1000).await;
        fired += events_of(&records, Intent::Timer(TimerIntent::Triggered)).len();
        recreated += events_of(&records, Intent::Timer(TimerIntent::Created)).len();
    }
    assert_eq!(fired, 3);
    assert_eq!(recreated, 2);

    let records = h.records().await;
    assert_eq!(count_element(&records, "remind", ElementCompleted), 3);
    assert_eq!(count_element(&records, "reminded", ElementCompleted), 3);
    assert_eq!(h.element_state(pi), LifecycleState::Activated);

    let records = h.complete_job("slow", json!({})).await;
    assert_eq!(count_element(&records, "end", ElementCompleted), 1);
    assert_eq!(h.element_state(pi), LifecycleState::Completed);
}

#[tokio::test]
async fn test_completing_task_cancels_open_timer_cycle() {
    let mut h = Harness::new(&[REMINDERS]).await;
    let (pi, _) = h.create("reminders", json!({})).await;
    h.advance(1000).await;

    let records = h.complete_job("slow", json!({})).await;
    assert_eq!(events_of(&records, Intent::Timer(TimerIntent::Canceled)).len(), 1);
    assert_eq!(h.element_state(pi), LifecycleState::Completed);
    assert!(h.advance(5000).await.is_empty());
}

#[tokio::test]
async fn test_rejected_correlation_moves_message_to_next_subscription() {
    let mut h = Harness::new(&[TWO_GATEWAYS]).await;
    let (pi, records) = h.create("two_gateways", json!({ "id": "k-1" })).await;
    let gateway_1 = element_events(&records, "gateway_1", ElementActivating)[0]
        .key
        .unwrap();
    let timeout_1 = h
        .partition
        .state()
        .subscriptions
        .open_timers_of(gateway_1)
        .into_iter()
        .find(|timer| timer.record.target_element_id == "timeout_1")
        .cloned()
        .unwrap();

    // the timer wins gateway_1 while the message is still correlating there
    h.clock.advance(60_000);
    let records = h
        .submit_all(vec![
            Command::publish_message("ping", "k-1", 600_000, Variables::new()),
            Command::trigger_timer(timeout_1.key, timeout_1.record.clone()),
        ])
        .await;

    let rejected = rejections_of(
        &records,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlate),
    );
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejection_type(rejected[0]), RejectionType::InvalidState);
    assert_eq!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Rejected)).len(),
        1
    );
    assert_eq!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Correlated)).len(),
        1
    );

    assert_eq!(count_element(&records, "late_1", ElementCompleted), 1);
    assert_eq!(count_element(&records, "ping_1", ElementActivating), 0);
    assert_eq!(count_element(&records, "ping_2", ElementActivating), 1);
    assert_eq!(count_element(&records, "end_2", ElementCompleted), 1);
    assert_eq!(count_element(&records, "late_2", ElementActivating), 0);
    assert_eq!(h.element_state(pi), LifecycleState::Completed);
}

#[tokio::test]
async fn test_correlation_to_removed_subscription_is_rejected() {
    let commands = |pi| {
        vec![
            Command::publish_message("payment", "o-1", 0, Variables::new()),
            Command::cancel_instance(pi),
        ]
    };

    let mut first = Harness::new(&[PAYMENT]).await;
    let (pi, _) = first.create("payment", json!({ "order_id": "o-1" })).await;
    let records = first.submit_all(commands(pi)).await;

    let rejected = rejections_of(
        &records,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlate),
    );
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejection_type(rejected[0]), RejectionType::InvalidState);
    assert!(
        events_of(&records, Intent::MessageSubscription(MessageSubscriptionIntent::Correlated))
            .is_empty()
    );
    assert_eq!(count_element(&records, "end", ElementActivating), 0);
    assert_eq!(first.element_state(pi), LifecycleState::Terminated);

    let mut second = Harness::new(&[PAYMENT]).await;
    let (pi, _) = second.create("payment", json!({ "order_id": "o-1" })).await;
    second.submit_all(commands(pi)).await;
    assert_eq!(first.records().await, second.records().await);
    assert_eq!(
        first.partition.state().fingerprint(),
        second.partition.state().fingerprint()
    );
}
