#![allow(dead_code)]

use bpmn_engine_core::record::*;
use bpmn_engine_core::*;
use serde_json::Value;
use std::sync::Arc;

pub const START: i64 = 1_700_000_000_000;

// ─── Harness ──────────────────────────────────────────────────

/// One partition over an in-memory log with a controlled clock.
pub struct Harness {
    pub partition: Partition,
    pub repository: Arc<ProcessRepository>,
    pub log: Arc<MemoryLog>,
    pub clock: Arc<ControlledClock>,
}

impl Harness {
    pub async fn new(models: &[&str]) -> Self {
        Self::with_log(models, MemoryLog::new()).await
    }

    /// Open a partition over an existing log (recovery).
    pub async fn with_log(models: &[&str], log: MemoryLog) -> Self {
        let repository = Arc::new(ProcessRepository::new());
        for model in models {
            repository.deploy_yaml(model).expect("model deploys");
        }
        let clock = Arc::new(ControlledClock::new(START));
        let log = Arc::new(log);
        let partition = Partition::open(
            EngineConfig::default(),
            repository.clone(),
            Arc::new(SimpleExpressionEvaluator::new()),
            log.clone(),
            clock.clone(),
        )
        .await
        .expect("partition opens");
        Self {
            partition,
            repository,
            log,
            clock,
        }
    }

    pub async fn execute(&mut self, command: Command) -> Vec<Record> {
        self.partition.execute(command).await.expect("command processed")
    }

    /// Create an instance and return its key with the records written.
    pub async fn create(&mut self, process_id: &str, variables: Value) -> (Key, Vec<Record>) {
        let records = self
            .execute(Command::create_instance(process_id, vars(variables)))
            .await;
        let key = records
            .iter()
            .find(|r| {
                r.intent == Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Created)
            })
            .and_then(|r| r.key)
            .expect("instance created");
        (key, records)
    }

    pub fn job_key(&self, job_type: &str) -> Key {
        self.partition
            .state()
            .jobs
            .activatable()
            .find(|job| job.record.job_type == job_type)
            .map(|job| job.key)
            .unwrap_or_else(|| panic!("no activatable job of type '{job_type}'"))
    }

    pub async fn complete_job(&mut self, job_type: &str, variables: Value) -> Vec<Record> {
        let job_key = self.job_key(job_type);
        self.execute(Command::complete_job(job_key, vars(variables))).await
    }

    pub async fn publish(&mut self, name: &str, correlation_key: &str, ttl_ms: u64) -> Vec<Record> {
        self.execute(Command::publish_message(name, correlation_key, ttl_ms, Variables::new()))
            .await
    }

    /// Move the clock and process everything that became due.
    pub async fn advance(&mut self, millis: i64) -> Vec<Record> {
        self.clock.advance(millis);
        self.partition.tick().await.expect("due dates processed")
    }

    /// Append several commands before processing any of them.
    pub async fn submit_all(&mut self, commands: Vec<Command>) -> Vec<Record> {
        let first = self.partition.log().last_position().await.unwrap() + 1;
        for command in commands {
            self.partition.submit(command).await.unwrap();
        }
        self.partition.run_until_idle().await.unwrap();
        self.partition.log().read_from(first).await.unwrap()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.log.snapshot().await
    }

    pub fn element_state(&self, key: Key) -> LifecycleState {
        self.partition
            .state()
            .element_instances
            .get(key)
            .map(|instance| instance.state)
            .expect("element instance exists")
    }
}

pub fn vars(value: Value) -> Variables {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Variables::new(),
    }
}

// ─── Record queries ───────────────────────────────────────────

/// Process instance events of `element_id` with the given intent.
pub fn element_events<'r>(
    records: &'r [Record],
    element_id: &str,
    intent: ProcessInstanceIntent,
) -> Vec<&'r Record> {
    records
        .iter()
        .filter(|r| r.is_event() && r.intent == Intent::ProcessInstance(intent))
        .filter(|r| r.process_instance().is_some_and(|v| v.element_id == element_id))
        .collect()
}

pub fn count_element(records: &[Record], element_id: &str, intent: ProcessInstanceIntent) -> usize {
    element_events(records, element_id, intent).len()
}

pub fn events_of(records: &[Record], intent: Intent) -> Vec<&Record> {
    records
        .iter()
        .filter(|r| r.is_event() && r.intent == intent)
        .collect()
}

pub fn rejections_of(records: &[Record], intent: Intent) -> Vec<&Record> {
    records
        .iter()
        .filter(|r| r.is_rejection() && r.intent == intent)
        .collect()
}

pub fn rejection_type(record: &Record) -> RejectionType {
    record
        .rejection
        .as_ref()
        .map(|r| r.rejection_type)
        .expect("record is a rejection")
}

/// Position of the first process instance event matching `element_id` and `intent`.
pub fn position_of(records: &[Record], element_id: &str, intent: ProcessInstanceIntent) -> Position {
    element_events(records, element_id, intent)
        .first()
        .map(|r| r.position)
        .unwrap_or_else(|| panic!("no {intent:?} for '{element_id}'"))
}

// ─── Models ───────────────────────────────────────────────────

pub const EXCLUSIVE: &str = r#"
id: exclusive
elements:
  - kind: StartEvent
    id: start
  - kind: ExclusiveGateway
    id: route
  - kind: EndEvent
    id: end_a
  - kind: EndEvent
    id: end_b
  - kind: EndEvent
    id: end_c
flows:
  - from: start
    to: route
  - from: route
    to: end_a
    condition: "foo < 5"
  - from: route
    to: end_b
    condition: "foo >= 5 && foo < 10"
  - from: route
    to: end_c
    default: true
"#;

pub const FORK_JOIN: &str = r#"
id: fork_join
elements:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: ServiceTask
    id: task_1
    job_type: type1
  - kind: ServiceTask
    id: task_2
    job_type: type2
  - kind: ParallelGateway
    id: join
  - kind: EndEvent
    id: end
flows:
  - from: start
    to: fork
  - from: fork
    to: task_1
  - from: fork
    to: task_2
  - from: task_1
    to: join
  - from: task_2
    to: join
  - from: join
    to: end
"#;

pub const FORK_NO_JOIN: &str = r#"
id: fork_no_join
elements:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: ServiceTask
    id: task_1
    job_type: type1
  - kind: ServiceTask
    id: task_2
    job_type: type2
  - kind: EndEvent
    id: end_1
  - kind: EndEvent
    id: end_2
flows:
  - from: start
    to: fork
  - from: fork
    to: task_1
  - from: fork
    to: task_2
  - from: task_1
    to: end_1
  - from: task_2
    to: end_2
"#;

/// Two tokens can reach each side of the join through exclusive merges.
pub const MERGED_JOIN: &str = r#"
id: merged_join
elements:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: ServiceTask
    id: a_1
    job_type: a1
  - kind: ServiceTask
    id: a_2
    job_type: a2
  - kind: ServiceTask
    id: b_1
    job_type: b1
  - kind: ServiceTask
    id: b_2
    job_type: b2
  - kind: ExclusiveGateway
    id: merge_a
  - kind: ExclusiveGateway
    id: merge_b
  - kind: ParallelGateway
    id: join
  - kind: EndEvent
    id: end
flows:
  - from: start
    to: fork
  - from: fork
    to: a_1
  - from: fork
    to: a_2
  - from: fork
    to: b_1
  - from: fork
    to: b_2
  - from: a_1
    to: merge_a
  - from: a_2
    to: merge_a
  - from: b_1
    to: merge_b
  - from: b_2
    to: merge_b
  - from: merge_a
    to: join
  - from: merge_b
    to: join
  - from: join
    to: end
"#;

pub const EQUAL_TIMERS: &str = r#"
id: equal_timers
elements:
  - kind: StartEvent
    id: start
  - kind: EventBasedGateway
    id: race
  - kind: IntermediateCatchEvent
    id: timer_1
    event:
      type: timer
      duration_ms: 1000
  - kind: IntermediateCatchEvent
    id: timer_2
    event:
      type: timer
      duration_ms: 1000
  - kind: EndEvent
    id: end_1
  - kind: EndEvent
    id: end_2
flows:
  - from: start
    to: race
  - from: race
    to: timer_1
  - from: race
    to: timer_2
  - from: timer_1
    to: end_1
  - from: timer_2
    to: end_2
"#;

pub const NOTES: &str = r#"
id: notes
elements:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: work
    job_type: work
  - kind: EndEvent
    id: end
  - kind: EventSubProcess
    id: on_note
    elements:
      - kind: StartEvent
        id: note_start
        interrupting: false
        event:
          type: message
          name: note
          correlation_key: order_id
      - kind: EndEvent
        id: note_end
    flows:
      - from: note_start
        to: note_end
flows:
  - from: start
    to: work
  - from: work
    to: end
"#;

pub const ABORTABLE: &str = r#"
id: abortable
elements:
  - kind: StartEvent
    id: start
  - kind: SubProcess
    id: sub
    elements:
      - kind: StartEvent
        id: sub_start
      - kind: ServiceTask
        id: sub_task
        job_type: inner
      - kind: EndEvent
        id: sub_end
    flows:
      - from: sub_start
        to: sub_task
      - from: sub_task
        to: sub_end
  - kind: EndEvent
    id: end
  - kind: EventSubProcess
    id: abort
    elements:
      - kind: StartEvent
        id: abort_start
        event:
          type: message
          name: abort
          correlation_key: order_id
      - kind: EndEvent
        id: aborted
    flows:
      - from: abort_start
        to: aborted
flows:
  - from: start
    to: sub
  - from: sub
    to: end
"#;

pub const TIMEOUT: &str = r#"
id: timeout
elements:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: task
    job_type: slow
  - kind: BoundaryEvent
    id: timed_out
    attached_to: task
    event:
      type: timer
      duration_ms: 5000
  - kind: EndEvent
    id: end
  - kind: EndEvent
    id: timeout_end
flows:
  - from: start
    to: task
  - from: task
    to: end
  - from: timed_out
    to: timeout_end
"#;

pub const REMINDERS: &str = r#"
id: reminders
elements:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: task
    job_type: slow
  - kind: BoundaryEvent
    id: remind
    attached_to: task
    interrupting: false
    event:
      type: timer
      duration_ms: 1000
      repetitions: 2
  - kind: EndEvent
    id: end
  - kind: EndEvent
    id: reminded
flows:
  - from: start
    to: task
  - from: task
    to: end
  - from: remind
    to: reminded
"#;

pub const TERMINATE_END: &str = r#"
id: terminate_end
elements:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: ServiceTask
    id: task
    job_type: work
  - kind: EndEvent
    id: end
  - kind: EndEvent
    id: kill
    terminate: true
flows:
  - from: start
    to: fork
  - from: fork
    to: task
  - from: fork
    to: kill
  - from: task
    to: end
"#;

pub const PAYMENT: &str = r#"
id: payment
elements:
  - kind: StartEvent
    id: start
  - kind: IntermediateCatchEvent
    id: wait_for_payment
    event:
      type: message
      name: payment
      correlation_key: order_id
  - kind: EndEvent
    id: end
flows:
  - from: start
    to: wait_for_payment
  - from: wait_for_payment
    to: end
"#;

pub const TWO_GATEWAYS: &str = r#"
id: two_gateways
elements:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: EventBasedGateway
    id: gateway_1
  - kind: IntermediateCatchEvent
    id: ping_1
    event:
      type: message
      name: ping
      correlation_key: id
  - kind: IntermediateCatchEvent
    id: timeout_1
    event:
      type: timer
      duration_ms: 60000
  - kind: EventBasedGateway
    id: gateway_2
  - kind: IntermediateCatchEvent
    id: ping_2
    event:
      type: message
      name: ping
      correlation_key: id
  - kind: IntermediateCatchEvent
    id: timeout_2
    event:
      type: timer
      duration_ms: 60000
  - kind: EndEvent
    id: end_1
  - kind: EndEvent
    id: end_2
  - kind: EndEvent
    id: late_1
  - kind: EndEvent
    id: late_2
flows:
  - from: start
    to: fork
  - from: fork
    to: gateway_1
  - from: fork
    to: gateway_2
  - from: gateway_1
    to: ping_1
  - from: gateway_1
    to: timeout_1
  - from: gateway_2
    to: ping_2
  - from: gateway_2
    to: timeout_2
  - from: ping_1
    to: end_1
  - from: timeout_1
    to: late_1
  - from: ping_2
    to: end_2
  - from: timeout_2
    to: late_2
"#;

pub const APPROVAL: &str = r#"
id: approval
elements:
  - kind: StartEvent
    id: start
  - kind: ExclusiveGateway
    id: check
  - kind: EndEvent
    id: approved
  - kind: EndEvent
    id: rejected
flows:
  - from: start
    to: check
  - from: check
    to: approved
    condition: "amount > 100"
  - from: check
    to: rejected
    condition: "amount <= 100"
"#;

/// An interrupting message boundary event on a service task.
pub const ESCALATION: &str = r#"
id: escalation
elements:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: task
    job_type: support
  - kind: BoundaryEvent
    id: escalate
    attached_to: task
    event:
      type: message
      name: escalate
      correlation_key: ticket
  - kind: EndEvent
    id: end
  - kind: EndEvent
    id: escalated
flows:
  - from: start
    to: task
  - from: task
    to: end
  - from: escalate
    to: escalated
"#;

/// An interrupting timer boundary event on a sub-process.
pub const SUB_DEADLINE: &str = r#"
id: sub_deadline
elements:
  - kind: StartEvent
    id: start
  - kind: SubProcess
    id: sub
    elements:
      - kind: StartEvent
        id: inner_start
      - kind: ServiceTask
        id: inner_task
        job_type: inner
      - kind: EndEvent
        id: inner_end
    flows:
      - from: inner_start
        to: inner_task
      - from: inner_task
        to: inner_end
  - kind: BoundaryEvent
    id: deadline
    attached_to: sub
    event:
      type: timer
      duration_ms: 2000
  - kind: EndEvent
    id: end
  - kind: EndEvent
    id: expired
flows:
  - from: start
    to: sub
  - from: sub
    to: end
  - from: deadline
    to: expired
"#;

/// The default flow keeps a condition on a variable that is never set.
pub const INCLUSIVE_SPLIT: &str = r#"
id: inclusive_split
elements:
  - kind: StartEvent
    id: start
  - kind: InclusiveGateway
    id: split
  - kind: EndEvent
    id: end_a
  - kind: EndEvent
    id: end_b
  - kind: EndEvent
    id: end_c
flows:
  - from: start
    to: split
  - from: split
    to: end_a
    condition: "a > 0"
  - from: split
    to: end_b
    condition: "b > 0"
  - from: split
    to: end_c
    default: true
    condition: "unset > 0"
"#;

pub const INCLUSIVE_JOIN: &str = r#"
id: inclusive_join
elements:
  - kind: StartEvent
    id: start
  - kind: InclusiveGateway
    id: split
  - kind: ServiceTask
    id: task_a
    job_type: a
  - kind: ServiceTask
    id: task_b
    job_type: b
  - kind: InclusiveGateway
    id: join
  - kind: EndEvent
    id: end
flows:
  - from: start
    to: split
  - from: split
    to: task_a
    condition: "a > 0"
  - from: split
    to: task_b
    condition: "b > 0"
  - from: task_a
    to: join
  - from: task_b
    to: join
  - from: join
    to: end
"#;

pub const ALL_MODELS: &[&str] = &[
    EXCLUSIVE,
    FORK_JOIN,
    FORK_NO_JOIN,
    MERGED_JOIN,
    EQUAL_TIMERS,
    NOTES,
    ABORTABLE,
    TIMEOUT,
    REMINDERS,
    TERMINATE_END,
    PAYMENT,
    TWO_GATEWAYS,
    APPROVAL,
];
