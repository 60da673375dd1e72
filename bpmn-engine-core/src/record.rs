use crate::types::*;
use serde::{Deserialize, Serialize};

// ─── Record envelope ──────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Command,
    Event,
    CommandRejection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    ProcessInstance,
    ProcessInstanceCreation,
    Job,
    Timer,
    Message,
    MessageSubscription,
    ProcessEvent,
    Incident,
    VariableDocument,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionType {
    InvalidState,
    NotFound,
    InvalidArgument,
}

/// Why a command was not applied. Carried by `COMMAND_REJECTION` records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub rejection_type: RejectionType,
    pub reason: String,
}

impl Rejection {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self {
            rejection_type: RejectionType::InvalidState,
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            rejection_type: RejectionType::NotFound,
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self {
            rejection_type: RejectionType::InvalidArgument,
            reason: reason.into(),
        }
    }
}

/// An immutable entry of the record log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub position: Position,
    /// Position of the record whose processing produced this one, 0 for
    /// externally submitted commands.
    pub source_record_position: Position,
    pub key: Option<Key>,
    pub timestamp: Timestamp,
    pub record_type: RecordType,
    pub intent: Intent,
    pub value: RecordValue,
    pub rejection: Option<Rejection>,
}

impl Record {
    pub fn value_type(&self) -> ValueType {
        self.intent.value_type()
    }

    pub fn is_command(&self) -> bool {
        self.record_type == RecordType::Command
    }

    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }

    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::CommandRejection
    }

    /// The process instance payload, if this is a process instance record.
    pub fn process_instance(&self) -> Option<&ProcessInstanceRecord> {
        match &self.value {
            RecordValue::ProcessInstance(value) => Some(value),
            _ => None,
        }
    }
}

/// A record produced by processing (or submitted from outside) that has not
/// been appended yet. The log assigns the position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FollowUpRecord {
    pub source_record_position: Position,
    pub key: Option<Key>,
    pub timestamp: Timestamp,
    pub record_type: RecordType,
    pub intent: Intent,
    pub value: RecordValue,
    pub rejection: Option<Rejection>,
}

impl FollowUpRecord {
    pub fn into_record(self, position: Position) -> Record {
        Record {
            position,
            source_record_position: self.source_record_position,
            key: self.key,
            timestamp: self.timestamp,
            record_type: self.record_type,
            intent: self.intent,
            value: self.value,
            rejection: self.rejection,
        }
    }
}

// ─── Intents ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceIntent {
    ActivateElement,
    CompleteElement,
    TerminateElement,
    Cancel,
    ElementActivating,
    ElementActivated,
    ElementCompleting,
    ElementCompleted,
    ElementTerminating,
    ElementTerminated,
    SequenceFlowTaken,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceCreationIntent {
    Create,
    Created,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobIntent {
    Complete,
    Created,
    Completed,
    Canceled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerIntent {
    Trigger,
    Created,
    Triggered,
    Canceled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageIntent {
    Publish,
    Expire,
    Published,
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSubscriptionIntent {
    Correlate,
    Opened,
    Correlating,
    Correlated,
    Deleted,
    /// A CORRELATE lost its race; the message is released for the instance.
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessEventIntent {
    Triggering,
    Triggered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentIntent {
    Resolve,
    Created,
    Resolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableDocumentIntent {
    Update,
    Updated,
}

/// Type-specific verb of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "intent", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    ProcessInstance(ProcessInstanceIntent),
    ProcessInstanceCreation(ProcessInstanceCreationIntent),
    Job(JobIntent),
    Timer(TimerIntent),
    Message(MessageIntent),
    MessageSubscription(MessageSubscriptionIntent),
    ProcessEvent(ProcessEventIntent),
    Incident(IncidentIntent),
    VariableDocument(VariableDocumentIntent),
}

impl Intent {
    pub fn value_type(&self) -> ValueType {
        match self {
            Intent::ProcessInstance(_) => ValueType::ProcessInstance,
            Intent::ProcessInstanceCreation(_) => ValueType::ProcessInstanceCreation,
            Intent::Job(_) => ValueType::Job,
            Intent::Timer(_) => ValueType::Timer,
            Intent::Message(_) => ValueType::Message,
            Intent::MessageSubscription(_) => ValueType::MessageSubscription,
            Intent::ProcessEvent(_) => ValueType::ProcessEvent,
            Intent::Incident(_) => ValueType::Incident,
            Intent::VariableDocument(_) => ValueType::VariableDocument,
        }
    }
}

// ─── Record values ────────────────────────────────────────────

/// The typed payload of a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordValue {
    ProcessInstance(ProcessInstanceRecord),
    ProcessInstanceCreation(ProcessInstanceCreationRecord),
    Job(JobRecord),
    Timer(TimerRecord),
    Message(MessageRecord),
    MessageSubscription(MessageSubscriptionRecord),
    ProcessEvent(ProcessEventRecord),
    Incident(IncidentRecord),
    VariableDocument(VariableDocumentRecord),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceRecord {
    pub bpmn_process_id: String,
    pub version: u32,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub bpmn_element_type: BpmnElementType,
    /// Parent element instance, `None` for the process instance itself.
    pub flow_scope_key: Option<Key>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceCreationRecord {
    pub bpmn_process_id: String,
    /// `None` selects the latest deployed version.
    pub version: Option<u32>,
    pub process_definition_key: Option<Key>,
    pub process_instance_key: Option<Key>,
    pub variables: Variables,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_type: String,
    pub process_instance_key: Key,
    pub element_instance_key: Key,
    pub element_id: String,
    pub bpmn_process_id: String,
    pub variables: Variables,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimerRecord {
    /// The element instance that owns the subscription.
    pub element_instance_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    /// The catch event, boundary event or event sub-process start event.
    pub target_element_id: String,
    pub due_date: Timestamp,
    /// Remaining fires after this one, `None` for a one-shot timer.
    pub repetitions: Option<u32>,
    pub interval_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub name: String,
    pub correlation_key: String,
    pub time_to_live_ms: u64,
    pub variables: Variables,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageSubscriptionRecord {
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub element_instance_key: Key,
    pub handler_element_id: String,
    pub message_name: String,
    pub correlation_key: String,
    pub interrupting: bool,
    /// Set once a message is correlating or correlated.
    pub message_key: Option<Key>,
    pub variables: Variables,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessEventRecord {
    pub scope_key: Key,
    pub target_element_id: String,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub interrupting: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// A sequence flow condition failed to evaluate or no flow could be taken.
    ConditionError,
    /// A correlation key could not be extracted from the variables.
    ExtractValueError,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub error_type: ErrorType,
    pub error_message: String,
    pub process_instance_key: Key,
    pub element_instance_key: Key,
    pub element_id: String,
    pub bpmn_process_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDocumentRecord {
    /// The process instance whose variables are updated.
    pub scope_key: Key,
    pub variables: Variables,
}

// ─── External commands ────────────────────────────────────────

/// A command submitted into the log from outside the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub key: Option<Key>,
    pub intent: Intent,
    pub value: RecordValue,
}

impl Command {
    pub fn create_instance(bpmn_process_id: impl Into<String>, variables: Variables) -> Self {
        Self {
            key: None,
            intent: Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Create),
            value: RecordValue::ProcessInstanceCreation(ProcessInstanceCreationRecord {
                bpmn_process_id: bpmn_process_id.into(),
                variables,
                ..Default::default()
            }),
        }
    }

    pub fn complete_job(job_key: Key, variables: Variables) -> Self {
        Self {
            key: Some(job_key),
            intent: Intent::Job(JobIntent::Complete),
            value: RecordValue::Job(JobRecord {
                job_type: String::new(),
                process_instance_key: 0,
                element_instance_key: 0,
                element_id: String::new(),
                bpmn_process_id: String::new(),
                variables,
            }),
        }
    }

    pub fn publish_message(
        name: impl Into<String>,
        correlation_key: impl Into<String>,
        time_to_live_ms: u64,
        variables: Variables,
    ) -> Self {
        Self {
            key: None,
            intent: Intent::Message(MessageIntent::Publish),
            value: RecordValue::Message(MessageRecord {
                name: name.into(),
                correlation_key: correlation_key.into(),
                time_to_live_ms,
                variables,
            }),
        }
    }

    /// Built by the due-date checker from the stored timer.
    pub fn trigger_timer(timer_key: Key, timer: TimerRecord) -> Self {
        Self {
            key: Some(timer_key),
            intent: Intent::Timer(TimerIntent::Trigger),
            value: RecordValue::Timer(timer),
        }
    }

    pub fn expire_message(message_key: Key, message: MessageRecord) -> Self {
        Self {
            key: Some(message_key),
            intent: Intent::Message(MessageIntent::Expire),
            value: RecordValue::Message(message),
        }
    }

    pub fn cancel_instance(process_instance_key: Key) -> Self {
        Self {
            key: Some(process_instance_key),
            intent: Intent::ProcessInstance(ProcessInstanceIntent::Cancel),
            value: RecordValue::ProcessInstance(ProcessInstanceRecord {
                bpmn_process_id: String::new(),
                version: 0,
                process_definition_key: 0,
                process_instance_key,
                element_id: String::new(),
                bpmn_element_type: BpmnElementType::Process,
                flow_scope_key: None,
            }),
        }
    }

    pub fn resolve_incident(incident_key: Key) -> Self {
        Self {
            key: Some(incident_key),
            intent: Intent::Incident(IncidentIntent::Resolve),
            value: RecordValue::Incident(IncidentRecord {
                error_type: ErrorType::ConditionError,
                error_message: String::new(),
                process_instance_key: 0,
                element_instance_key: 0,
                element_id: String::new(),
                bpmn_process_id: String::new(),
            }),
        }
    }

    pub fn update_variables(process_instance_key: Key, variables: Variables) -> Self {
        Self {
            key: Some(process_instance_key),
            intent: Intent::VariableDocument(VariableDocumentIntent::Update),
            value: RecordValue::VariableDocument(VariableDocumentRecord {
                scope_key: process_instance_key,
                variables,
            }),
        }
    }

    pub fn into_follow_up(self, timestamp: Timestamp) -> FollowUpRecord {
        FollowUpRecord {
            source_record_position: 0,
            key: self.key,
            timestamp,
            record_type: RecordType::Command,
            intent: self.intent,
            value: self.value,
            rejection: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_serializes_with_value_type() {
        let intent = Intent::ProcessInstance(ProcessInstanceIntent::SequenceFlowTaken);
        let json = serde_json::to_value(intent).unwrap();
        assert_eq!(json["value_type"], "PROCESS_INSTANCE");
        assert_eq!(json["intent"], "SEQUENCE_FLOW_TAKEN");
        assert_eq!(intent.value_type(), ValueType::ProcessInstance);
    }

    #[test]
    fn test_external_command_has_no_source() {
        let record = Command::cancel_instance(7).into_follow_up(1_000).into_record(3);
        assert_eq!(record.position, 3);
        assert_eq!(record.source_record_position, 0);
        assert_eq!(record.key, Some(7));
        assert!(record.is_command());
        assert_eq!(record.value_type(), ValueType::ProcessInstance);
    }
}
