use serde::{Deserialize, Serialize};

// ── Helper defaults for serde ──

fn default_true() -> bool {
    true
}

fn is_false(v: &bool) -> bool {
    !v
}

// ── Top-level DTO ──

/// Authoring form of a process model. Each scope (process, sub-process,
/// event sub-process) lists its own elements and flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDto {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub elements: Vec<ElementDto>,
    #[serde(default)]
    pub flows: Vec<FlowDto>,
}

// ── Flow ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDto {
    /// Derived as `<from>_to_<to>` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
}

impl FlowDto {
    pub fn flow_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}_to_{}", self.from, self.to))
    }
}

// ── Event definitions ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDto {
    Timer {
        duration_ms: u64,
        /// Extra fires of a non-interrupting timer after the first one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repetitions: Option<u32>,
    },
    Message {
        name: String,
        /// Expression evaluated against the instance variables.
        correlation_key: String,
    },
}

// ── Element (tagged enum) ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ElementDto {
    StartEvent {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<EventDto>,
        #[serde(default = "default_true")]
        interrupting: bool,
    },
    EndEvent {
        id: String,
        #[serde(default, skip_serializing_if = "is_false")]
        terminate: bool,
    },
    ServiceTask {
        id: String,
        job_type: String,
    },
    ExclusiveGateway {
        id: String,
    },
    ParallelGateway {
        id: String,
    },
    InclusiveGateway {
        id: String,
    },
    EventBasedGateway {
        id: String,
    },
    IntermediateCatchEvent {
        id: String,
        event: EventDto,
    },
    BoundaryEvent {
        id: String,
        attached_to: String,
        event: EventDto,
        #[serde(default = "default_true")]
        interrupting: bool,
    },
    SubProcess {
        id: String,
        elements: Vec<ElementDto>,
        #[serde(default)]
        flows: Vec<FlowDto>,
    },
    EventSubProcess {
        id: String,
        elements: Vec<ElementDto>,
        #[serde(default)]
        flows: Vec<FlowDto>,
    },
}

impl ElementDto {
    pub fn id(&self) -> &str {
        match self {
            ElementDto::StartEvent { id, .. }
            | ElementDto::EndEvent { id, .. }
            | ElementDto::ServiceTask { id, .. }
            | ElementDto::ExclusiveGateway { id }
            | ElementDto::ParallelGateway { id }
            | ElementDto::InclusiveGateway { id }
            | ElementDto::EventBasedGateway { id }
            | ElementDto::IntermediateCatchEvent { id, .. }
            | ElementDto::BoundaryEvent { id, .. }
            | ElementDto::SubProcess { id, .. }
            | ElementDto::EventSubProcess { id, .. } => id,
        }
    }

    /// Nested elements and flows for scope elements.
    pub fn scope(&self) -> Option<(&[ElementDto], &[FlowDto])> {
        match self {
            ElementDto::SubProcess {
                elements, flows, ..
            }
            | ElementDto::EventSubProcess {
                elements, flows, ..
            } => Some((elements, flows)),
            _ => None,
        }
    }
}
