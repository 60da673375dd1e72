use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─── Scalar aliases ───────────────────────────────────────────

/// Partition-scoped 64-bit entity key (process instance, element instance,
/// job, timer, subscription, message, incident).
pub type Key = u64;

/// Position of a record in the log. Strictly increasing, starts at 1.
pub type Position = u64;

/// Epoch milliseconds (UTC).
pub type Timestamp = i64;

/// Flat variable document of a process instance.
pub type Variables = BTreeMap<String, serde_json::Value>;

/// Number of bits reserved for the per-partition counter inside a key.
pub const KEY_BITS: u32 = 51;

// ─── Element types ────────────────────────────────────────────

/// The BPMN element type carried on every process instance record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BpmnElementType {
    Process,
    StartEvent,
    EndEvent,
    ServiceTask,
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    EventBasedGateway,
    IntermediateCatchEvent,
    BoundaryEvent,
    SubProcess,
    EventSubProcess,
    SequenceFlow,
}

impl BpmnElementType {
    /// Element types whose instances own child element instances.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BpmnElementType::Process | BpmnElementType::SubProcess | BpmnElementType::EventSubProcess
        )
    }
}

// ─── Lifecycle ────────────────────────────────────────────────

/// Lifecycle phase of an element instance.
///
/// `ACTIVATING → ACTIVATED → COMPLETING → COMPLETED`, with the orthogonal
/// `TERMINATING → TERMINATED` path reachable from `ACTIVATING` or `ACTIVATED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Activating,
    Activated,
    Completing,
    Completed,
    Terminating,
    Terminated,
}

impl LifecycleState {
    /// Not yet completed, terminated, or on the way there.
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Activating | LifecycleState::Activated)
    }

    /// Absorbing states. No transition leaves them.
    pub fn is_final(&self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Terminated)
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Activating, Activated)
                | (Activated, Completing)
                | (Completing, Completed)
                | (Activating, Terminating)
                | (Activated, Terminating)
                | (Terminating, Terminated)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Activating => "ACTIVATING",
            LifecycleState::Activated => "ACTIVATED",
            LifecycleState::Completing => "COMPLETING",
            LifecycleState::Completed => "COMPLETED",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_absorbing() {
        use LifecycleState::*;
        for from in [Completed, Terminated] {
            for to in [Activating, Activated, Completing, Completed, Terminating, Terminated] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_termination_reachable_only_from_active_states() {
        use LifecycleState::*;
        assert!(Activating.can_transition_to(Terminating));
        assert!(Activated.can_transition_to(Terminating));
        assert!(!Completing.can_transition_to(Terminating));
        assert!(!Terminating.can_transition_to(Terminating));
    }
}
