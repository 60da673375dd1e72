use crate::record::ProcessInstanceRecord;
use crate::types::{Key, LifecycleState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A triggered event waiting to be handled by its owning element instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    /// Key of the `PROCESS_EVENT` records describing this trigger.
    pub event_key: Key,
    /// The catch event, boundary event or event sub-process start event.
    pub target_element_id: String,
    pub interrupting: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementInstance {
    pub key: Key,
    pub state: LifecycleState,
    pub value: ProcessInstanceRecord,
    /// Child element instances not yet completed or terminated.
    pub active_children: u32,
    /// Sequence flows taken inside this scope whose target is not activated yet.
    pub active_sequence_flows: u32,
    /// Join element id → incoming flow id → tokens waiting on that flow.
    pub taken_sequence_flows: BTreeMap<String, BTreeMap<String, u32>>,
    /// Target element id → taken flows whose target is not activated yet.
    /// Joins are tracked in `taken_sequence_flows` instead.
    pub tokens_in_flight: BTreeMap<String, u32>,
    pub job_key: Option<Key>,
    /// An interrupting event sub-process or terminate end event fired inside
    /// this scope. Only boundary events attached to it may still trigger.
    pub interrupted: bool,
    /// Cleared once an interrupting boundary event or a racing catch event
    /// owned by this instance has been triggered, or once its job completed.
    pub accepting_events: bool,
    /// Pending triggers, oldest first.
    pub event_triggers: Vec<EventTrigger>,
}

impl ElementInstance {
    pub fn new(key: Key, value: ProcessInstanceRecord) -> Self {
        Self {
            key,
            state: LifecycleState::Activating,
            value,
            active_children: 0,
            active_sequence_flows: 0,
            taken_sequence_flows: BTreeMap::new(),
            tokens_in_flight: BTreeMap::new(),
            job_key: None,
            interrupted: false,
            accepting_events: true,
            event_triggers: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn element_id(&self) -> &str {
        &self.value.element_id
    }

    pub fn flow_scope_key(&self) -> Option<Key> {
        self.value.flow_scope_key
    }

    /// Tokens waiting on each of `incoming` at the given join.
    pub fn join_ready(&self, join_id: &str, incoming: &[String]) -> bool {
        let taken = self.taken_sequence_flows.get(join_id);
        !incoming.is_empty()
            && incoming.iter().all(|flow| {
                taken
                    .and_then(|flows| flows.get(flow))
                    .is_some_and(|count| *count > 0)
            })
    }

    /// Any token waiting at the given join.
    pub fn has_waiting_tokens(&self, join_id: &str) -> bool {
        self.taken_sequence_flows
            .get(join_id)
            .is_some_and(|flows| flows.values().any(|count| *count > 0))
    }

    /// Drop every token of this scope: nothing it still holds may continue.
    pub fn clear_tokens(&mut self) {
        self.active_sequence_flows = 0;
        self.taken_sequence_flows.clear();
        self.tokens_in_flight.clear();
    }

    pub fn taken_count(&self, join_id: &str, flow_id: &str) -> u32 {
        self.taken_sequence_flows
            .get(join_id)
            .and_then(|flows| flows.get(flow_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn pending_trigger(&self, target_element_id: &str) -> Option<&EventTrigger> {
        self.event_triggers
            .iter()
            .find(|t| t.target_element_id == target_element_id)
    }

    pub fn has_pending_interrupting_trigger(&self) -> bool {
        self.event_triggers.iter().any(|t| t.interrupting)
    }
}

/// Arena of element instances. Closed instances stay in the arena so that
/// commands addressed to them can be told apart from unknown keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ElementInstanceState {
    instances: BTreeMap<Key, ElementInstance>,
    /// Flow scope key → child keys, in key order.
    children: BTreeMap<Key, BTreeSet<Key>>,
}

impl ElementInstanceState {
    pub fn get(&self, key: Key) -> Option<&ElementInstance> {
        self.instances.get(&key)
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut ElementInstance> {
        self.instances.get_mut(&key)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.instances.contains_key(&key)
    }

    pub fn insert(&mut self, instance: ElementInstance) {
        if let Some(scope_key) = instance.flow_scope_key() {
            self.children.entry(scope_key).or_default().insert(instance.key);
        }
        self.instances.insert(instance.key, instance);
    }

    /// Children of `scope_key` that are ACTIVATING or ACTIVATED, in key order.
    pub fn active_children(&self, scope_key: Key) -> Vec<&ElementInstance> {
        self.children_of(scope_key)
            .filter(|child| child.is_active())
            .collect()
    }

    pub fn children_of(&self, scope_key: Key) -> impl Iterator<Item = &ElementInstance> {
        self.children
            .get(&scope_key)
            .into_iter()
            .flatten()
            .filter_map(|key| self.instances.get(key))
    }

    pub fn instances(&self) -> impl Iterator<Item = &ElementInstance> {
        self.instances.values()
    }
}
