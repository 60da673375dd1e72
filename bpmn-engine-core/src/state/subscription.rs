//! Event subscription registry: message subscriptions and timers, indexed by
//! owning element instance.

use crate::record::{MessageSubscriptionRecord, TimerRecord};
use crate::types::{Key, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageSubscription {
    pub key: Key,
    pub record: MessageSubscriptionRecord,
    pub open: bool,
    /// Set while an interrupting subscription has a message in flight.
    pub correlating: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimerInstance {
    pub key: Key,
    pub record: TimerRecord,
    pub open: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubscriptionState {
    messages: BTreeMap<Key, MessageSubscription>,
    timers: BTreeMap<Key, TimerInstance>,
    /// Owner element instance → subscription / timer keys.
    by_owner: BTreeMap<Key, BTreeSet<Key>>,
    /// Message name → correlation key → open subscription keys.
    by_correlation: BTreeMap<String, BTreeMap<String, BTreeSet<Key>>>,
    /// Open timers by due date.
    due_dates: BTreeSet<(Timestamp, Key)>,
}

impl SubscriptionState {
    // ── Message subscriptions ──

    pub fn message(&self, key: Key) -> Option<&MessageSubscription> {
        self.messages.get(&key)
    }

    pub fn open_message(&mut self, key: Key, record: MessageSubscriptionRecord) {
        self.by_owner
            .entry(record.element_instance_key)
            .or_default()
            .insert(key);
        self.by_correlation
            .entry(record.message_name.clone())
            .or_default()
            .entry(record.correlation_key.clone())
            .or_default()
            .insert(key);
        self.messages.insert(
            key,
            MessageSubscription {
                key,
                record,
                open: true,
                correlating: false,
            },
        );
    }

    pub fn mark_correlating(&mut self, key: Key, message_key: Key, lock: bool) -> bool {
        match self.messages.get_mut(&key) {
            Some(sub) => {
                sub.record.message_key = Some(message_key);
                sub.correlating = lock;
                true
            }
            None => false,
        }
    }

    /// Undo [`Self::mark_correlating`] after the correlation was rejected.
    pub fn unlock(&mut self, key: Key) -> bool {
        match self.messages.get_mut(&key) {
            Some(sub) => {
                sub.record.message_key = None;
                sub.correlating = false;
                true
            }
            None => false,
        }
    }

    /// A correlated interrupting subscription is consumed, a non-interrupting
    /// one stays open for the next message.
    pub fn mark_correlated(&mut self, key: Key) -> bool {
        let Some(sub) = self.messages.get_mut(&key) else {
            return false;
        };
        sub.correlating = false;
        if sub.record.interrupting {
            self.close_message(key);
        }
        true
    }

    pub fn close_message(&mut self, key: Key) -> bool {
        let Some(sub) = self.messages.get_mut(&key) else {
            return false;
        };
        sub.open = false;
        sub.correlating = false;
        if let Some(keys) = self
            .by_correlation
            .get_mut(&sub.record.message_name)
            .and_then(|by_key| by_key.get_mut(&sub.record.correlation_key))
        {
            keys.remove(&key);
        }
        true
    }

    /// Open subscriptions waiting for `(name, correlation_key)`, in key order.
    pub fn matching(&self, name: &str, correlation_key: &str) -> Vec<&MessageSubscription> {
        self.by_correlation
            .get(name)
            .and_then(|by_key| by_key.get(correlation_key))
            .into_iter()
            .flatten()
            .filter_map(|key| self.messages.get(key))
            .filter(|sub| sub.open)
            .collect()
    }

    pub fn open_messages_of(&self, owner_key: Key) -> Vec<&MessageSubscription> {
        self.owned_keys(owner_key)
            .filter_map(|key| self.messages.get(key))
            .filter(|sub| sub.open)
            .collect()
    }

    // ── Timers ──

    pub fn timer(&self, key: Key) -> Option<&TimerInstance> {
        self.timers.get(&key)
    }

    pub fn add_timer(&mut self, key: Key, record: TimerRecord) {
        self.by_owner
            .entry(record.element_instance_key)
            .or_default()
            .insert(key);
        self.due_dates.insert((record.due_date, key));
        self.timers.insert(
            key,
            TimerInstance {
                key,
                record,
                open: true,
            },
        );
    }

    pub fn close_timer(&mut self, key: Key) -> bool {
        let Some(timer) = self.timers.get_mut(&key) else {
            return false;
        };
        timer.open = false;
        self.due_dates.remove(&(timer.record.due_date, key));
        true
    }

    pub fn open_timers_of(&self, owner_key: Key) -> Vec<&TimerInstance> {
        self.owned_keys(owner_key)
            .filter_map(|key| self.timers.get(key))
            .filter(|timer| timer.open)
            .collect()
    }

    /// Open timers due at or before `now`, ordered by due date then key.
    pub fn due_timers(&self, now: Timestamp) -> Vec<&TimerInstance> {
        self.due_dates
            .iter()
            .take_while(|(due, _)| *due <= now)
            .filter_map(|(_, key)| self.timers.get(key))
            .collect()
    }

    pub fn next_due_date(&self) -> Option<Timestamp> {
        self.due_dates.iter().next().map(|(due, _)| *due)
    }

    fn owned_keys(&self, owner_key: Key) -> impl Iterator<Item = &Key> {
        self.by_owner.get(&owner_key).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Variables;

    fn subscription(owner: Key, correlation_key: &str, interrupting: bool) -> MessageSubscriptionRecord {
        MessageSubscriptionRecord {
            process_instance_key: 1,
            process_definition_key: 1,
            element_instance_key: owner,
            handler_element_id: "catch".to_string(),
            message_name: "order".to_string(),
            correlation_key: correlation_key.to_string(),
            interrupting,
            message_key: None,
            variables: Variables::new(),
        }
    }

    fn timer(owner: Key, due_date: Timestamp) -> TimerRecord {
        TimerRecord {
            element_instance_key: owner,
            process_instance_key: 1,
            process_definition_key: 1,
            target_element_id: "timer".to_string(),
            due_date,
            repetitions: None,
            interval_ms: 0,
        }
    }

    #[test]
    fn test_matching_only_returns_open_subscriptions() {
        let mut state = SubscriptionState::default();
        state.open_message(21, subscription(5, "k1", true));
        state.open_message(20, subscription(6, "k1", false));
        state.open_message(22, subscription(7, "k2", true));

        let keys: Vec<Key> = state.matching("order", "k1").iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![20, 21]);

        state.mark_correlating(21, 99, true);
        assert!(state.message(21).unwrap().correlating);
        state.mark_correlated(21);
        assert!(!state.message(21).unwrap().open);

        state.mark_correlating(20, 99, false);
        state.mark_correlated(20);
        assert!(state.message(20).unwrap().open);

        let keys: Vec<Key> = state.matching("order", "k1").iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![20]);
    }

    #[test]
    fn test_due_timers_ordered_by_due_date_then_key() {
        let mut state = SubscriptionState::default();
        state.add_timer(31, timer(5, 1_000));
        state.add_timer(30, timer(5, 1_000));
        state.add_timer(32, timer(6, 500));
        state.add_timer(33, timer(6, 2_000));

        let due: Vec<Key> = state.due_timers(1_000).iter().map(|t| t.key).collect();
        assert_eq!(due, vec![32, 30, 31]);

        state.close_timer(30);
        let due: Vec<Key> = state.due_timers(1_000).iter().map(|t| t.key).collect();
        assert_eq!(due, vec![32, 31]);
        assert_eq!(state.open_timers_of(5).len(), 1);
        assert_eq!(state.next_due_date(), Some(500));
    }
}
