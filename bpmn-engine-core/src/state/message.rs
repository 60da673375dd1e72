use crate::record::MessageRecord;
use crate::types::{Key, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A published message kept until its time-to-live runs out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub key: Key,
    pub record: MessageRecord,
    pub deadline: Timestamp,
    /// Process instances this message already correlated to.
    pub correlated_instances: BTreeSet<Key>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageState {
    buffered: BTreeMap<Key, BufferedMessage>,
}

impl MessageState {
    pub fn get(&self, key: Key) -> Option<&BufferedMessage> {
        self.buffered.get(&key)
    }

    pub fn buffer(&mut self, key: Key, record: MessageRecord, deadline: Timestamp) {
        self.buffered.insert(
            key,
            BufferedMessage {
                key,
                record,
                deadline,
                correlated_instances: BTreeSet::new(),
            },
        );
    }

    pub fn remove(&mut self, key: Key) -> Option<BufferedMessage> {
        self.buffered.remove(&key)
    }

    /// No-op for messages that were never buffered (ttl 0).
    pub fn mark_correlated(&mut self, key: Key, process_instance_key: Key) {
        if let Some(message) = self.buffered.get_mut(&key) {
            message.correlated_instances.insert(process_instance_key);
        }
    }

    pub fn unmark_correlated(&mut self, key: Key, process_instance_key: Key) {
        if let Some(message) = self.buffered.get_mut(&key) {
            message.correlated_instances.remove(&process_instance_key);
        }
    }

    /// Oldest buffered message for `(name, correlation_key)` that has not yet
    /// correlated to `process_instance_key`.
    pub fn first_uncorrelated(
        &self,
        name: &str,
        correlation_key: &str,
        process_instance_key: Key,
        now: Timestamp,
    ) -> Option<&BufferedMessage> {
        self.buffered.values().find(|m| {
            m.deadline > now
                && m.record.name == name
                && m.record.correlation_key == correlation_key
                && !m.correlated_instances.contains(&process_instance_key)
        })
    }

    pub fn expired(&self, now: Timestamp) -> Vec<&BufferedMessage> {
        self.buffered.values().filter(|m| m.deadline <= now).collect()
    }
}
