//! Runtime state of one partition.
//!
//! Every piece of state is an arena keyed by entity key and is mutated only by
//! the event applier. Ordered maps keep serialization (and therefore the
//! fingerprint) independent of insertion history.

pub mod element_instance;
pub mod incident;
pub mod job;
pub mod message;
pub mod subscription;
pub mod variables;

pub use element_instance::{ElementInstance, ElementInstanceState, EventTrigger};
pub use incident::{IncidentInstance, IncidentState};
pub use job::{JobInstance, JobState, JobStatus};
pub use message::{BufferedMessage, MessageState};
pub use subscription::{MessageSubscription, SubscriptionState, TimerInstance};
pub use variables::VariableState;

use crate::types::{Key, KEY_BITS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ─── Keys ─────────────────────────────────────────────────────

/// Partition-prefixed key generator. Keys are `partition_id << KEY_BITS`
/// plus a monotonically increasing counter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerator {
    partition_id: u32,
    counter: u64,
}

impl KeyGenerator {
    pub fn new(partition_id: u32) -> Self {
        Self {
            partition_id,
            counter: 0,
        }
    }

    fn prefix(&self) -> u64 {
        u64::from(self.partition_id) << KEY_BITS
    }

    pub fn next_key(&mut self) -> Key {
        self.counter += 1;
        self.prefix() + self.counter
    }

    /// Move the counter past a key seen in the log, so recovery never hands
    /// out a key twice.
    pub fn observe(&mut self, key: Key) {
        if key >> KEY_BITS == u64::from(self.partition_id) {
            let counter = key & ((1u64 << KEY_BITS) - 1);
            self.counter = self.counter.max(counter);
        }
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }
}

// ─── Aggregate ────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineState {
    pub keys: KeyGenerator,
    pub element_instances: ElementInstanceState,
    pub subscriptions: SubscriptionState,
    pub messages: MessageState,
    pub jobs: JobState,
    pub incidents: IncidentState,
    pub variables: VariableState,
}

impl EngineState {
    pub fn new(partition_id: u32) -> Self {
        Self {
            keys: KeyGenerator::new(partition_id),
            ..Default::default()
        }
    }

    /// SHA-256 over the serialized state, hex encoded. Two engines that
    /// applied the same log produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}
