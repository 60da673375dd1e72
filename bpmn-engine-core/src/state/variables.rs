use crate::types::{Key, Variables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One flat variable document per process instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VariableState {
    documents: BTreeMap<Key, Variables>,
}

impl VariableState {
    pub fn get(&self, process_instance_key: Key) -> Option<&Variables> {
        self.documents.get(&process_instance_key)
    }

    /// Variables of the instance, empty if none were ever set.
    pub fn document(&self, process_instance_key: Key) -> Variables {
        self.documents
            .get(&process_instance_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Top-level merge: existing names are overwritten.
    pub fn merge(&mut self, process_instance_key: Key, variables: &Variables) {
        let document = self.documents.entry(process_instance_key).or_default();
        for (name, value) in variables {
            document.insert(name.clone(), value.clone());
        }
    }
}
