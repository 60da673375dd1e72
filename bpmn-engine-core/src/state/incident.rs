use crate::record::IncidentRecord;
use crate::types::Key;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentInstance {
    pub key: Key,
    pub record: IncidentRecord,
    pub resolved: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IncidentState {
    incidents: BTreeMap<Key, IncidentInstance>,
    by_element: BTreeMap<Key, BTreeSet<Key>>,
}

impl IncidentState {
    pub fn get(&self, key: Key) -> Option<&IncidentInstance> {
        self.incidents.get(&key)
    }

    pub fn create(&mut self, key: Key, record: IncidentRecord) {
        self.by_element
            .entry(record.element_instance_key)
            .or_default()
            .insert(key);
        self.incidents.insert(
            key,
            IncidentInstance {
                key,
                record,
                resolved: false,
            },
        );
    }

    pub fn resolve(&mut self, key: Key) -> bool {
        match self.incidents.get_mut(&key) {
            Some(incident) => {
                incident.resolved = true;
                true
            }
            None => false,
        }
    }

    pub fn open_for_element(&self, element_instance_key: Key) -> Vec<&IncidentInstance> {
        self.by_element
            .get(&element_instance_key)
            .into_iter()
            .flatten()
            .filter_map(|key| self.incidents.get(key))
            .filter(|incident| !incident.resolved)
            .collect()
    }

    pub fn open(&self) -> impl Iterator<Item = &IncidentInstance> {
        self.incidents.values().filter(|incident| !incident.resolved)
    }
}
