use crate::record::JobRecord;
use crate::types::Key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Activatable,
    Completed,
    Canceled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    pub key: Key,
    pub status: JobStatus,
    pub record: JobRecord,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobState {
    jobs: BTreeMap<Key, JobInstance>,
}

impl JobState {
    pub fn get(&self, key: Key) -> Option<&JobInstance> {
        self.jobs.get(&key)
    }

    pub fn create(&mut self, key: Key, record: JobRecord) {
        self.jobs.insert(
            key,
            JobInstance {
                key,
                status: JobStatus::Activatable,
                record,
            },
        );
    }

    pub fn set_status(&mut self, key: Key, status: JobStatus) -> bool {
        match self.jobs.get_mut(&key) {
            Some(job) => {
                job.status = status;
                true
            }
            None => false,
        }
    }

    /// Activatable jobs, in creation order.
    pub fn activatable(&self) -> impl Iterator<Item = &JobInstance> {
        self.jobs
            .values()
            .filter(|job| job.status == JobStatus::Activatable)
    }
}
