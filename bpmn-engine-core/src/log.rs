use crate::record::{FollowUpRecord, Record};
use crate::types::Position;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Append-only, totally ordered record log of one partition.
///
/// The processor reads and writes exclusively through this trait, so a
/// durable backend can replace [`MemoryLog`] without touching the engine.
#[async_trait]
pub trait RecordLog: Send + Sync {
    /// Append a batch atomically: either every record gets a position or
    /// none does. Returns the position of the last appended record (the
    /// current last position for an empty batch).
    async fn append(&self, batch: Vec<FollowUpRecord>) -> Result<Position>;

    /// Records with a position greater than or equal to `from`, in order.
    async fn read_from(&self, from: Position) -> Result<Vec<Record>>;

    /// Highest assigned position, 0 for an empty log.
    async fn last_position(&self) -> Result<Position>;
}

/// In-memory log. Positions start at 1.
#[derive(Default)]
pub struct MemoryLog {
    records: RwLock<Vec<Record>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from records written earlier, e.g. to recover a partition.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn snapshot(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RecordLog for MemoryLog {
    async fn append(&self, batch: Vec<FollowUpRecord>) -> Result<Position> {
        let mut records = self.records.write().await;
        let mut position = records.last().map(|r| r.position).unwrap_or(0);
        records.reserve(batch.len());
        for follow_up in batch {
            position += 1;
            records.push(follow_up.into_record(position));
        }
        Ok(position)
    }

    async fn read_from(&self, from: Position) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        // Positions are dense, so the index of position p is p - 1
        let start = usize::try_from(from.saturating_sub(1))?.min(records.len());
        Ok(records[start..].to_vec())
    }

    async fn last_position(&self) -> Result<Position> {
        Ok(self.records.read().await.last().map(|r| r.position).unwrap_or(0))
    }
}
