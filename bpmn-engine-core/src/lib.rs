//! BPMN workflow engine core.
//!
//! A single-partition, log-driven record processor: commands are read from
//! the record log in position order, processed against the partition's
//! runtime state, and answered with events, follow-up commands or
//! rejections appended to the same log. Replaying the log rebuilds the state
//! exactly.

pub mod config;
pub mod engine;
pub mod error;
pub mod expression;
pub mod log;
pub mod model;
pub mod partition;
pub mod record;
pub mod scheduler;
pub mod state;
pub mod types;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EvaluationError, ModelError};
pub use expression::{ExpressionEvaluator, SimpleExpressionEvaluator};
pub use log::{MemoryLog, RecordLog};
pub use model::{ElementTreeProvider, ProcessRepository};
pub use partition::{Partition, PartitionHandle};
pub use record::{Command, Record, RecordType, RecordValue, Rejection, RejectionType};
pub use scheduler::{Clock, ControlledClock, SystemClock};
pub use state::EngineState;
pub use types::*;
