use crate::types::{Key, Position};

/// Fatal engine errors. Anything that can be expressed as a rejection or an
/// incident is written to the log instead; these stop the partition.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("state corruption at position {position}: {message}")]
    StateCorruption { position: Position, message: String },

    #[error("process definition {0} is not deployed")]
    UnknownProcessDefinition(Key),

    #[error("element '{element_id}' not found in process definition {process_definition_key}")]
    UnknownElement {
        process_definition_key: Key,
        element_id: String,
    },

    #[error("partition stopped after a fatal error: {0}")]
    PartitionStopped(String),

    #[error("record log failure: {0}")]
    Log(#[from] anyhow::Error),
}

impl EngineError {
    pub fn corruption(position: Position, message: impl Into<String>) -> Self {
        EngineError::StateCorruption {
            position,
            message: message.into(),
        }
    }
}

/// Failure of the expression collaborator. Surfaced as an incident.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("failed to parse expression '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("no variable found with name '{0}'")]
    MissingVariable(String),

    #[error("expected {expected} but '{expression}' evaluated to {actual}")]
    UnexpectedType {
        expression: String,
        expected: &'static str,
        actual: String,
    },
}

/// Model problems found while deploying a process definition.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to parse process model: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("process model '{process_id}' is invalid: {}", format_errors(.errors))]
    Invalid {
        process_id: String,
        errors: Vec<crate::model::validate::ValidationError>,
    },
}

fn format_errors(errors: &[crate::model::validate::ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
