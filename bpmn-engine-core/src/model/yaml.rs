use super::dto::ProcessDto;
use crate::error::ModelError;

/// Parse a YAML string into a `ProcessDto`.
///
/// Validation is NOT performed here; `ProcessRepository::deploy` validates
/// before transforming.
pub fn parse_process_yaml(yaml_str: &str) -> Result<ProcessDto, ModelError> {
    let dto: ProcessDto = serde_yaml::from_str(yaml_str)?;
    Ok(dto)
}
