use super::context::ProcessingContext;
use crate::error::EngineError;
use crate::record::*;
use crate::types::*;
use tracing::info;

/// PROCESS_INSTANCE_CREATION CREATE
///
/// The definition is resolved by key, by process id and version, or as the
/// latest version of the process id.
pub fn create(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let RecordValue::ProcessInstanceCreation(request) = &ctx.record.value else {
        ctx.reject(Rejection::invalid_argument("Expected a process instance creation request"));
        return Ok(());
    };
    let request = request.clone();

    let process = match (request.process_definition_key, request.version) {
        (Some(key), _) => ctx.provider.process(key),
        (None, _) if request.bpmn_process_id.is_empty() => {
            ctx.reject(Rejection::invalid_argument(
                "Expected either a process definition key or a process id, but none given",
            ));
            return Ok(());
        }
        (None, Some(version)) => ctx.provider.by_id_and_version(&request.bpmn_process_id, version),
        (None, None) => ctx.provider.latest_by_id(&request.bpmn_process_id),
    };
    let Some(process) = process else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to find process definition with process ID '{}', but none found",
            request.bpmn_process_id
        )));
        return Ok(());
    };

    let process_instance_key = ctx.next_key();
    ctx.append_event(
        process_instance_key,
        Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Created),
        RecordValue::ProcessInstanceCreation(ProcessInstanceCreationRecord {
            bpmn_process_id: process.bpmn_process_id.clone(),
            version: Some(process.version),
            process_definition_key: Some(process.key),
            process_instance_key: Some(process_instance_key),
            variables: request.variables,
        }),
    )?;
    info!(
        process_instance_key,
        bpmn_process_id = %process.bpmn_process_id,
        version = process.version,
        "process instance created"
    );

    ctx.element_command(
        process_instance_key,
        ProcessInstanceIntent::ActivateElement,
        &ProcessInstanceRecord {
            bpmn_process_id: process.bpmn_process_id.clone(),
            version: process.version,
            process_definition_key: process.key,
            process_instance_key,
            element_id: process.bpmn_process_id.clone(),
            bpmn_element_type: BpmnElementType::Process,
            flow_scope_key: None,
        },
    );
    Ok(())
}
