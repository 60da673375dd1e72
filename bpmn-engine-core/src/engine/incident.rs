//! Incidents: an element that cannot make progress stays ACTIVATING with an
//! open incident until the incident is resolved, which retries the
//! activation.

use super::context::ProcessingContext;
use crate::error::EngineError;
use crate::record::*;
use crate::types::*;
use tracing::warn;

pub fn raise(
    ctx: &mut ProcessingContext<'_>,
    element_key: Key,
    error_type: ErrorType,
    error_message: String,
) -> Result<(), EngineError> {
    let element = ctx.instance(element_key)?.value.clone();
    warn!(
        element_instance_key = element_key,
        element_id = %element.element_id,
        ?error_type,
        %error_message,
        "incident raised"
    );
    let incident_key = ctx.next_key();
    ctx.append_event(
        incident_key,
        Intent::Incident(IncidentIntent::Created),
        RecordValue::Incident(IncidentRecord {
            error_type,
            error_message,
            process_instance_key: element.process_instance_key,
            element_instance_key: element_key,
            element_id: element.element_id,
            bpmn_process_id: element.bpmn_process_id,
        }),
    )
}

/// INCIDENT RESOLVE: close the incident and retry the activation.
pub fn resolve(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let Some(key) = ctx.record.key else {
        ctx.reject(Rejection::invalid_argument("Expected an incident key to resolve"));
        return Ok(());
    };
    let Some(incident) = ctx.state.incidents.get(key) else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to resolve incident with key '{key}', but no such incident was found"
        )));
        return Ok(());
    };
    if incident.resolved {
        ctx.reject(Rejection::invalid_state(format!(
            "Expected to resolve incident with key '{key}', but it is already resolved"
        )));
        return Ok(());
    }
    let record = incident.record.clone();

    ctx.append_event(
        key,
        Intent::Incident(IncidentIntent::Resolved),
        RecordValue::Incident(record.clone()),
    )?;

    let retry = ctx
        .state
        .element_instances
        .get(record.element_instance_key)
        .filter(|element| element.state == LifecycleState::Activating)
        .map(|element| element.value.clone());
    if let Some(value) = retry {
        ctx.element_command(
            record.element_instance_key,
            ProcessInstanceIntent::ActivateElement,
            &value,
        );
    }
    Ok(())
}

/// Resolve the open incidents of an element that is being terminated.
pub fn resolve_for_element(ctx: &mut ProcessingContext<'_>, element_key: Key) -> Result<(), EngineError> {
    let open: Vec<(Key, IncidentRecord)> = ctx
        .state
        .incidents
        .open_for_element(element_key)
        .into_iter()
        .map(|incident| (incident.key, incident.record.clone()))
        .collect();
    for (incident_key, record) in open {
        ctx.append_event(
            incident_key,
            Intent::Incident(IncidentIntent::Resolved),
            RecordValue::Incident(record),
        )?;
    }
    Ok(())
}
