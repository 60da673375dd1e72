//! Service task: waits for its job to be completed.

use crate::engine::catch_event;
use crate::engine::context::ProcessingContext;
use crate::error::EngineError;
use crate::model::{ElementKind, ExecutableElement};
use crate::record::*;
use crate::types::*;
use tracing::debug;

pub fn activate(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    let ElementKind::ServiceTask { job_type } = &element.kind else {
        return Err(EngineError::corruption(
            ctx.record.position,
            format!("'{}' is not a service task", element.id),
        ));
    };
    let value = ctx.instance(key)?.value.clone();

    if !catch_event::subscribe(ctx, key, &element.boundary_events)? {
        return Ok(());
    }

    let job_key = ctx.next_key();
    ctx.append_event(
        job_key,
        Intent::Job(JobIntent::Created),
        RecordValue::Job(JobRecord {
            job_type: job_type.clone(),
            process_instance_key: value.process_instance_key,
            element_instance_key: key,
            element_id: element.id.clone(),
            bpmn_process_id: value.bpmn_process_id.clone(),
            variables: Variables::new(),
        }),
    )?;
    debug!(job_key, job_type = %job_type, element_id = %element.id, "job created");

    ctx.element_event(key, ProcessInstanceIntent::ElementActivated, &value)
}
