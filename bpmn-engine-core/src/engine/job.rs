use super::context::ProcessingContext;
use crate::error::EngineError;
use crate::record::*;
use crate::state::JobStatus;
use crate::types::*;

/// JOB COMPLETE: merge the job's variables and complete the service task.
pub fn complete(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let (Some(key), RecordValue::Job(command)) = (ctx.record.key, &ctx.record.value) else {
        ctx.reject(Rejection::invalid_argument("Expected a job command with a key"));
        return Ok(());
    };
    let variables = command.variables.clone();

    let Some(job) = ctx.state.jobs.get(key) else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to complete job with key '{key}', but no such job was found"
        )));
        return Ok(());
    };
    if job.status != JobStatus::Activatable {
        let reason = format!(
            "Expected to complete job with key '{key}', but it is {:?}",
            job.status
        );
        ctx.reject(Rejection::invalid_state(reason));
        return Ok(());
    }
    let record = job.record.clone();

    let Some(element) = ctx.state.element_instances.get(record.element_instance_key) else {
        return Err(EngineError::corruption(
            ctx.record.position,
            format!("job {key} refers to unknown element instance {}", record.element_instance_key),
        ));
    };
    if element.state != LifecycleState::Activated {
        let reason = format!(
            "Expected element instance '{}' of job '{key}' to be ACTIVATED, but it is {}",
            element.key, element.state
        );
        ctx.reject(Rejection::invalid_state(reason));
        return Ok(());
    }
    if !element.accepting_events {
        let reason = format!(
            "Expected element instance '{}' of job '{key}' to complete, but an interrupting event was already triggered on it",
            element.key
        );
        ctx.reject(Rejection::invalid_state(reason));
        return Ok(());
    }
    let element_value = element.value.clone();

    ctx.append_event(
        key,
        Intent::Job(JobIntent::Completed),
        RecordValue::Job(JobRecord {
            variables,
            ..record.clone()
        }),
    )?;
    ctx.element_command(
        record.element_instance_key,
        ProcessInstanceIntent::CompleteElement,
        &element_value,
    );
    Ok(())
}

/// Cancel the still activatable job of a service task that is leaving.
pub fn cancel_for_element(ctx: &mut ProcessingContext<'_>, element_key: Key) -> Result<(), EngineError> {
    let Some(job_key) = ctx.instance(element_key)?.job_key else {
        return Ok(());
    };
    let record = match ctx.state.jobs.get(job_key) {
        Some(job) if job.status == JobStatus::Activatable => job.record.clone(),
        _ => return Ok(()),
    };
    ctx.append_event(job_key, Intent::Job(JobIntent::Canceled), RecordValue::Job(record))
}
