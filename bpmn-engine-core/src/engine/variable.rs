use super::context::ProcessingContext;
use crate::error::EngineError;
use crate::record::*;

/// VARIABLE_DOCUMENT UPDATE: merge variables into an active process
/// instance, e.g. to fix the input of a failed condition before resolving
/// its incident.
pub fn update(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let RecordValue::VariableDocument(document) = &ctx.record.value else {
        ctx.reject(Rejection::invalid_argument("Expected a variable document"));
        return Ok(());
    };
    let document = document.clone();

    match ctx.state.element_instances.get(document.scope_key) {
        Some(instance) if instance.flow_scope_key().is_none() => {
            if !instance.is_active() {
                let reason = format!(
                    "Expected to update variables of process instance '{}', but it is {}",
                    document.scope_key, instance.state
                );
                ctx.reject(Rejection::invalid_state(reason));
                return Ok(());
            }
        }
        _ => {
            ctx.reject(Rejection::not_found(format!(
                "Expected to update variables of process instance '{}', but no such process instance was found",
                document.scope_key
            )));
            return Ok(());
        }
    }

    let key = ctx.next_key();
    ctx.append_event(
        key,
        Intent::VariableDocument(VariableDocumentIntent::Updated),
        RecordValue::VariableDocument(document),
    )
}
