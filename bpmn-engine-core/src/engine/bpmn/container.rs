//! Process, sub-process and event sub-process.

use super::behavior;
use crate::engine::catch_event;
use crate::engine::context::ProcessingContext;
use crate::error::EngineError;
use crate::model::{ElementKind, ExecutableElement};
use crate::record::*;
use crate::types::*;

/// Subscribe the event sub-process start events (and, for a sub-process, its
/// boundary events), then activate the start event.
pub fn activate(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    let value = ctx.instance(key)?.value.clone();

    let mut handlers = Vec::new();
    for esp_id in &element.event_sub_processes {
        let esp = ctx.element(value.process_definition_key, esp_id)?;
        handlers.extend(esp.start_event.clone());
    }
    if matches!(element.kind, ElementKind::SubProcess) {
        handlers.extend(element.boundary_events.iter().cloned());
    }
    if !catch_event::subscribe(ctx, key, &handlers)? {
        return Ok(());
    }

    ctx.element_event(key, ProcessInstanceIntent::ElementActivated, &value)?;

    let start_id = element.start_event.as_deref().ok_or_else(|| {
        EngineError::corruption(ctx.record.position, format!("container '{}' has no start event", element.id))
    })?;
    let start = ctx.element(value.process_definition_key, start_id)?;
    behavior::activate_in_scope(ctx, &start, key, &value)
}
