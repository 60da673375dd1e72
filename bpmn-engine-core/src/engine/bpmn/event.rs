//! Start, end, boundary and intermediate catch events.

use super::behavior;
use crate::engine::catch_event;
use crate::engine::context::ProcessingContext;
use crate::error::EngineError;
use crate::model::ExecutableElement;
use crate::record::*;
use crate::types::*;
use tracing::debug;

/// Start events and triggered boundary events have nothing to wait for.
pub fn activate_pass_through(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    behavior::complete_immediately(ctx, key)?;
    behavior::on_element_completed(ctx, key, element, None)
}

/// A none end event completes and lets its scope try to complete. A
/// terminate end event interrupts its scope (see the COMPLETED applier) and
/// terminates every remaining child before the scope completes.
pub fn activate_end(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
    terminate: bool,
) -> Result<(), EngineError> {
    behavior::complete_immediately(ctx, key)?;
    if !terminate {
        return behavior::on_element_completed(ctx, key, element, None);
    }

    let Some(scope_key) = ctx.instance(key)?.flow_scope_key() else {
        return Ok(());
    };
    let siblings: Vec<(Key, ProcessInstanceRecord)> = ctx
        .state
        .element_instances
        .active_children(scope_key)
        .into_iter()
        .map(|child| (child.key, child.value.clone()))
        .collect();
    debug!(scope_key, siblings = siblings.len(), "terminate end event reached");
    for (sibling_key, sibling) in &siblings {
        ctx.element_command(*sibling_key, ProcessInstanceIntent::TerminateElement, sibling);
    }

    let scope = ctx.instance(scope_key)?;
    if scope.state == LifecycleState::Activated && scope.active_children == 0 {
        let value = scope.value.clone();
        ctx.element_command(scope_key, ProcessInstanceIntent::CompleteElement, &value);
    }
    Ok(())
}

/// An intermediate catch event behind an event-based gateway was already
/// triggered. Any other catch event subscribes and waits.
pub fn activate_catch(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    let value = ctx.instance(key)?.value.clone();
    let process = ctx.process(value.process_definition_key)?;
    if process.follows_event_based_gateway(&element.id) {
        return activate_pass_through(ctx, key, element);
    }

    if !catch_event::subscribe(ctx, key, std::slice::from_ref(&element.id))? {
        return Ok(());
    }
    ctx.element_event(key, ProcessInstanceIntent::ElementActivated, &value)
}

/// After COMPLETED: acknowledge the trigger, then leave through the
/// outgoing flows.
pub fn after_catch_completed(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    let instance = ctx.instance(key)?;
    if let Some(trigger) = instance.pending_trigger(&element.id).cloned() {
        let value = instance.value.clone();
        catch_event::write_triggered(ctx, key, &value, &trigger)?;
    }
    behavior::on_element_completed(ctx, key, element, None)
}
