//! Termination cascade.
//!
//! A terminated container first terminates its active children (as separate
//! TERMINATE_ELEMENT commands, in key order) and only writes its own
//! ELEMENT_TERMINATED once the last of them closed. Every closed child
//! notifies its flow scope through [`on_child_closed`], which is also where
//! pending interrupting boundary events and event sub-processes continue.

use super::{behavior, gateway};
use crate::engine::context::ProcessingContext;
use crate::engine::{catch_event, incident, job};
use crate::error::EngineError;
use crate::model::ElementKind;
use crate::record::*;
use crate::state::EventTrigger;
use crate::types::*;
use tracing::{debug, info};

pub fn terminate_element(ctx: &mut ProcessingContext<'_>, key: Key) -> Result<(), EngineError> {
    let value = ctx.instance(key)?.value.clone();
    ctx.element_event(key, ProcessInstanceIntent::ElementTerminating, &value)?;

    job::cancel_for_element(ctx, key)?;
    catch_event::unsubscribe(ctx, key, |_| true)?;
    incident::resolve_for_element(ctx, key)?;

    if value.bpmn_element_type.is_container() {
        let children: Vec<(Key, ProcessInstanceRecord)> = ctx
            .state
            .element_instances
            .active_children(key)
            .into_iter()
            .map(|child| (child.key, child.value.clone()))
            .collect();
        for (child_key, child_value) in &children {
            ctx.element_command(*child_key, ProcessInstanceIntent::TerminateElement, child_value);
        }
        if ctx.instance(key)?.active_children > 0 {
            debug!(key, children = children.len(), "waiting for children to terminate");
            return Ok(());
        }
    }

    finish_termination(ctx, key)
}

/// ELEMENT_TERMINATED for an instance whose children are all closed.
pub fn finish_termination(ctx: &mut ProcessingContext<'_>, key: Key) -> Result<(), EngineError> {
    let value = ctx.instance(key)?.value.clone();
    ctx.element_event(key, ProcessInstanceIntent::ElementTerminated, &value)?;
    match value.flow_scope_key {
        Some(scope_key) => on_child_closed(ctx, scope_key, key),
        None => {
            info!(
                process_instance_key = value.process_instance_key,
                bpmn_process_id = %value.bpmn_process_id,
                "process instance terminated"
            );
            Ok(())
        }
    }
}

/// Called whenever `child_key` left its scope without taking flows.
pub fn on_child_closed(
    ctx: &mut ProcessingContext<'_>,
    scope_key: Key,
    child_key: Key,
) -> Result<(), EngineError> {
    let scope = ctx.instance(scope_key)?.clone();
    match scope.state {
        LifecycleState::Terminating => {
            if scope.active_children == 0 {
                finish_termination(ctx, scope_key)?;
            }
            Ok(())
        }
        LifecycleState::Activated => {
            // An interrupting boundary event waited for its activity to close
            let child = ctx.instance(child_key)?.clone();
            if !scope.interrupted && child.state == LifecycleState::Terminated {
                let child_element = ctx.element(child.value.process_definition_key, child.element_id())?;
                let boundary = child
                    .event_triggers
                    .iter()
                    .find(|t| t.interrupting && child_element.boundary_events.contains(&t.target_element_id))
                    .cloned();
                if let Some(trigger) = boundary {
                    return activate_handler(ctx, child_key, &trigger);
                }
            }

            if scope.active_children == 0 {
                if let Some(trigger) = pending_event_sub_process(ctx, &scope.value, &scope.event_triggers) {
                    return activate_handler(ctx, scope_key, &trigger);
                }
            }

            gateway::activate_ready_inclusive_joins(ctx, scope_key)?;
            behavior::complete_scope_if_possible(ctx, scope_key)
        }
        _ => Ok(()),
    }
}

fn pending_event_sub_process(
    ctx: &ProcessingContext<'_>,
    scope: &ProcessInstanceRecord,
    triggers: &[EventTrigger],
) -> Option<EventTrigger> {
    triggers
        .iter()
        .find(|t| {
            t.interrupting
                && matches!(
                    ctx.provider
                        .element(scope.process_definition_key, &t.target_element_id)
                        .map(|e| e.kind),
                    Some(ElementKind::StartEvent { .. })
                )
        })
        .cloned()
}

/// Activate the element that handles `trigger` and write TRIGGERED on the
/// owner. A boundary event is activated next to its activity; an event
/// sub-process start event activates its event sub-process inside the owner.
pub fn activate_handler(
    ctx: &mut ProcessingContext<'_>,
    owner_key: Key,
    trigger: &EventTrigger,
) -> Result<(), EngineError> {
    let owner = ctx.instance(owner_key)?.value.clone();
    let target = ctx.element(owner.process_definition_key, &trigger.target_element_id)?;

    let (handler_id, scope_key) = match &target.kind {
        ElementKind::BoundaryEvent { .. } => (target.id.clone(), owner.flow_scope_key),
        ElementKind::StartEvent { .. } => (target.flow_scope.clone().unwrap_or_default(), Some(owner_key)),
        _ => (String::new(), None),
    };
    let Some(scope_key) = scope_key.filter(|_| !handler_id.is_empty()) else {
        return Err(EngineError::corruption(
            ctx.record.position,
            format!("'{}' cannot handle a triggered event", target.id),
        ));
    };

    let handler = ctx.element(owner.process_definition_key, &handler_id)?;
    behavior::activate_in_scope(ctx, &handler, scope_key, &owner)?;

    catch_event::write_triggered(ctx, owner_key, &owner, trigger)
}
