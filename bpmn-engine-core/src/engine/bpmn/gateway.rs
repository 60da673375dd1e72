//! Gateways
//!
//! - Exclusive: the first non-default outgoing flow whose condition holds, in
//!   declaration order, otherwise the default flow. No match raises an
//!   incident and the gateway stays ACTIVATING.
//! - Parallel: forks on every outgoing flow; as a join it is only activated
//!   once every incoming flow carries a token (see [`behavior::take_flow`]).
//! - Inclusive: forks on every non-default outgoing flow whose condition
//!   holds, otherwise the default flow; no match raises an incident. As a join
//!   it is activated once a token waits on it and no other token of the scope
//!   can still reach it.
//! - Event-based: subscribes to the events of its target catch events and
//!   leaves through the flow whose event fires first.

use super::behavior;
use crate::engine::context::ProcessingContext;
use crate::engine::{catch_event, incident};
use crate::error::EngineError;
use crate::model::{ExecutableElement, ExecutableProcess};
use crate::record::*;
use crate::types::*;
use tracing::debug;

// ─── Exclusive ────────────────────────────────────────────────

pub fn activate_exclusive(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    if element.outgoing.is_empty() {
        behavior::complete_immediately(ctx, key)?;
        return behavior::on_element_completed(ctx, key, element, None);
    }

    let value = ctx.instance(key)?.value.clone();
    let process = ctx.process(value.process_definition_key)?;
    let variables = ctx.variables(value.process_instance_key);

    let mut selected = None;
    for flow_id in &element.outgoing {
        if element.default_flow.as_deref() == Some(flow_id.as_str()) {
            continue;
        }
        let condition = process.flow(flow_id).and_then(|flow| flow.condition.as_deref());
        let Some(condition) = condition else {
            selected = Some(flow_id.clone());
            break;
        };
        match ctx.evaluator.evaluate_bool(condition, &variables) {
            Ok(true) => {
                selected = Some(flow_id.clone());
                break;
            }
            Ok(false) => {}
            Err(e) => {
                return incident::raise(ctx, key, ErrorType::ConditionError, e.to_string());
            }
        }
    }

    let Some(flow_id) = selected.or_else(|| element.default_flow.clone()) else {
        return incident::raise(
            ctx,
            key,
            ErrorType::ConditionError,
            format!(
                "Expected at least one condition to evaluate to true, or to have a default flow, but none of the outgoing flows of '{}' could be taken",
                element.id
            ),
        );
    };
    debug!(gateway = %element.id, flow = %flow_id, "exclusive gateway selected flow");

    behavior::complete_immediately(ctx, key)?;
    behavior::on_element_completed(ctx, key, element, Some(vec![flow_id]))
}

// ─── Parallel ─────────────────────────────────────────────────

pub fn activate_parallel(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    behavior::complete_immediately(ctx, key)?;
    behavior::on_element_completed(ctx, key, element, None)?;

    // More tokens may have queued up on every incoming flow
    let Some(scope_key) = ctx.instance(key)?.flow_scope_key() else {
        return Ok(());
    };
    let scope = ctx.instance(scope_key)?;
    if scope.state == LifecycleState::Activated
        && !scope.interrupted
        && scope.join_ready(&element.id, &element.incoming)
    {
        let template = ctx.instance(key)?.value.clone();
        behavior::activate_in_scope(ctx, element, scope_key, &template)?;
    }
    Ok(())
}

// ─── Inclusive ────────────────────────────────────────────────

pub fn activate_inclusive(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    if element.outgoing.is_empty() {
        behavior::complete_immediately(ctx, key)?;
        return behavior::on_element_completed(ctx, key, element, None);
    }

    let value = ctx.instance(key)?.value.clone();
    let process = ctx.process(value.process_definition_key)?;
    let variables = ctx.variables(value.process_instance_key);

    let mut selected = Vec::new();
    for flow_id in &element.outgoing {
        if element.default_flow.as_deref() == Some(flow_id.as_str()) {
            continue;
        }
        let condition = process.flow(flow_id).and_then(|flow| flow.condition.as_deref());
        let Some(condition) = condition else {
            selected.push(flow_id.clone());
            continue;
        };
        match ctx.evaluator.evaluate_bool(condition, &variables) {
            Ok(true) => selected.push(flow_id.clone()),
            Ok(false) => {}
            Err(e) => {
                return incident::raise(ctx, key, ErrorType::ConditionError, e.to_string());
            }
        }
    }

    if selected.is_empty() {
        match &element.default_flow {
            Some(default_flow) => selected.push(default_flow.clone()),
            None => {
                return incident::raise(
                    ctx,
                    key,
                    ErrorType::ConditionError,
                    format!(
                        "Expected at least one condition to evaluate to true, or to have a default flow, but none of the outgoing flows of '{}' could be taken",
                        element.id
                    ),
                );
            }
        }
    }
    debug!(gateway = %element.id, flows = ?selected, "inclusive gateway selected flows");

    behavior::complete_immediately(ctx, key)?;
    behavior::on_element_completed(ctx, key, element, Some(selected))
}

/// Activate every inclusive join of `scope_key` that has a token waiting and
/// can no longer be reached by any other token of the scope: an active child,
/// a flow taken towards an element not activated yet, or a token waiting at
/// another join.
pub fn activate_ready_inclusive_joins(
    ctx: &mut ProcessingContext<'_>,
    scope_key: Key,
) -> Result<(), EngineError> {
    let scope = ctx.instance(scope_key)?;
    if scope.state != LifecycleState::Activated || scope.interrupted {
        return Ok(());
    }
    let template = scope.value.clone();
    let waiting: Vec<String> = scope.taken_sequence_flows.keys().cloned().collect();
    if waiting.is_empty() {
        return Ok(());
    }

    let process = ctx.process(template.process_definition_key)?;
    for join_id in waiting {
        let Some(join) = process.element(&join_id).filter(|e| e.is_inclusive_join()) else {
            continue;
        };
        if inclusive_join_ready(ctx, scope_key, &process, &join_id)? {
            debug!(join = %join_id, "inclusive gateway merged every reachable token");
            behavior::activate_in_scope(ctx, join, scope_key, &template)?;
        }
    }
    Ok(())
}

fn inclusive_join_ready(
    ctx: &ProcessingContext<'_>,
    scope_key: Key,
    process: &ExecutableProcess,
    join_id: &str,
) -> Result<bool, EngineError> {
    let scope = ctx.instance(scope_key)?;
    if !scope.has_waiting_tokens(join_id) {
        return Ok(false);
    }
    let can_arrive = |element_id: &str| element_id != join_id && process.can_reach(element_id, join_id);

    let child_on_the_way = ctx
        .state
        .element_instances
        .active_children(scope_key)
        .iter()
        .any(|child| can_arrive(child.element_id()));
    let token_on_the_way = scope
        .tokens_in_flight
        .keys()
        .chain(scope.taken_sequence_flows.keys())
        .any(|target| can_arrive(target.as_str()));
    Ok(!child_on_the_way && !token_on_the_way)
}

// ─── Event-based ──────────────────────────────────────────────

pub fn activate_event_based(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    let value = ctx.instance(key)?.value.clone();
    let process = ctx.process(value.process_definition_key)?;
    let targets: Vec<String> = element
        .outgoing
        .iter()
        .filter_map(|flow_id| process.flow(flow_id).map(|flow| flow.target.clone()))
        .collect();

    if !catch_event::subscribe(ctx, key, &targets)? {
        return Ok(());
    }
    ctx.element_event(key, ProcessInstanceIntent::ElementActivated, &value)
}

/// After COMPLETED: acknowledge the trigger and take the flow leading to the
/// catch event that fired.
pub fn after_event_based_completed(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
) -> Result<(), EngineError> {
    let instance = ctx.instance(key)?;
    let value = instance.value.clone();
    let Some(trigger) = instance.event_triggers.first().cloned() else {
        return Err(EngineError::corruption(
            ctx.record.position,
            format!("event-based gateway {key} completed without a triggered event"),
        ));
    };
    let process = ctx.process(value.process_definition_key)?;
    let flow_id = element
        .outgoing
        .iter()
        .find(|flow_id| {
            process
                .flow(flow_id)
                .is_some_and(|flow| flow.target == trigger.target_element_id)
        })
        .cloned()
        .ok_or_else(|| EngineError::UnknownElement {
            process_definition_key: value.process_definition_key,
            element_id: trigger.target_element_id.clone(),
        })?;

    catch_event::write_triggered(ctx, key, &value, &trigger)?;
    behavior::on_element_completed(ctx, key, element, Some(vec![flow_id]))
}
