//! Shared element behaviors: leaving an element, taking sequence flows and
//! completing the enclosing scope.

use crate::engine::context::ProcessingContext;
use crate::error::EngineError;
use crate::model::ExecutableElement;
use crate::record::*;
use crate::state::ElementInstance;
use crate::types::*;
use tracing::{debug, info};

/// Walk an element with nothing to wait for from ACTIVATING to COMPLETED.
pub fn complete_immediately(ctx: &mut ProcessingContext<'_>, key: Key) -> Result<(), EngineError> {
    let value = ctx.instance(key)?.value.clone();
    ctx.element_event(key, ProcessInstanceIntent::ElementActivated, &value)?;
    ctx.element_event(key, ProcessInstanceIntent::ElementCompleting, &value)?;
    ctx.element_event(key, ProcessInstanceIntent::ElementCompleted, &value)
}

/// Continue after `key` has been COMPLETED: take `flows` (all outgoing flows
/// of the element when `None`) or, without outgoing flows, try to complete
/// the flow scope. A scope that was interrupted or is leaving its ACTIVATED
/// state takes no more flows; it is only told that the child closed.
pub fn on_element_completed(
    ctx: &mut ProcessingContext<'_>,
    key: Key,
    element: &ExecutableElement,
    flows: Option<Vec<String>>,
) -> Result<(), EngineError> {
    let instance = ctx.instance(key)?;
    let Some(scope_key) = instance.flow_scope_key() else {
        info!(
            process_instance_key = instance.value.process_instance_key,
            bpmn_process_id = %instance.value.bpmn_process_id,
            "process instance completed"
        );
        return Ok(());
    };

    let scope = ctx.instance(scope_key)?;
    if scope.state != LifecycleState::Activated || scope.interrupted {
        return super::termination::on_child_closed(ctx, scope_key, key);
    }

    let flows = flows.unwrap_or_else(|| element.outgoing.clone());
    for flow_id in &flows {
        take_flow(ctx, key, flow_id)?;
    }
    // Every flow is taken before a waiting inclusive join looks at the scope
    super::gateway::activate_ready_inclusive_joins(ctx, scope_key)?;
    if flows.is_empty() {
        return complete_scope_if_possible(ctx, scope_key);
    }
    Ok(())
}

/// Write SEQUENCE_FLOW_TAKEN and activate the target. A parallel join is
/// activated by the arrival that makes it ready; tokens arriving on an
/// already waiting flow stay queued for a later activation. An inclusive join
/// is left to [`super::gateway::activate_ready_inclusive_joins`].
pub fn take_flow(
    ctx: &mut ProcessingContext<'_>,
    source_key: Key,
    flow_id: &str,
) -> Result<(), EngineError> {
    let source = ctx.instance(source_key)?.value.clone();
    let process = ctx.process(source.process_definition_key)?;
    let flow = process
        .flow(flow_id)
        .ok_or_else(|| EngineError::UnknownElement {
            process_definition_key: source.process_definition_key,
            element_id: flow_id.to_string(),
        })?;
    let target = ctx.element(source.process_definition_key, &flow.target)?;
    let scope_key = source.flow_scope_key.ok_or_else(|| {
        EngineError::corruption(ctx.record.position, format!("element instance {source_key} has no flow scope"))
    })?;

    let flow_value = ProcessInstanceRecord {
        element_id: flow.id.clone(),
        bpmn_element_type: BpmnElementType::SequenceFlow,
        flow_scope_key: Some(scope_key),
        ..source.clone()
    };
    let flow_key = ctx.next_key();
    ctx.element_event(flow_key, ProcessInstanceIntent::SequenceFlowTaken, &flow_value)?;

    if target.is_inclusive_join() {
        debug!(join = %target.id, flow = %flow.id, "token waiting at inclusive gateway");
        return Ok(());
    }
    if target.is_parallel_gateway() {
        let scope = ctx.instance(scope_key)?;
        let first_token = scope.taken_count(&target.id, &flow.id) == 1;
        if !(first_token && scope.join_ready(&target.id, &target.incoming)) {
            debug!(join = %target.id, flow = %flow.id, "parallel gateway waiting for tokens");
            return Ok(());
        }
    }

    activate_in_scope(ctx, &target, scope_key, &source)
}

/// Write ACTIVATE_ELEMENT for `element` under `scope_key` with a new key.
pub fn activate_in_scope(
    ctx: &mut ProcessingContext<'_>,
    element: &ExecutableElement,
    scope_key: Key,
    template: &ProcessInstanceRecord,
) -> Result<(), EngineError> {
    let value = ProcessInstanceRecord {
        element_id: element.id.clone(),
        bpmn_element_type: element.element_type(),
        flow_scope_key: Some(scope_key),
        ..template.clone()
    };
    let key = ctx.next_key();
    ctx.element_command(key, ProcessInstanceIntent::ActivateElement, &value);
    Ok(())
}

/// An ACTIVATED scope with no active children, no tokens in flight and no
/// pending interrupting trigger is done.
pub fn can_complete(scope: &ElementInstance) -> bool {
    scope.state == LifecycleState::Activated
        && scope.active_children == 0
        && scope.active_sequence_flows == 0
        && !scope.has_pending_interrupting_trigger()
}

pub fn complete_scope_if_possible(
    ctx: &mut ProcessingContext<'_>,
    scope_key: Key,
) -> Result<(), EngineError> {
    let scope = ctx.instance(scope_key)?;
    if can_complete(scope) {
        let value = scope.value.clone();
        ctx.element_command(scope_key, ProcessInstanceIntent::CompleteElement, &value);
    }
    Ok(())
}
