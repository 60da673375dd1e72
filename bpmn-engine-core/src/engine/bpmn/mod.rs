//! BPMN element processors.
//!
//! The `PROCESS_INSTANCE` lifecycle commands land here and are dispatched by
//! element kind: containers (process, sub-process, event sub-process), the
//! service task, events and gateways.

pub mod activity;
pub mod behavior;
pub mod container;
pub mod event;
pub mod gateway;
pub mod termination;

use super::context::ProcessingContext;
use crate::error::EngineError;
use crate::model::ElementKind;
use crate::record::*;
use crate::types::*;

fn command_target(ctx: &mut ProcessingContext<'_>) -> Option<(Key, ProcessInstanceRecord)> {
    match (ctx.record.key, &ctx.record.value) {
        (Some(key), RecordValue::ProcessInstance(value)) => Some((key, value.clone())),
        _ => {
            ctx.reject(Rejection::invalid_argument(
                "Expected a process instance command with a key",
            ));
            None
        }
    }
}

// ─── ACTIVATE_ELEMENT ─────────────────────────────────────────

pub fn activate(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let Some((key, value)) = command_target(ctx) else {
        return Ok(());
    };
    let Some(element) = ctx
        .provider
        .element(value.process_definition_key, &value.element_id)
    else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to activate element '{}', but it is not part of process definition {}",
            value.element_id, value.process_definition_key
        )));
        return Ok(());
    };

    // An existing ACTIVATING instance is re-activated after its incident was resolved
    let retry = match ctx.state.element_instances.get(key) {
        None => false,
        Some(existing) if existing.state == LifecycleState::Activating => true,
        Some(existing) => {
            let reason = format!(
                "Expected element instance '{key}' to be ACTIVATING to retry its activation, but it is {}",
                existing.state
            );
            ctx.reject(Rejection::invalid_state(reason));
            return Ok(());
        }
    };

    if let Some(scope_key) = value.flow_scope_key {
        let rejection = match ctx.state.element_instances.get(scope_key) {
            None => Some(Rejection::not_found(format!(
                "Expected flow scope '{scope_key}' of element '{}' to exist, but it was not found",
                value.element_id
            ))),
            Some(scope) if scope.state != LifecycleState::Activated => {
                Some(Rejection::invalid_state(format!(
                    "Expected flow scope '{scope_key}' to be ACTIVATED to activate element '{}', but it is {}",
                    value.element_id, scope.state
                )))
            }
            Some(scope)
                if scope.interrupted && element.element_type() != BpmnElementType::EventSubProcess =>
            {
                Some(Rejection::invalid_state(format!(
                    "Expected to activate element '{}', but flow scope '{scope_key}' was interrupted",
                    value.element_id
                )))
            }
            Some(scope)
                if element.is_parallel_gateway()
                    && !retry
                    && !scope.join_ready(&element.id, &element.incoming) =>
            {
                Some(Rejection::invalid_state(format!(
                    "Expected every incoming sequence flow of '{}' to be taken, but some are still missing",
                    element.id
                )))
            }
            Some(scope)
                if element.is_inclusive_join() && !retry && !scope.has_waiting_tokens(&element.id) =>
            {
                Some(Rejection::invalid_state(format!(
                    "Expected a token to wait at '{}', but it was already merged",
                    element.id
                )))
            }
            Some(_) => None,
        };
        if let Some(rejection) = rejection {
            ctx.reject(rejection);
            return Ok(());
        }
    }

    if !retry {
        ctx.element_event(key, ProcessInstanceIntent::ElementActivating, &value)?;
    }

    match &element.kind {
        ElementKind::Process | ElementKind::SubProcess | ElementKind::EventSubProcess => {
            container::activate(ctx, key, &element)
        }
        ElementKind::ServiceTask { .. } => activity::activate(ctx, key, &element),
        ElementKind::StartEvent { .. } | ElementKind::BoundaryEvent { .. } => {
            event::activate_pass_through(ctx, key, &element)
        }
        ElementKind::EndEvent { terminate } => event::activate_end(ctx, key, &element, *terminate),
        ElementKind::IntermediateCatchEvent { .. } => event::activate_catch(ctx, key, &element),
        ElementKind::ExclusiveGateway => gateway::activate_exclusive(ctx, key, &element),
        ElementKind::ParallelGateway => gateway::activate_parallel(ctx, key, &element),
        ElementKind::InclusiveGateway => gateway::activate_inclusive(ctx, key, &element),
        ElementKind::EventBasedGateway => gateway::activate_event_based(ctx, key, &element),
    }
}

// ─── COMPLETE_ELEMENT ─────────────────────────────────────────

pub fn complete(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let Some((key, _)) = command_target(ctx) else {
        return Ok(());
    };
    let Some(instance) = ctx.state.element_instances.get(key) else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to complete element instance '{key}', but no such instance was found"
        )));
        return Ok(());
    };
    if instance.state != LifecycleState::Activated {
        let reason = format!(
            "Expected element instance '{key}' to be ACTIVATED to complete it, but it is {}",
            instance.state
        );
        ctx.reject(Rejection::invalid_state(reason));
        return Ok(());
    }
    let instance = instance.clone();
    let element = ctx.element(instance.value.process_definition_key, instance.element_id())?;

    if element.element_type().is_container()
        && (instance.active_children > 0 || instance.active_sequence_flows > 0)
    {
        ctx.reject(Rejection::invalid_state(format!(
            "Expected element instance '{key}' to have no active children or sequence flows, but it has {} children and {} sequence flows",
            instance.active_children, instance.active_sequence_flows
        )));
        return Ok(());
    }

    let value = instance.value;
    ctx.element_event(key, ProcessInstanceIntent::ElementCompleting, &value)?;
    super::catch_event::unsubscribe(ctx, key, |_| true)?;
    ctx.element_event(key, ProcessInstanceIntent::ElementCompleted, &value)?;

    match &element.kind {
        ElementKind::EventBasedGateway => gateway::after_event_based_completed(ctx, key, &element),
        ElementKind::IntermediateCatchEvent { .. } => event::after_catch_completed(ctx, key, &element),
        _ => behavior::on_element_completed(ctx, key, &element, None),
    }
}

// ─── TERMINATE_ELEMENT / CANCEL ───────────────────────────────

pub fn terminate(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let Some((key, _)) = command_target(ctx) else {
        return Ok(());
    };
    match ctx.state.element_instances.get(key) {
        None => {
            ctx.reject(Rejection::not_found(format!(
                "Expected to terminate element instance '{key}', but no such instance was found"
            )));
            Ok(())
        }
        Some(instance) if !instance.is_active() => {
            let reason = format!(
                "Expected element instance '{key}' to be ACTIVATING or ACTIVATED to terminate it, but it is {}",
                instance.state
            );
            ctx.reject(Rejection::invalid_state(reason));
            Ok(())
        }
        Some(_) => termination::terminate_element(ctx, key),
    }
}

pub fn cancel(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let Some((key, _)) = command_target(ctx) else {
        return Ok(());
    };
    match ctx.state.element_instances.get(key) {
        None => {
            ctx.reject(Rejection::not_found(format!(
                "Expected to cancel a process instance with key '{key}', but no such process instance was found"
            )));
            Ok(())
        }
        Some(instance) if instance.flow_scope_key().is_some() => {
            ctx.reject(Rejection::invalid_argument(format!(
                "Expected to cancel a process instance, but '{key}' is the element instance of '{}'",
                instance.element_id()
            )));
            Ok(())
        }
        Some(instance) if !instance.is_active() => {
            let reason = format!(
                "Expected to cancel process instance '{key}', but it is already {}",
                instance.state
            );
            ctx.reject(Rejection::invalid_state(reason));
            Ok(())
        }
        Some(_) => {
            tracing::info!(process_instance_key = key, "canceling process instance");
            termination::terminate_element(ctx, key)
        }
    }
}
