//! Event subscriptions and event triggering.
//!
//! An element instance owns the timer and message subscriptions of the events
//! that can interrupt or continue it: its own catch event, the catch events
//! behind an event-based gateway, boundary events and event sub-process
//! start events. When a subscription fires, the trigger is recorded on the
//! owner with PROCESS_EVENT TRIGGERING and handled according to the kind of
//! the target element.

use super::bpmn::termination;
use super::context::ProcessingContext;
use super::{incident, message};
use crate::error::EngineError;
use crate::model::{ElementKind, EventDefinition};
use crate::record::*;
use crate::state::EventTrigger;
use crate::types::*;
use tracing::debug;

enum Planned {
    Timer {
        target: String,
        duration_ms: u64,
        repetitions: Option<u32>,
    },
    Message {
        target: String,
        interrupting: bool,
        name: String,
        correlation_key: String,
    },
}

/// Open a subscription for each handler element owned by `owner_key`.
///
/// All correlation keys are evaluated before anything is written, so a
/// failing expression leaves no subscription behind. On failure an incident
/// is raised on the owner and `false` is returned.
pub fn subscribe(
    ctx: &mut ProcessingContext<'_>,
    owner_key: Key,
    handlers: &[String],
) -> Result<bool, EngineError> {
    if handlers.is_empty() {
        return Ok(true);
    }
    let owner = ctx.instance(owner_key)?.value.clone();
    let variables = ctx.variables(owner.process_instance_key);

    let mut planned = Vec::with_capacity(handlers.len());
    for handler_id in handlers {
        let handler = ctx.element(owner.process_definition_key, handler_id)?;
        match handler.trigger() {
            Some(EventDefinition::Timer {
                duration_ms,
                repetitions,
            }) => planned.push(Planned::Timer {
                target: handler.id.clone(),
                duration_ms: *duration_ms,
                repetitions: *repetitions,
            }),
            Some(EventDefinition::Message {
                name,
                correlation_key,
            }) => match ctx.evaluator.evaluate_correlation_key(correlation_key, &variables) {
                Ok(key) => planned.push(Planned::Message {
                    target: handler.id.clone(),
                    interrupting: handler.is_interrupting(),
                    name: name.clone(),
                    correlation_key: key,
                }),
                Err(e) => {
                    incident::raise(
                        ctx,
                        owner_key,
                        ErrorType::ExtractValueError,
                        format!(
                            "Failed to extract the correlation key for '{correlation_key}' of '{}': {e}",
                            handler.id
                        ),
                    )?;
                    return Ok(false);
                }
            },
            None => {
                return Err(EngineError::corruption(
                    ctx.record.position,
                    format!("'{handler_id}' has no event to subscribe to"),
                ))
            }
        }
    }

    for plan in planned {
        match plan {
            Planned::Timer {
                target,
                duration_ms,
                repetitions,
            } => {
                let due_date = ctx
                    .now()
                    .saturating_add(i64::try_from(duration_ms).unwrap_or(i64::MAX));
                let timer_key = ctx.next_key();
                ctx.append_event(
                    timer_key,
                    Intent::Timer(TimerIntent::Created),
                    RecordValue::Timer(TimerRecord {
                        element_instance_key: owner_key,
                        process_instance_key: owner.process_instance_key,
                        process_definition_key: owner.process_definition_key,
                        target_element_id: target,
                        due_date,
                        repetitions,
                        interval_ms: duration_ms,
                    }),
                )?;
            }
            Planned::Message {
                target,
                interrupting,
                name,
                correlation_key,
            } => {
                let subscription_key = ctx.next_key();
                let record = MessageSubscriptionRecord {
                    process_instance_key: owner.process_instance_key,
                    process_definition_key: owner.process_definition_key,
                    element_instance_key: owner_key,
                    handler_element_id: target,
                    message_name: name,
                    correlation_key,
                    interrupting,
                    message_key: None,
                    variables: Variables::new(),
                };
                ctx.append_event(
                    subscription_key,
                    Intent::MessageSubscription(MessageSubscriptionIntent::Opened),
                    RecordValue::MessageSubscription(record.clone()),
                )?;
                correlate_buffered(ctx, subscription_key, &record)?;
            }
        }
    }
    Ok(true)
}

/// A buffered message published before the subscription opened is
/// correlated right away.
fn correlate_buffered(
    ctx: &mut ProcessingContext<'_>,
    subscription_key: Key,
    record: &MessageSubscriptionRecord,
) -> Result<(), EngineError> {
    let now = ctx.now();
    let buffered = ctx
        .state
        .messages
        .first_uncorrelated(
            &record.message_name,
            &record.correlation_key,
            record.process_instance_key,
            now,
        )
        .map(|message| (message.key, message.record.variables.clone()));
    if let Some((message_key, variables)) = buffered {
        debug!(subscription_key, message_key, "correlating buffered message");
        message::begin_correlation(ctx, subscription_key, record, message_key, variables)?;
    }
    Ok(())
}

/// Close the open subscriptions of `owner_key` whose target element passes
/// `filter`.
pub fn unsubscribe(
    ctx: &mut ProcessingContext<'_>,
    owner_key: Key,
    filter: impl Fn(&str) -> bool,
) -> Result<(), EngineError> {
    let timers: Vec<(Key, TimerRecord)> = ctx
        .state
        .subscriptions
        .open_timers_of(owner_key)
        .into_iter()
        .filter(|timer| filter(&timer.record.target_element_id))
        .map(|timer| (timer.key, timer.record.clone()))
        .collect();
    for (timer_key, record) in timers {
        ctx.append_event(
            timer_key,
            Intent::Timer(TimerIntent::Canceled),
            RecordValue::Timer(record),
        )?;
    }

    let subscriptions: Vec<(Key, MessageSubscriptionRecord)> = ctx
        .state
        .subscriptions
        .open_messages_of(owner_key)
        .into_iter()
        .filter(|subscription| filter(&subscription.record.handler_element_id))
        .map(|subscription| (subscription.key, subscription.record.clone()))
        .collect();
    for (subscription_key, record) in subscriptions {
        ctx.append_event(
            subscription_key,
            Intent::MessageSubscription(MessageSubscriptionIntent::Deleted),
            RecordValue::MessageSubscription(record),
        )?;
    }
    Ok(())
}

/// Why the event of `target_element_id` can no longer be triggered on
/// `owner_key`, if it can't.
pub fn trigger_rejection(
    ctx: &ProcessingContext<'_>,
    owner_key: Key,
    target_element_id: &str,
) -> Result<Option<Rejection>, EngineError> {
    let Some(owner) = ctx.state.element_instances.get(owner_key) else {
        return Ok(Some(Rejection::not_found(format!(
            "Expected element instance '{owner_key}' to exist to trigger '{target_element_id}', but it was not found"
        ))));
    };
    if owner.state != LifecycleState::Activated {
        return Ok(Some(Rejection::invalid_state(format!(
            "Expected element instance '{owner_key}' to be ACTIVATED to trigger '{target_element_id}', but it is {}",
            owner.state
        ))));
    }
    if !owner.accepting_events {
        return Ok(Some(Rejection::invalid_state(format!(
            "Expected element instance '{owner_key}' to accept events, but another event was already triggered"
        ))));
    }
    if owner.interrupted {
        let element = ctx.element(owner.value.process_definition_key, owner.element_id())?;
        if !element.boundary_events.iter().any(|id| id == target_element_id) {
            return Ok(Some(Rejection::invalid_state(format!(
                "Expected element instance '{owner_key}' to accept '{target_element_id}', but it was interrupted"
            ))));
        }
    }
    Ok(None)
}

/// Record the trigger on the owner and react to it. Callers have checked
/// [`trigger_rejection`].
pub fn trigger_event(
    ctx: &mut ProcessingContext<'_>,
    owner_key: Key,
    target_element_id: &str,
) -> Result<(), EngineError> {
    let owner = ctx.instance(owner_key)?.value.clone();
    let target = ctx.element(owner.process_definition_key, target_element_id)?;
    let trigger = EventTrigger {
        event_key: ctx.next_key(),
        target_element_id: target.id.clone(),
        interrupting: target.is_interrupting(),
    };
    ctx.append_event(
        trigger.event_key,
        Intent::ProcessEvent(ProcessEventIntent::Triggering),
        RecordValue::ProcessEvent(ProcessEventRecord {
            scope_key: owner_key,
            target_element_id: trigger.target_element_id.clone(),
            process_instance_key: owner.process_instance_key,
            process_definition_key: owner.process_definition_key,
            interrupting: trigger.interrupting,
        }),
    )?;
    debug!(owner_key, target = %target.id, interrupting = trigger.interrupting, "event triggered");

    match &target.kind {
        ElementKind::IntermediateCatchEvent { .. } => {
            ctx.element_command(owner_key, ProcessInstanceIntent::CompleteElement, &owner);
            Ok(())
        }
        ElementKind::BoundaryEvent { .. } if trigger.interrupting => {
            ctx.element_command(owner_key, ProcessInstanceIntent::TerminateElement, &owner);
            Ok(())
        }
        ElementKind::StartEvent { .. } if trigger.interrupting => {
            // Only boundary events of the owner stay armed
            let boundary_events = ctx
                .element(owner.process_definition_key, &owner.element_id)?
                .boundary_events;
            unsubscribe(ctx, owner_key, |id| !boundary_events.iter().any(|b| b == id))?;

            let children: Vec<(Key, ProcessInstanceRecord)> = ctx
                .state
                .element_instances
                .active_children(owner_key)
                .into_iter()
                .map(|child| (child.key, child.value.clone()))
                .collect();
            for (child_key, child) in &children {
                ctx.element_command(*child_key, ProcessInstanceIntent::TerminateElement, child);
            }
            if ctx.instance(owner_key)?.active_children == 0 {
                termination::activate_handler(ctx, owner_key, &trigger)?;
            }
            Ok(())
        }
        _ => termination::activate_handler(ctx, owner_key, &trigger),
    }
}

/// PROCESS_EVENT TRIGGERED for a trigger handled by its owner.
pub fn write_triggered(
    ctx: &mut ProcessingContext<'_>,
    owner_key: Key,
    owner: &ProcessInstanceRecord,
    trigger: &EventTrigger,
) -> Result<(), EngineError> {
    ctx.append_event(
        trigger.event_key,
        Intent::ProcessEvent(ProcessEventIntent::Triggered),
        RecordValue::ProcessEvent(ProcessEventRecord {
            scope_key: owner_key,
            target_element_id: trigger.target_element_id.clone(),
            process_instance_key: owner.process_instance_key,
            process_definition_key: owner.process_definition_key,
            interrupting: trigger.interrupting,
        }),
    )
}
