//! Event applier: the only code path that mutates [`EngineState`].
//!
//! Used at write time while processing and again, with the same inputs, when
//! a partition replays its log.

use crate::error::EngineError;
use crate::model::{ElementKind, ElementTreeProvider};
use crate::record::*;
use crate::state::{ElementInstance, EngineState, EventTrigger, JobStatus};
use crate::types::*;

pub fn apply_event(
    state: &mut EngineState,
    provider: &dyn ElementTreeProvider,
    position: Position,
    key: Key,
    intent: Intent,
    value: &RecordValue,
    timestamp: Timestamp,
) -> Result<(), EngineError> {
    let corrupt = |message: String| EngineError::corruption(position, message);

    match (intent, value) {
        (Intent::ProcessInstance(intent), RecordValue::ProcessInstance(value)) => {
            apply_process_instance(state, provider, key, intent, value).map_err(corrupt)
        }

        (
            Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Created),
            RecordValue::ProcessInstanceCreation(value),
        ) => {
            state.variables.merge(key, &value.variables);
            Ok(())
        }

        (Intent::Job(intent), RecordValue::Job(value)) => {
            match intent {
                JobIntent::Created => {
                    state.jobs.create(key, value.clone());
                    let instance = state
                        .element_instances
                        .get_mut(value.element_instance_key)
                        .ok_or_else(|| corrupt(format!("job {key} without element instance")))?;
                    instance.job_key = Some(key);
                }
                JobIntent::Completed => {
                    state.jobs.set_status(key, JobStatus::Completed);
                    // The task is about to complete; a late boundary trigger loses
                    if let Some(instance) = state.element_instances.get_mut(value.element_instance_key) {
                        instance.accepting_events = false;
                    }
                    state
                        .variables
                        .merge(value.process_instance_key, &value.variables);
                }
                JobIntent::Canceled => {
                    state.jobs.set_status(key, JobStatus::Canceled);
                }
                JobIntent::Complete => return Err(corrupt(format!("{intent:?} is not an event"))),
            }
            Ok(())
        }

        (Intent::Timer(intent), RecordValue::Timer(value)) => {
            match intent {
                TimerIntent::Created => state.subscriptions.add_timer(key, value.clone()),
                TimerIntent::Triggered | TimerIntent::Canceled => {
                    state.subscriptions.close_timer(key);
                }
                TimerIntent::Trigger => return Err(corrupt(format!("{intent:?} is not an event"))),
            }
            Ok(())
        }

        (Intent::Message(intent), RecordValue::Message(value)) => {
            match intent {
                MessageIntent::Published => {
                    if value.time_to_live_ms > 0 {
                        let ttl = i64::try_from(value.time_to_live_ms).unwrap_or(i64::MAX);
                        state
                            .messages
                            .buffer(key, value.clone(), timestamp.saturating_add(ttl));
                    }
                }
                MessageIntent::Expired => {
                    state.messages.remove(key);
                }
                MessageIntent::Publish | MessageIntent::Expire => {
                    return Err(corrupt(format!("{intent:?} is not an event")))
                }
            }
            Ok(())
        }

        (Intent::MessageSubscription(intent), RecordValue::MessageSubscription(value)) => {
            match intent {
                MessageSubscriptionIntent::Opened => {
                    state.subscriptions.open_message(key, value.clone());
                }
                MessageSubscriptionIntent::Correlating => {
                    let message_key = value
                        .message_key
                        .ok_or_else(|| corrupt(format!("subscription {key} correlating without message")))?;
                    state
                        .subscriptions
                        .mark_correlating(key, message_key, value.interrupting);
                    state
                        .messages
                        .mark_correlated(message_key, value.process_instance_key);
                }
                MessageSubscriptionIntent::Correlated => {
                    state
                        .variables
                        .merge(value.process_instance_key, &value.variables);
                    state.subscriptions.mark_correlated(key);
                }
                MessageSubscriptionIntent::Deleted => {
                    state.subscriptions.close_message(key);
                }
                MessageSubscriptionIntent::Rejected => {
                    state.subscriptions.unlock(key);
                    if let Some(message_key) = value.message_key {
                        state
                            .messages
                            .unmark_correlated(message_key, value.process_instance_key);
                    }
                }
                MessageSubscriptionIntent::Correlate => {
                    return Err(corrupt(format!("{intent:?} is not an event")))
                }
            }
            Ok(())
        }

        (Intent::ProcessEvent(intent), RecordValue::ProcessEvent(value)) => {
            apply_process_event(state, provider, key, intent, value).map_err(corrupt)
        }

        (Intent::Incident(intent), RecordValue::Incident(value)) => {
            match intent {
                IncidentIntent::Created => state.incidents.create(key, value.clone()),
                IncidentIntent::Resolved => {
                    state.incidents.resolve(key);
                }
                IncidentIntent::Resolve => {
                    return Err(corrupt(format!("{intent:?} is not an event")))
                }
            }
            Ok(())
        }

        (
            Intent::VariableDocument(VariableDocumentIntent::Updated),
            RecordValue::VariableDocument(value),
        ) => {
            state.variables.merge(value.scope_key, &value.variables);
            Ok(())
        }

        (intent, _) => Err(corrupt(format!(
            "no event applier for {intent:?} with this value"
        ))),
    }
}

fn apply_process_instance(
    state: &mut EngineState,
    provider: &dyn ElementTreeProvider,
    key: Key,
    intent: ProcessInstanceIntent,
    value: &ProcessInstanceRecord,
) -> Result<(), String> {
    use ProcessInstanceIntent::*;

    match intent {
        ElementActivating => {
            let element = provider
                .element(value.process_definition_key, &value.element_id)
                .ok_or_else(|| format!("element '{}' not deployed", value.element_id))?;
            state
                .element_instances
                .insert(ElementInstance::new(key, value.clone()));

            if let Some(scope) = flow_scope_mut(state, value)? {
                scope.active_children += 1;
                // Tokens that reached the element are consumed: one per
                // incoming flow for a join, the single arriving one otherwise.
                if element.is_parallel_gateway() {
                    let consumed = element.incoming.len() as u32;
                    if let Some(taken) = scope.taken_sequence_flows.get_mut(&element.id) {
                        for flow_id in &element.incoming {
                            if let Some(count) = taken.get_mut(flow_id) {
                                *count = count.saturating_sub(1);
                            }
                        }
                        taken.retain(|_, count| *count > 0);
                        if taken.is_empty() {
                            scope.taken_sequence_flows.remove(&element.id);
                        }
                    }
                    scope.active_sequence_flows = scope.active_sequence_flows.saturating_sub(consumed);
                } else if element.is_inclusive_join() {
                    // One token from every incoming flow that carries one
                    let mut consumed = 0;
                    if let Some(taken) = scope.taken_sequence_flows.get_mut(&element.id) {
                        for count in taken.values_mut().filter(|count| **count > 0) {
                            *count -= 1;
                            consumed += 1;
                        }
                        taken.retain(|_, count| *count > 0);
                        if taken.is_empty() {
                            scope.taken_sequence_flows.remove(&element.id);
                        }
                    }
                    scope.active_sequence_flows = scope.active_sequence_flows.saturating_sub(consumed);
                } else if !element.incoming.is_empty() {
                    scope.active_sequence_flows = scope.active_sequence_flows.saturating_sub(1);
                    if let Some(count) = scope.tokens_in_flight.get_mut(&element.id) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            scope.tokens_in_flight.remove(&element.id);
                        }
                    }
                }
            }
        }
        ElementActivated => transition(state, key, LifecycleState::Activated)?,
        ElementCompleting => transition(state, key, LifecycleState::Completing)?,
        ElementCompleted => {
            transition(state, key, LifecycleState::Completed)?;
            let terminate_end = matches!(
                provider
                    .element(value.process_definition_key, &value.element_id)
                    .map(|e| e.kind),
                Some(ElementKind::EndEvent { terminate: true })
            );
            if let Some(scope) = flow_scope_mut(state, value)? {
                scope.active_children = scope.active_children.saturating_sub(1);
                if terminate_end {
                    scope.interrupted = true;
                    scope.clear_tokens();
                }
            }
        }
        ElementTerminating => {
            transition(state, key, LifecycleState::Terminating)?;
            if let Some(instance) = state.element_instances.get_mut(key) {
                instance.clear_tokens();
            }
        }
        ElementTerminated => {
            transition(state, key, LifecycleState::Terminated)?;
            if let Some(scope) = flow_scope_mut(state, value)? {
                scope.active_children = scope.active_children.saturating_sub(1);
            }
        }
        SequenceFlowTaken => {
            let process = provider
                .process(value.process_definition_key)
                .ok_or_else(|| format!("process definition {} not deployed", value.process_definition_key))?;
            let flow = process
                .flow(&value.element_id)
                .ok_or_else(|| format!("sequence flow '{}' not deployed", value.element_id))?;
            let target_is_join = process
                .element(&flow.target)
                .is_some_and(|target| target.is_join());

            let scope = flow_scope_mut(state, value)?
                .ok_or_else(|| format!("sequence flow '{}' taken outside a scope", flow.id))?;
            scope.active_sequence_flows += 1;
            if target_is_join {
                *scope
                    .taken_sequence_flows
                    .entry(flow.target.clone())
                    .or_default()
                    .entry(flow.id.clone())
                    .or_default() += 1;
            } else {
                *scope.tokens_in_flight.entry(flow.target.clone()).or_default() += 1;
            }
        }
        ActivateElement | CompleteElement | TerminateElement | Cancel => {
            return Err(format!("{intent:?} is not an event"));
        }
    }
    Ok(())
}

fn apply_process_event(
    state: &mut EngineState,
    provider: &dyn ElementTreeProvider,
    key: Key,
    intent: ProcessEventIntent,
    value: &ProcessEventRecord,
) -> Result<(), String> {
    let target_is_start_event = matches!(
        provider
            .element(value.process_definition_key, &value.target_element_id)
            .map(|e| e.kind),
        Some(ElementKind::StartEvent { .. })
    );
    let owner = state
        .element_instances
        .get_mut(value.scope_key)
        .ok_or_else(|| format!("event scope {} not found", value.scope_key))?;

    match intent {
        ProcessEventIntent::Triggering => {
            owner.event_triggers.push(EventTrigger {
                event_key: key,
                target_element_id: value.target_element_id.clone(),
                interrupting: value.interrupting,
            });
            if value.interrupting {
                if target_is_start_event {
                    owner.interrupted = true;
                    owner.clear_tokens();
                } else {
                    owner.accepting_events = false;
                }
            }
        }
        ProcessEventIntent::Triggered => {
            owner.event_triggers.retain(|t| t.event_key != key);
        }
    }
    Ok(())
}

fn transition(state: &mut EngineState, key: Key, next: LifecycleState) -> Result<(), String> {
    let instance = state
        .element_instances
        .get_mut(key)
        .ok_or_else(|| format!("element instance {key} not found"))?;
    if !instance.state.can_transition_to(next) {
        return Err(format!(
            "element instance {key} cannot go from {} to {next}",
            instance.state
        ));
    }
    instance.state = next;
    Ok(())
}

fn flow_scope_mut<'s>(
    state: &'s mut EngineState,
    value: &ProcessInstanceRecord,
) -> Result<Option<&'s mut ElementInstance>, String> {
    match value.flow_scope_key {
        None => Ok(None),
        Some(scope_key) => state
            .element_instances
            .get_mut(scope_key)
            .map(Some)
            .ok_or_else(|| format!("flow scope {scope_key} not found")),
    }
}
