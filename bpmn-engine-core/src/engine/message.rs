//! Message publication and correlation.
//!
//! Correlation is two-phased: publishing (or opening a subscription while a
//! buffered message waits) writes MESSAGE_SUBSCRIPTION CORRELATING, which
//! locks an interrupting subscription, and a CORRELATE command. Processing
//! that command checks that the owner can still be triggered. A rejected
//! CORRELATE writes REJECTED and hands the message to the next subscription of
//! the same process instance that can still take it.

use super::catch_event;
use super::context::ProcessingContext;
use crate::error::EngineError;
use crate::record::*;
use crate::types::*;
use std::collections::BTreeSet;
use tracing::{debug, info};

pub fn publish(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let RecordValue::Message(message) = &ctx.record.value else {
        ctx.reject(Rejection::invalid_argument("Expected a message to publish"));
        return Ok(());
    };
    let message = message.clone();
    if message.name.is_empty() {
        ctx.reject(Rejection::invalid_argument("Expected a message name, but it is empty"));
        return Ok(());
    }

    let message_key = ctx.next_key();
    ctx.append_event(
        message_key,
        Intent::Message(MessageIntent::Published),
        RecordValue::Message(message.clone()),
    )?;
    info!(
        message_key,
        name = %message.name,
        correlation_key = %message.correlation_key,
        "message published"
    );

    let subscriptions: Vec<(Key, MessageSubscriptionRecord, bool)> = ctx
        .state
        .subscriptions
        .matching(&message.name, &message.correlation_key)
        .into_iter()
        .map(|s| (s.key, s.record.clone(), s.correlating))
        .collect();

    // A message correlates at most once per process instance
    let mut correlated = BTreeSet::new();
    for (subscription_key, record, locked) in subscriptions {
        if locked {
            debug!(subscription_key, "subscription is locked by another message");
            continue;
        }
        if !correlated.insert(record.process_instance_key) {
            continue;
        }
        begin_correlation(ctx, subscription_key, &record, message_key, message.variables.clone())?;
    }
    Ok(())
}

/// CORRELATING plus the CORRELATE command that finishes the correlation.
pub fn begin_correlation(
    ctx: &mut ProcessingContext<'_>,
    subscription_key: Key,
    subscription: &MessageSubscriptionRecord,
    message_key: Key,
    variables: Variables,
) -> Result<(), EngineError> {
    let record = MessageSubscriptionRecord {
        message_key: Some(message_key),
        variables,
        ..subscription.clone()
    };
    ctx.append_event(
        subscription_key,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlating),
        RecordValue::MessageSubscription(record.clone()),
    )?;
    ctx.append_command(
        Some(subscription_key),
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlate),
        RecordValue::MessageSubscription(record),
    );
    Ok(())
}

pub fn correlate(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let (Some(key), RecordValue::MessageSubscription(command)) = (ctx.record.key, &ctx.record.value)
    else {
        ctx.reject(Rejection::invalid_argument(
            "Expected a message subscription command with a key",
        ));
        return Ok(());
    };
    let command = command.clone();

    let Some(subscription) = ctx.state.subscriptions.message(key) else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to correlate message subscription '{key}', but no such subscription was found"
        )));
        return Ok(());
    };
    let open = subscription.open;
    let subscription = subscription.record.clone();
    if !open {
        ctx.reject(Rejection::invalid_state(format!(
            "Expected to correlate message subscription '{key}', but it is already closed"
        )));
        return release(ctx, key, &subscription, &command);
    }

    if let Some(rejection) =
        catch_event::trigger_rejection(ctx, subscription.element_instance_key, &subscription.handler_element_id)?
    {
        ctx.reject(rejection);
        return release(ctx, key, &subscription, &command);
    }

    ctx.append_event(
        key,
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlated),
        RecordValue::MessageSubscription(MessageSubscriptionRecord {
            message_key: command.message_key,
            variables: command.variables,
            ..subscription.clone()
        }),
    )?;
    catch_event::trigger_event(ctx, subscription.element_instance_key, &subscription.handler_element_id)
}

/// Release the message of a rejected CORRELATE and retry it on another open,
/// unlocked subscription of the same process instance.
fn release(
    ctx: &mut ProcessingContext<'_>,
    subscription_key: Key,
    subscription: &MessageSubscriptionRecord,
    command: &MessageSubscriptionRecord,
) -> Result<(), EngineError> {
    let Some(message_key) = command.message_key else {
        return Ok(());
    };
    ctx.append_event(
        subscription_key,
        Intent::MessageSubscription(MessageSubscriptionIntent::Rejected),
        RecordValue::MessageSubscription(MessageSubscriptionRecord {
            message_key: Some(message_key),
            variables: command.variables.clone(),
            ..subscription.clone()
        }),
    )?;

    let now = ctx.now();
    if ctx
        .state
        .messages
        .get(message_key)
        .is_some_and(|message| message.deadline <= now)
    {
        return Ok(());
    }

    let candidates: Vec<(Key, MessageSubscriptionRecord)> = ctx
        .state
        .subscriptions
        .matching(&subscription.message_name, &subscription.correlation_key)
        .into_iter()
        .filter(|s| {
            s.key != subscription_key
                && !s.correlating
                && s.record.process_instance_key == subscription.process_instance_key
        })
        .map(|s| (s.key, s.record.clone()))
        .collect();
    for (candidate_key, candidate) in candidates {
        // Owners that can't be triggered anymore would only reject again
        if catch_event::trigger_rejection(ctx, candidate.element_instance_key, &candidate.handler_element_id)?
            .is_none()
        {
            debug!(subscription_key = candidate_key, message_key, "retrying rejected correlation");
            return begin_correlation(ctx, candidate_key, &candidate, message_key, command.variables.clone());
        }
    }
    Ok(())
}

pub fn expire(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let Some(key) = ctx.record.key else {
        ctx.reject(Rejection::invalid_argument("Expected a message key to expire"));
        return Ok(());
    };
    let Some(message) = ctx.state.messages.get(key) else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to expire message '{key}', but it is not buffered"
        )));
        return Ok(());
    };
    if message.deadline > ctx.now() {
        let reason = format!(
            "Expected message '{key}' to have expired, but its time to live ends at {}",
            message.deadline
        );
        ctx.reject(Rejection::invalid_state(reason));
        return Ok(());
    }
    let record = message.record.clone();
    ctx.append_event(key, Intent::Message(MessageIntent::Expired), RecordValue::Message(record))
}
