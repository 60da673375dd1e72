use super::catch_event;
use super::context::ProcessingContext;
use crate::error::EngineError;
use crate::record::*;

/// TIMER TRIGGER, submitted by the due-date checker.
///
/// Rejected if the timer is closed, not due yet, or its owner can no longer
/// be triggered; of two timers due at the same instant only the first one
/// processed wins. A cycle timer is re-armed with the remaining repetitions.
pub fn trigger(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    let Some(key) = ctx.record.key else {
        ctx.reject(Rejection::invalid_argument("Expected a timer key to trigger"));
        return Ok(());
    };
    let Some(timer) = ctx.state.subscriptions.timer(key) else {
        ctx.reject(Rejection::not_found(format!(
            "Expected to trigger timer with key '{key}', but no such timer was found"
        )));
        return Ok(());
    };
    if !timer.open {
        ctx.reject(Rejection::invalid_state(format!(
            "Expected to trigger timer with key '{key}', but it was already triggered or canceled"
        )));
        return Ok(());
    }
    if timer.record.due_date > ctx.now() {
        let reason = format!(
            "Expected timer '{key}' to be due, but it is due at {}",
            timer.record.due_date
        );
        ctx.reject(Rejection::invalid_state(reason));
        return Ok(());
    }
    let record = timer.record.clone();

    if let Some(rejection) =
        catch_event::trigger_rejection(ctx, record.element_instance_key, &record.target_element_id)?
    {
        ctx.reject(rejection);
        return Ok(());
    }

    ctx.append_event(key, Intent::Timer(TimerIntent::Triggered), RecordValue::Timer(record.clone()))?;

    if let Some(remaining) = record.repetitions.filter(|n| *n > 0) {
        let next_key = ctx.next_key();
        let interval = i64::try_from(record.interval_ms).unwrap_or(i64::MAX);
        ctx.append_event(
            next_key,
            Intent::Timer(TimerIntent::Created),
            RecordValue::Timer(TimerRecord {
                due_date: record.due_date.saturating_add(interval),
                repetitions: Some(remaining - 1),
                ..record.clone()
            }),
        )?;
    }

    catch_event::trigger_event(ctx, record.element_instance_key, &record.target_element_id)
}
