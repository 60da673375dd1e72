//! Clocks and the due-date checker.
//!
//! Time only enters the engine through the timestamps of submitted commands.
//! The checker turns due timers and expired buffered messages into TRIGGER
//! and EXPIRE commands; whether they still apply is decided when they are
//! processed.

use crate::record::Command;
use crate::state::EngineState;
use crate::types::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Epoch milliseconds.
    fn now(&self) -> Timestamp;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ControlledClock {
    now: AtomicI64,
}

impl ControlledClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, millis: i64) -> Timestamp {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ControlledClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// TRIGGER commands for open timers due at `now` (ordered by due date, then
/// key) followed by EXPIRE commands for buffered messages past their time to
/// live.
pub fn due_commands(state: &EngineState, now: Timestamp) -> Vec<Command> {
    let timers = state
        .subscriptions
        .due_timers(now)
        .into_iter()
        .map(|timer| Command::trigger_timer(timer.key, timer.record.clone()));
    let messages = state
        .messages
        .expired(now)
        .into_iter()
        .map(|message| Command::expire_message(message.key, message.record.clone()));
    timers.chain(messages).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::*;
    use crate::Variables;

    fn timer(owner: u64, due_date: Timestamp) -> TimerRecord {
        TimerRecord {
            element_instance_key: owner,
            process_instance_key: 1,
            process_definition_key: 1,
            target_element_id: format!("timer_{owner}"),
            due_date,
            repetitions: None,
            interval_ms: 0,
        }
    }

    #[test]
    fn test_controlled_clock_advances() {
        let clock = ControlledClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(500), 1_500);
        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now() > 0);
    }

    #[test]
    fn test_due_commands_ordered_by_due_date_then_key() {
        let mut state = EngineState::new(1);
        state.subscriptions.add_timer(30, timer(3, 200));
        state.subscriptions.add_timer(20, timer(2, 100));
        state.subscriptions.add_timer(10, timer(1, 100));
        state.subscriptions.add_timer(40, timer(4, 999));

        let keys: Vec<Option<u64>> = due_commands(&state, 200).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec![Some(10), Some(20), Some(30)]);

        state.subscriptions.close_timer(10);
        let keys: Vec<Option<u64>> = due_commands(&state, 200).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec![Some(20), Some(30)]);
    }

    #[test]
    fn test_expired_messages_are_collected() {
        let mut state = EngineState::new(1);
        state.messages.buffer(
            7,
            MessageRecord {
                name: "order".into(),
                correlation_key: "a".into(),
                time_to_live_ms: 100,
                variables: Variables::new(),
            },
            1_100,
        );
        assert!(due_commands(&state, 1_099).is_empty());

        let commands = due_commands(&state, 1_100);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].intent, Intent::Message(MessageIntent::Expire));
        assert_eq!(commands[0].key, Some(7));
    }
}
