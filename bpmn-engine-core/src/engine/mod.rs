//! Record processor
//!
//! Applies one record at a time. Commands are dispatched to their processor,
//! which writes events (applied to the state immediately), follow-up commands
//! and rejections. Events and rejections in the log are never processed again;
//! on recovery they are replayed through the event applier only.

pub mod applier;
pub mod bpmn;
pub mod catch_event;
pub mod context;
pub mod creation;
pub mod incident;
pub mod job;
pub mod message;
pub mod timer;
pub mod variable;

use crate::error::EngineError;
use crate::expression::ExpressionEvaluator;
use crate::model::ElementTreeProvider;
use crate::record::*;
use crate::state::EngineState;
use context::ProcessingContext;
use std::sync::Arc;
use tracing::{debug, error};

pub struct Engine {
    state: EngineState,
    provider: Arc<dyn ElementTreeProvider>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    /// Set by the first fatal error. The partition must stop.
    failure: Option<String>,
}

impl Engine {
    pub fn new(
        partition_id: u32,
        provider: Arc<dyn ElementTreeProvider>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        Self {
            state: EngineState::new(partition_id),
            provider,
            evaluator,
            failure: None,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.failure.is_some()
    }

    /// Process one record and return the records it produces. Only commands
    /// produce anything.
    pub fn apply(&mut self, record: &Record) -> Result<Vec<FollowUpRecord>, EngineError> {
        self.ensure_running()?;
        if let Some(key) = record.key {
            self.state.keys.observe(key);
        }
        if !record.is_command() {
            return Ok(Vec::new());
        }

        debug!(
            position = record.position,
            key = ?record.key,
            intent = ?record.intent,
            "processing command"
        );

        let mut ctx = ProcessingContext::new(
            record,
            &mut self.state,
            self.provider.as_ref(),
            self.evaluator.as_ref(),
        );
        match dispatch(&mut ctx) {
            Ok(()) => Ok(ctx.into_follow_ups()),
            Err(e) => {
                error!(position = record.position, error = %e, "fatal error while processing");
                self.failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Rebuild state from an already processed record.
    pub fn replay(&mut self, record: &Record) -> Result<(), EngineError> {
        self.ensure_running()?;
        if let Some(key) = record.key {
            self.state.keys.observe(key);
        }
        if !record.is_event() {
            return Ok(());
        }
        let key = record.key.ok_or_else(|| {
            EngineError::corruption(record.position, "event record without key")
        })?;
        let result = applier::apply_event(
            &mut self.state,
            self.provider.as_ref(),
            record.position,
            key,
            record.intent,
            &record.value,
            record.timestamp,
        );
        if let Err(e) = &result {
            error!(position = record.position, error = %e, "fatal error while replaying");
            self.failure = Some(e.to_string());
        }
        result
    }

    /// Stop the engine from the outside, e.g. when the follow-ups of an
    /// applied command could not be written. Its state is ahead of the log.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(reason = %reason, "engine stopped");
        self.failure.get_or_insert(reason);
    }

    pub fn ensure_running(&self) -> Result<(), EngineError> {
        match &self.failure {
            Some(reason) => Err(EngineError::PartitionStopped(reason.clone())),
            None => Ok(()),
        }
    }
}

fn dispatch(ctx: &mut ProcessingContext<'_>) -> Result<(), EngineError> {
    match ctx.record.intent {
        Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Create) => {
            creation::create(ctx)
        }
        Intent::ProcessInstance(ProcessInstanceIntent::ActivateElement) => bpmn::activate(ctx),
        Intent::ProcessInstance(ProcessInstanceIntent::CompleteElement) => bpmn::complete(ctx),
        Intent::ProcessInstance(ProcessInstanceIntent::TerminateElement) => bpmn::terminate(ctx),
        Intent::ProcessInstance(ProcessInstanceIntent::Cancel) => bpmn::cancel(ctx),
        Intent::Job(JobIntent::Complete) => job::complete(ctx),
        Intent::Timer(TimerIntent::Trigger) => timer::trigger(ctx),
        Intent::Message(MessageIntent::Publish) => message::publish(ctx),
        Intent::Message(MessageIntent::Expire) => message::expire(ctx),
        Intent::MessageSubscription(MessageSubscriptionIntent::Correlate) => message::correlate(ctx),
        Intent::Incident(IncidentIntent::Resolve) => incident::resolve(ctx),
        Intent::VariableDocument(VariableDocumentIntent::Update) => variable::update(ctx),
        intent => {
            ctx.reject(Rejection::invalid_argument(format!(
                "{intent:?} is not a command"
            )));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::SimpleExpressionEvaluator;
    use crate::model::ProcessRepository;
    use crate::types::*;

    fn engine() -> Engine {
        Engine::new(
            1,
            Arc::new(ProcessRepository::new()),
            Arc::new(SimpleExpressionEvaluator::new()),
        )
    }

    fn activated_event(key: Key) -> Record {
        FollowUpRecord {
            source_record_position: 1,
            key: Some(key),
            timestamp: 0,
            record_type: RecordType::Event,
            intent: Intent::ProcessInstance(ProcessInstanceIntent::ElementActivated),
            value: RecordValue::ProcessInstance(ProcessInstanceRecord {
                bpmn_process_id: "missing".into(),
                version: 1,
                process_definition_key: 1,
                process_instance_key: key,
                element_id: "missing".into(),
                bpmn_element_type: BpmnElementType::Process,
                flow_scope_key: None,
            }),
            rejection: None,
        }
        .into_record(2)
    }

    #[test]
    fn test_fatal_error_stops_the_engine() {
        let mut engine = engine();
        let err = engine.replay(&activated_event(42)).unwrap_err();
        assert!(matches!(err, EngineError::StateCorruption { position: 2, .. }));
        assert!(engine.is_stopped());

        let command = Command::cancel_instance(42).into_follow_up(0).into_record(3);
        assert!(matches!(
            engine.apply(&command),
            Err(EngineError::PartitionStopped(_))
        ));
    }

    #[test]
    fn test_command_for_unknown_instance_is_rejected() {
        let mut engine = engine();
        let command = Command::cancel_instance(42).into_follow_up(5).into_record(1);
        let follow_ups = engine.apply(&command).unwrap();

        assert_eq!(follow_ups.len(), 1);
        let rejection = &follow_ups[0];
        assert_eq!(rejection.record_type, RecordType::CommandRejection);
        assert_eq!(rejection.source_record_position, 1);
        assert_eq!(
            rejection.rejection.as_ref().map(|r| r.rejection_type),
            Some(RejectionType::NotFound)
        );
        assert!(!engine.is_stopped());
    }

    #[test]
    fn test_events_are_not_processed_again() {
        let mut engine = engine();
        let record = activated_event(42);
        assert!(engine.apply(&record).unwrap().is_empty());
        assert!(!engine.is_stopped());
    }
}
