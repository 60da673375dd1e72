//! Writers used while processing one command.
//!
//! Events are applied to the state the moment they are written, so every
//! later step of the same command observes them. Follow-up commands are only
//! collected; they are processed after being appended to the log.

use super::applier;
use crate::error::EngineError;
use crate::expression::ExpressionEvaluator;
use crate::model::{ElementTreeProvider, ExecutableElement, ExecutableProcess};
use crate::record::*;
use crate::state::{ElementInstance, EngineState};
use crate::types::*;
use std::sync::Arc;

pub struct ProcessingContext<'a> {
    pub record: &'a Record,
    pub state: &'a mut EngineState,
    pub provider: &'a dyn ElementTreeProvider,
    pub evaluator: &'a dyn ExpressionEvaluator,
    follow_ups: Vec<FollowUpRecord>,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(
        record: &'a Record,
        state: &'a mut EngineState,
        provider: &'a dyn ElementTreeProvider,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> Self {
        Self {
            record,
            state,
            provider,
            evaluator,
            follow_ups: Vec::new(),
        }
    }

    /// Processing time. Always the timestamp of the command being processed,
    /// never the wall clock.
    pub fn now(&self) -> Timestamp {
        self.record.timestamp
    }

    pub fn next_key(&mut self) -> Key {
        self.state.keys.next_key()
    }

    pub fn into_follow_ups(self) -> Vec<FollowUpRecord> {
        self.follow_ups
    }

    // ── Writers ──

    pub fn append_event(
        &mut self,
        key: Key,
        intent: Intent,
        value: RecordValue,
    ) -> Result<(), EngineError> {
        applier::apply_event(
            self.state,
            self.provider,
            self.record.position,
            key,
            intent,
            &value,
            self.record.timestamp,
        )?;
        self.push(Some(key), RecordType::Event, intent, value, None);
        Ok(())
    }

    pub fn append_command(&mut self, key: Option<Key>, intent: Intent, value: RecordValue) {
        self.push(key, RecordType::Command, intent, value, None);
    }

    /// Reject the command being processed. The rejection carries the
    /// command's key, intent and value.
    pub fn reject(&mut self, rejection: Rejection) {
        tracing::warn!(
            position = self.record.position,
            intent = ?self.record.intent,
            rejection_type = ?rejection.rejection_type,
            reason = %rejection.reason,
            "command rejected"
        );
        self.push(
            self.record.key,
            RecordType::CommandRejection,
            self.record.intent,
            self.record.value.clone(),
            Some(rejection),
        );
    }

    fn push(
        &mut self,
        key: Option<Key>,
        record_type: RecordType,
        intent: Intent,
        value: RecordValue,
        rejection: Option<Rejection>,
    ) {
        self.follow_ups.push(FollowUpRecord {
            source_record_position: self.record.position,
            key,
            timestamp: self.record.timestamp,
            record_type,
            intent,
            value,
            rejection,
        });
    }

    // ── Process instance shorthands ──

    pub fn element_event(
        &mut self,
        key: Key,
        intent: ProcessInstanceIntent,
        value: &ProcessInstanceRecord,
    ) -> Result<(), EngineError> {
        self.append_event(
            key,
            Intent::ProcessInstance(intent),
            RecordValue::ProcessInstance(value.clone()),
        )
    }

    pub fn element_command(
        &mut self,
        key: Key,
        intent: ProcessInstanceIntent,
        value: &ProcessInstanceRecord,
    ) {
        self.append_command(
            Some(key),
            Intent::ProcessInstance(intent),
            RecordValue::ProcessInstance(value.clone()),
        );
    }

    // ── Lookups ──

    pub fn instance(&self, key: Key) -> Result<&ElementInstance, EngineError> {
        self.state
            .element_instances
            .get(key)
            .ok_or_else(|| EngineError::corruption(self.record.position, format!("element instance {key} not found")))
    }

    pub fn process(&self, process_definition_key: Key) -> Result<Arc<ExecutableProcess>, EngineError> {
        self.provider
            .process(process_definition_key)
            .ok_or(EngineError::UnknownProcessDefinition(process_definition_key))
    }

    pub fn element(
        &self,
        process_definition_key: Key,
        element_id: &str,
    ) -> Result<ExecutableElement, EngineError> {
        self.provider
            .element(process_definition_key, element_id)
            .ok_or_else(|| EngineError::UnknownElement {
                process_definition_key,
                element_id: element_id.to_string(),
            })
    }

    /// Variables visible to expressions of the given process instance.
    pub fn variables(&self, process_instance_key: Key) -> Variables {
        self.state.variables.document(process_instance_key)
    }
}
