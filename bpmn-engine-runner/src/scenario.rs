use anyhow::{Context, Result};
use bpmn_engine_core::record::{
    Command, Intent, ProcessInstanceCreationIntent, Record, RecordValue,
};
use bpmn_engine_core::{Key, Partition, Variables};
use serde::Deserialize;
use std::path::Path;

/// A scripted sequence of commands fed through one partition.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Clock value at the start, epoch milliseconds.
    #[serde(default)]
    pub start_time: i64,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    CreateInstance {
        process: String,
        #[serde(default)]
        version: Option<u32>,
        #[serde(default)]
        variables: Variables,
    },
    /// Complete the oldest activatable job of the given type.
    CompleteJob {
        job_type: String,
        #[serde(default)]
        variables: Variables,
    },
    PublishMessage {
        name: String,
        correlation_key: String,
        #[serde(default)]
        time_to_live_ms: u64,
        #[serde(default)]
        variables: Variables,
    },
    /// Move the clock forward and process whatever became due.
    AdvanceClock {
        millis: i64,
    },
    /// Update the variables of the most recently created instance.
    UpdateVariables {
        variables: Variables,
    },
    ResolveIncidents,
    /// Cancel the most recently created instance.
    CancelInstance,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_yaml::from_str(&yaml).with_context(|| format!("invalid scenario {}", path.display()))
    }
}

/// Drives a partition through the steps of a scenario.
pub struct ScenarioRunner<'p> {
    partition: &'p mut Partition,
    advance: Box<dyn Fn(i64) + 'p>,
    last_instance: Option<Key>,
}

impl<'p> ScenarioRunner<'p> {
    pub fn new(partition: &'p mut Partition, advance: impl Fn(i64) + 'p) -> Self {
        Self {
            partition,
            advance: Box::new(advance),
            last_instance: None,
        }
    }

    /// Run one step and return the records it wrote.
    pub async fn run_step(&mut self, step: &Step) -> Result<Vec<Record>> {
        let records = match step {
            Step::CreateInstance {
                process,
                version,
                variables,
            } => {
                let mut command = Command::create_instance(process.clone(), variables.clone());
                if let RecordValue::ProcessInstanceCreation(request) = &mut command.value {
                    request.version = *version;
                }
                let records = self.partition.execute(command).await?;
                if let Some(key) = records
                    .iter()
                    .find(|r| {
                        r.intent
                            == Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Created)
                    })
                    .and_then(|r| r.key)
                {
                    self.last_instance = Some(key);
                }
                records
            }
            Step::CompleteJob {
                job_type,
                variables,
            } => {
                let job_key = self
                    .partition
                    .state()
                    .jobs
                    .activatable()
                    .find(|job| &job.record.job_type == job_type)
                    .map(|job| job.key)
                    .with_context(|| format!("no activatable job of type '{job_type}'"))?;
                self.partition
                    .execute(Command::complete_job(job_key, variables.clone()))
                    .await?
            }
            Step::PublishMessage {
                name,
                correlation_key,
                time_to_live_ms,
                variables,
            } => {
                self.partition
                    .execute(Command::publish_message(
                        name.clone(),
                        correlation_key.clone(),
                        *time_to_live_ms,
                        variables.clone(),
                    ))
                    .await?
            }
            Step::AdvanceClock { millis } => {
                (self.advance)(*millis);
                self.partition.tick().await?
            }
            Step::UpdateVariables { variables } => {
                let key = self.last_instance()?;
                self.partition
                    .execute(Command::update_variables(key, variables.clone()))
                    .await?
            }
            Step::ResolveIncidents => {
                let incidents: Vec<Key> = self
                    .partition
                    .state()
                    .incidents
                    .open()
                    .map(|incident| incident.key)
                    .collect();
                let mut records = Vec::new();
                for incident_key in incidents {
                    records.extend(
                        self.partition
                            .execute(Command::resolve_incident(incident_key))
                            .await?,
                    );
                }
                records
            }
            Step::CancelInstance => {
                let key = self.last_instance()?;
                self.partition.execute(Command::cancel_instance(key)).await?
            }
        };
        Ok(records)
    }

    fn last_instance(&self) -> Result<Key> {
        self.last_instance
            .context("no process instance was created yet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_parses() {
        let yaml = r#"
start_time: 1000
steps:
  - step: create_instance
    process: order
    variables:
      foo: 4
  - step: complete_job
    job_type: type1
  - step: publish_message
    name: payment
    correlation_key: o-1
    time_to_live_ms: 5000
  - step: advance_clock
    millis: 60000
  - step: resolve_incidents
  - step: cancel_instance
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.start_time, 1000);
        assert_eq!(scenario.steps.len(), 6);
        assert!(matches!(
            &scenario.steps[0],
            Step::CreateInstance { process, version: None, variables } if process == "order" && variables["foo"] == 4
        ));
        assert!(matches!(scenario.steps[3], Step::AdvanceClock { millis: 60000 }));
        assert!(matches!(scenario.steps[5], Step::CancelInstance));
    }
}
