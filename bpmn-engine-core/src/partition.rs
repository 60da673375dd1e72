//! Partition: the single consumer of one record log.
//!
//! Records are processed strictly in position order; the follow-ups of one
//! command are appended as one batch before the next command is read. A
//! spawned partition is one tokio task fed through a bounded queue, so no two
//! commands of a partition are ever processed concurrently.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::expression::ExpressionEvaluator;
use crate::log::RecordLog;
use crate::model::ElementTreeProvider;
use crate::record::{Command, Record};
use crate::scheduler::{due_commands, Clock};
use crate::state::EngineState;
use crate::types::Position;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub struct Partition {
    engine: Engine,
    log: Arc<dyn RecordLog>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Position of the next record to look at.
    cursor: Position,
}

impl Partition {
    /// Open a partition over `log`, replaying whatever it already holds.
    pub async fn open(
        config: EngineConfig,
        provider: Arc<dyn ElementTreeProvider>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        log: Arc<dyn RecordLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let mut engine = Engine::new(config.partition_id, provider, evaluator);

        let records = log.read_from(1).await?;
        let mut last_processed = 0;
        for record in &records {
            engine.replay(record)?;
            last_processed = last_processed.max(record.source_record_position);
        }
        if !records.is_empty() {
            info!(
                partition_id = config.partition_id,
                records = records.len(),
                last_processed,
                "partition recovered"
            );
        }

        Ok(Self {
            engine,
            log,
            clock,
            config,
            cursor: last_processed + 1,
        })
    }

    pub fn state(&self) -> &EngineState {
        self.engine.state()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<dyn RecordLog> {
        &self.log
    }

    /// Stamp `command` with the clock and append it. Returns its position.
    pub async fn submit(&self, command: Command) -> Result<Position, EngineError> {
        self.engine.ensure_running()?;
        let record = command.into_follow_up(self.clock.now());
        Ok(self.log.append(vec![record]).await?)
    }

    /// Apply unprocessed commands in position order, at most
    /// `max_commands_per_drain` of them. Returns the records written.
    pub async fn process_pending(&mut self) -> Result<Vec<Record>, EngineError> {
        let mut written = Vec::new();
        let mut processed = 0;

        loop {
            let records = self.log.read_from(self.cursor).await?;
            if records.is_empty() {
                return Ok(written);
            }
            for record in records {
                self.cursor = record.position + 1;
                if !record.is_command() {
                    continue;
                }

                let follow_ups = self.engine.apply(&record)?;
                if !follow_ups.is_empty() {
                    let count = follow_ups.len() as Position;
                    let last = match self.log.append(follow_ups.clone()).await {
                        Ok(last) => last,
                        Err(e) => {
                            self.engine.fail(format!(
                                "failed to append the follow-ups of command {}: {e:#}",
                                record.position
                            ));
                            return Err(EngineError::Log(e));
                        }
                    };
                    written.extend(
                        follow_ups
                            .into_iter()
                            .zip(last + 1 - count..)
                            .map(|(follow_up, position)| follow_up.into_record(position)),
                    );
                }

                processed += 1;
                if processed >= self.config.max_commands_per_drain {
                    debug!(processed, cursor = self.cursor, "drain limit reached");
                    return Ok(written);
                }
            }
        }
    }

    /// Process until no unprocessed command is left.
    pub async fn run_until_idle(&mut self) -> Result<Vec<Record>, EngineError> {
        let mut written = Vec::new();
        while self.cursor <= self.log.last_position().await? {
            written.extend(self.process_pending().await?);
        }
        Ok(written)
    }

    /// Submit `command` and process until idle. Returns the command record
    /// followed by everything written while processing.
    pub async fn execute(&mut self, command: Command) -> Result<Vec<Record>, EngineError> {
        let position = self.submit(command).await?;
        self.run_until_idle().await?;
        Ok(self.log.read_from(position).await?)
    }

    /// Submit TRIGGER and EXPIRE commands for everything due now. Returns the
    /// number of commands submitted.
    pub async fn check_due_dates(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let batch: Vec<_> = due_commands(self.engine.state(), now)
            .into_iter()
            .map(|command| command.into_follow_up(now))
            .collect();
        let count = batch.len();
        if count > 0 {
            debug!(count, now, "submitting due commands");
            self.log.append(batch).await?;
        }
        Ok(count)
    }

    /// Check due dates and process the resulting commands.
    pub async fn tick(&mut self) -> Result<Vec<Record>, EngineError> {
        self.check_due_dates().await?;
        self.run_until_idle().await
    }

    // ─── Spawned partition ─────────────────────────────────────

    /// Run the partition as a tokio task.
    pub fn spawn(self) -> PartitionHandle {
        let (requests_tx, requests_rx) = mpsc::channel(self.config.command_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(requests_rx, shutdown_rx));
        PartitionHandle {
            requests: requests_tx,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let partition_id = self.config.partition_id;
        let mut ticks = tokio::time::interval(self.config.due_date_check_interval());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(partition_id, "partition started");

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Execute { command, reply }) => {
                        let result = self.execute(command).await;
                        let stopped = self.engine.is_stopped();
                        let _ = reply.send(result);
                        if stopped {
                            return Err(EngineError::PartitionStopped(format!(
                                "partition {partition_id} stopped after a fatal error"
                            )));
                        }
                    }
                    Some(Request::Fingerprint { reply }) => {
                        let _ = reply.send(self.engine.state().fingerprint());
                    }
                    None => break,
                },
                _ = ticks.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(partition_id, error = %e, "due date check failed");
                        return Err(e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(partition_id, "partition shutting down");
        Ok(())
    }
}

enum Request {
    Execute {
        command: Command,
        reply: oneshot::Sender<Result<Vec<Record>, EngineError>>,
    },
    Fingerprint {
        reply: oneshot::Sender<String>,
    },
}

/// Client side of a spawned partition.
pub struct PartitionHandle {
    requests: mpsc::Sender<Request>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), EngineError>>,
}

impl PartitionHandle {
    /// Submit a command and wait until it and its follow-ups are processed.
    pub async fn execute(&self, command: Command) -> anyhow::Result<Vec<Record>> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Execute { command, reply })
            .await
            .map_err(|_| anyhow::anyhow!("partition is not running"))?;
        Ok(response.await.context("partition dropped the request")??)
    }

    pub async fn fingerprint(&self) -> anyhow::Result<String> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Fingerprint { reply })
            .await
            .map_err(|_| anyhow::anyhow!("partition is not running"))?;
        response.await.context("partition dropped the request")
    }

    /// Stop the partition and wait for its task to end.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.context("partition task failed")??;
        Ok(())
    }
}
