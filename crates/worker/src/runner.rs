//! The worker's cooperative poll loop.

use std::sync::Arc;
use std::time::Duration;

use savesync_core::operation::OperationKind;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::{DispatchClient, PendingOperation};
use crate::error::WorkerResult;
use crate::progress::{self, ProgressHandle, ServerProgressSink, Throttle};
use crate::transport::{SavePayload, Transport, TransportError, TransportResult};

/// What happened to one polled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    /// `start` was not applied: another attempt already started or
    /// finished it.
    Skipped,
}

/// Per-tick summary, mostly for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub heartbeat_sent: bool,
    pub polled: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TickReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

pub struct Runner {
    client: DispatchClient,
    transport: Arc<dyn Transport>,
    heartbeat_interval: Duration,
    progress_min_interval: Duration,
    last_heartbeat: Option<Instant>,
}

impl Runner {
    pub fn new(
        client: DispatchClient,
        transport: Arc<dyn Transport>,
        heartbeat_interval: Duration,
        progress_min_interval: Duration,
    ) -> Self {
        Self {
            client,
            transport,
            heartbeat_interval,
            progress_min_interval,
            last_heartbeat: None,
        }
    }

    /// One iteration: heartbeat if due, poll, then run every pending
    /// operation in the order the server returned them.
    pub async fn tick(&mut self) -> WorkerResult<TickReport> {
        let mut report = TickReport::default();

        let now = Instant::now();
        let due = self
            .last_heartbeat
            .map_or(true, |at| now.duration_since(at) >= self.heartbeat_interval);
        if due {
            let status = self.client.heartbeat().await?;
            self.last_heartbeat = Some(now);
            report.heartbeat_sent = true;
            tracing::debug!(
                client_id = %status.client_id,
                claimed = status.claimed,
                "Heartbeat acknowledged"
            );
        }

        let operations = self.client.poll().await?;
        report.polled = operations.len();
        for op in operations {
            let outcome = self.process(op).await?;
            report.record(outcome);
        }
        Ok(report)
    }

    /// Start, execute, and settle one operation.
    async fn process(&self, op: PendingOperation) -> WorkerResult<Outcome> {
        if !self.client.start(op.operation_id).await? {
            tracing::info!(operation_id = %op.operation_id, "Operation already started, skipping");
            return Ok(Outcome::Skipped);
        }
        tracing::info!(operation_id = %op.operation_id, kind = %op.kind, "Executing operation");

        let (handle, rx) = progress::channel();
        let sink = ServerProgressSink::new(self.client.clone(), op.operation_id);
        let forwarder = tokio::spawn(progress::forward(
            rx,
            Throttle::new(self.progress_min_interval),
            sink,
        ));

        let result = self.execute(&op, &handle).await;
        drop(handle);
        if let Err(e) = forwarder.await {
            tracing::warn!(operation_id = %op.operation_id, error = %e, "Progress forwarder panicked");
        }

        match result {
            Ok(()) => {
                self.client.complete(op.operation_id).await?;
                tracing::info!(operation_id = %op.operation_id, "Operation completed");
                Ok(Outcome::Completed)
            }
            Err(e) => {
                let message = e.to_string();
                self.client.fail(op.operation_id, &message).await?;
                tracing::warn!(operation_id = %op.operation_id, error = %message, "Operation failed");
                Ok(Outcome::Failed)
            }
        }
    }

    async fn execute(&self, op: &PendingOperation, handle: &ProgressHandle) -> TransportResult<()> {
        let payload = SavePayload::from_value(&op.payload)?;
        match &op.kind {
            OperationKind::Save => self.transport.save(&payload, handle).await,
            OperationKind::Load => self.transport.load(&payload, handle).await,
            OperationKind::Delete | OperationKind::DeleteOneSave => {
                self.transport.delete(&payload, handle).await
            }
            OperationKind::BackupAll => self.transport.backup_all(handle).await,
            OperationKind::DeleteAll => self.transport.delete_all(handle).await,
            other => Err(TransportError::Unsupported(other.to_string())),
        }
    }

    /// Tick every `poll_interval` until `cancel` fires. Errors are logged
    /// and retried on the next tick.
    pub async fn run(mut self, poll_interval: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            client_id = %self.client.client_id(),
            poll_interval_secs = poll_interval.as_secs(),
            "Worker poll loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker poll loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report.polled > 0 => {
                            tracing::info!(
                                polled = report.polled,
                                completed = report.completed,
                                failed = report.failed,
                                skipped = report.skipped,
                                "Tick finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Force a heartbeat on the next tick once the server is back.
                            self.last_heartbeat = None;
                            tracing::error!(error = %e, "Worker tick failed");
                        }
                    }
                }
            }
        }
    }
}
