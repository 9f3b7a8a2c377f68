//! Rate-limited progress reporting.
//!
//! A transport may copy several files concurrently, but the server must
//! see one ordered stream per operation. Every report goes through one
//! channel and one forwarder task, which drops intermediate reports that
//! arrive faster than the configured interval. The newest report is
//! always delivered before the forwarder finishes.

use std::time::Duration;

use async_trait::async_trait;
use savesync_core::operation::Progress;
use savesync_core::types::OperationId;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::DispatchClient;

/// Cloneable sender half handed to a transport.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    tx: mpsc::UnboundedSender<Progress>,
}

impl ProgressHandle {
    /// Queue a report. Invalid values (negative counts) are dropped.
    pub fn report(&self, current: i64, total: i64, message: impl Into<String>) {
        match Progress::new(current, total, message) {
            Ok(progress) => {
                let _ = self.tx.send(progress);
            }
            Err(e) => tracing::debug!(error = %e, "Dropping invalid progress report"),
        }
    }
}

/// Create a handle and the receiver a forwarder drains.
pub fn channel() -> (ProgressHandle, mpsc::UnboundedReceiver<Progress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressHandle { tx }, rx)
}

/// Where forwarded reports end up.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, progress: Progress);
}

/// Sends reports for one operation to the server. Failures are logged;
/// progress is advisory and a lost report is superseded by the next.
pub struct ServerProgressSink {
    client: DispatchClient,
    operation_id: OperationId,
}

impl ServerProgressSink {
    pub fn new(client: DispatchClient, operation_id: OperationId) -> Self {
        Self {
            client,
            operation_id,
        }
    }
}

#[async_trait]
impl ProgressSink for ServerProgressSink {
    async fn send(&self, progress: Progress) {
        if let Err(e) = self.client.progress(self.operation_id, &progress).await {
            tracing::warn!(
                operation_id = %self.operation_id,
                error = %e,
                "Failed to report progress"
            );
        }
    }
}

/// Decides which reports go out. Pure; the caller supplies the time.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<Progress>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
            pending: None,
        }
    }

    /// Returns the report if it may be sent at `now`; otherwise keeps it
    /// as the pending report, replacing any older one.
    pub fn offer(&mut self, progress: Progress, now: Instant) -> Option<Progress> {
        if self.ready_at().is_some_and(|at| now < at) {
            self.pending = Some(progress);
            return None;
        }
        self.pending = None;
        self.last_sent = Some(now);
        Some(progress)
    }

    /// Earliest instant the next report may go out.
    pub fn ready_at(&self) -> Option<Instant> {
        self.last_sent.map(|at| at + self.min_interval)
    }

    /// The held-back report, if any, marking it as sent at `now`.
    pub fn take_pending(&mut self, now: Instant) -> Option<Progress> {
        let pending = self.pending.take()?;
        self.last_sent = Some(now);
        Some(pending)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Drain `rx` into `sink`, throttled, until every handle is dropped. The
/// newest report is flushed before returning.
pub async fn forward(
    mut rx: mpsc::UnboundedReceiver<Progress>,
    mut throttle: Throttle,
    sink: impl ProgressSink,
) {
    loop {
        let deadline = throttle
            .ready_at()
            .filter(|_| throttle.has_pending());

        tokio::select! {
            received = rx.recv() => match received {
                Some(progress) => {
                    if let Some(progress) = throttle.offer(progress, Instant::now()) {
                        sink.send(progress).await;
                    }
                }
                None => break,
            },
            _ = sleep_until(deadline) => {
                if let Some(progress) = throttle.take_pending(Instant::now()) {
                    sink.send(progress).await;
                }
            }
        }
    }

    if let Some(progress) = throttle.take_pending(Instant::now()) {
        sink.send(progress).await;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
