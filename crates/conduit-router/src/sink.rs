//! Fire-and-forget outcome delivery.

use crate::metrics::{MetricsAggregator, Outcome};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Consumer of finished outcomes.
///
/// `submit` must not block: slow consumers buffer or drop.
pub trait OutcomeSink: Send + Sync {
    /// Delivers one outcome.
    fn submit(&self, outcome: &Outcome);
}

impl OutcomeSink for MetricsAggregator {
    fn submit(&self, outcome: &Outcome) {
        self.record(outcome.clone());
    }
}

/// Bounded channel sink. Drops outcomes when the buffer is full.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<Outcome>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outcome>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, dropped: AtomicU64::new(0) }, receiver)
    }

    /// Outcomes dropped because the buffer was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl OutcomeSink for ChannelSink {
    fn submit(&self, outcome: &Outcome) {
        match self.sender.try_send(outcome.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(request_id = %dropped.request_id, "Outcome buffer full, dropping outcome");
            }
            Err(TrySendError::Closed(dropped)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(request_id = %dropped.request_id, "Outcome receiver closed, dropping outcome");
            }
        }
    }
}

/// Appends outcomes to a local file as JSON lines.
pub struct JsonlWriter;

impl JsonlWriter {
    /// Spawns a task draining `receiver` into `path`.
    ///
    /// The task ends when every sender is dropped and resolves to the
    /// number of lines written.
    pub fn spawn(path: impl Into<PathBuf>, mut receiver: mpsc::Receiver<Outcome>) -> JoinHandle<std::io::Result<u64>> {
        let path = path.into();
        tokio::spawn(async move {
            let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
            let mut written = 0u64;
            while let Some(outcome) = receiver.recv().await {
                let mut line = match serde_json::to_vec(&outcome) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(request_id = %outcome.request_id, error = %e, "Failed to serialize outcome");
                        continue;
                    }
                };
                line.push(b'\n');
                file.write_all(&line).await?;
                file.flush().await?;
                written += 1;
            }
            debug!(path = %path.display(), written, "Outcome log closed");
            Ok(written)
        })
    }

    /// Channel sink wired to a writer task.
    pub fn channel(path: impl Into<PathBuf>, capacity: usize) -> (ChannelSink, JoinHandle<std::io::Result<u64>>) {
        let (sink, receiver) = ChannelSink::new(capacity);
        (sink, Self::spawn(path, receiver))
    }
}
