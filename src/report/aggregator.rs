//! Background task that persists reporters.
//!
//! The driver hands each finished [`Reporter`] to [`Aggregator::submit`], which
//! waits until the task has written that record before returning. The task owns
//! the audit logs exclusively; [`Aggregator::shutdown`] consumes the handle,
//! closes the stream and waits for the task to flush. File writes run on the
//! blocking pool so a slow disk never stalls a runtime worker.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::writer::AuditWriter;
use super::{Disposition, Reporter};

/// Error type for the audit aggregator
#[derive(Debug)]
pub enum ReportError {
    /// The report directory or a log file could not be created
    Io(std::io::Error),
    /// A record could not be written
    Csv(csv::Error),
    /// The aggregator stopped before accepting a record
    Closed,
    /// The aggregator task panicked or was aborted
    Join(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "report IO error: {}", e),
            ReportError::Csv(e) => write!(f, "report write error: {}", e),
            ReportError::Closed => write!(f, "report aggregator is no longer accepting records"),
            ReportError::Join(msg) => write!(f, "report aggregator failed: {}", msg),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Io(e) => Some(e),
            ReportError::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err)
    }
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::Csv(err)
    }
}

/// Counts of persisted records, returned when the aggregator drains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Directory holding the three logs
    pub directory: PathBuf,
    pub filtered: usize,
    pub changed: usize,
    pub noop: usize,
    /// Whether the task stopped because of the cancellation signal
    pub cancelled: bool,
}

impl ReportSummary {
    /// Total number of reporters written.
    pub fn total(&self) -> usize {
        self.filtered + self.changed + self.noop
    }
}

/// A reporter paired with the acknowledgement the producer is waiting on.
struct Submission {
    reporter: Reporter,
    ack: oneshot::Sender<()>,
}

/// Handle to the running aggregator task.
pub struct Aggregator {
    sender: mpsc::Sender<Submission>,
    task: JoinHandle<Result<ReportSummary, ReportError>>,
    directory: PathBuf,
}

impl Aggregator {
    /// Create a fresh `<root>/<timestamp>-<random>` directory, open the audit
    /// logs in it and start the aggregator task.
    ///
    /// # Arguments
    /// * `root` - Parent directory for report runs (created if missing)
    /// * `cancel` - Flag that makes the task stop and flush when set to `true`
    ///
    /// # Errors
    /// Returns an error if the directory or any log file cannot be created.
    pub fn start(root: &Path, cancel: watch::Receiver<bool>) -> Result<Self, ReportError> {
        let stamp = format!(
            "{}-{}",
            Local::now().format("%Y%m%d-%H%M%S"),
            Uuid::new_v4().simple()
        );
        let directory = root.join(stamp);
        fs::create_dir_all(&directory)?;
        let writer = AuditWriter::create(&directory)?;
        tracing::info!("reports will be written to {}", directory.display());

        let (sender, receiver) = mpsc::channel(1);
        let task = tokio::spawn(run(writer, receiver, cancel, directory.clone()));

        Ok(Self {
            sender,
            task,
            directory,
        })
    }

    /// Directory the logs are written to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Hand `reporter` to the aggregator and wait until it has been written.
    ///
    /// # Errors
    /// Returns `ReportError::Closed` if the task has already stopped (for
    /// example after cancellation).
    pub async fn submit(&self, reporter: Reporter) -> Result<(), ReportError> {
        let (ack, accepted) = oneshot::channel();
        self.sender
            .send(Submission { reporter, ack })
            .await
            .map_err(|_| ReportError::Closed)?;
        accepted.await.map_err(|_| ReportError::Closed)
    }

    /// Close the stream and wait for the task to drain and flush.
    pub async fn shutdown(self) -> Result<ReportSummary, ReportError> {
        drop(self.sender);
        self.task
            .await
            .map_err(|e| ReportError::Join(e.to_string()))?
    }
}

/// Resolves once the flag is set. Never resolves if the sender goes away
/// without setting it.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run `op` against the writer on the blocking pool and hand the writer back.
async fn blocking<T, F>(
    mut writer: AuditWriter<fs::File>,
    op: F,
) -> Result<(AuditWriter<fs::File>, T), ReportError>
where
    F: FnOnce(&mut AuditWriter<fs::File>) -> Result<T, ReportError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let value = op(&mut writer)?;
        Ok((writer, value))
    })
    .await
    .map_err(|e| ReportError::Join(format!("spawn_blocking failed: {}", e)))?
}

async fn run(
    mut writer: AuditWriter<fs::File>,
    mut receiver: mpsc::Receiver<Submission>,
    mut cancel: watch::Receiver<bool>,
    directory: PathBuf,
) -> Result<ReportSummary, ReportError> {
    let mut summary = ReportSummary {
        directory,
        ..ReportSummary::default()
    };

    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                tracing::info!("reporter exiting on cancellation");
                summary.cancelled = true;
                break;
            }
            submission = receiver.recv() => {
                let Some(Submission { reporter, ack }) = submission else {
                    break;
                };
                let (next, disposition) =
                    blocking(writer, move |w| Ok(w.record(&reporter)?)).await?;
                writer = next;
                match disposition {
                    Disposition::Filtered => summary.filtered += 1,
                    Disposition::Changed => summary.changed += 1,
                    Disposition::Noop => summary.noop += 1,
                }
                // The producer may have given up waiting; the record is written either way.
                let _ = ack.send(());
            }
        }
    }

    receiver.close();
    blocking(writer, |w| Ok(w.flush()?)).await?;
    tracing::debug!(
        "reporter drained: {} filtered, {} changed, {} no-op",
        summary.filtered,
        summary.changed,
        summary.noop
    );
    Ok(summary)
}
