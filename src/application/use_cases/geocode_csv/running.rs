//! Running pipeline: a byte stream plus a monitor for its terminal outcome.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tracing::{error, warn};

use super::stages::PipelineError;

/// One serialized, encoded record
pub(crate) struct Chunk {
    pub bytes: Bytes,
    pub is_row: bool,
}

/// How a running pipeline ended
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed { rows: u64, bytes: u64 },
    Failed { error: PipelineError, rows: u64, bytes: u64 },
    /// The consumer dropped the stream before it ended
    Aborted { rows: u64, bytes: u64 },
}

impl PipelineOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            PipelineOutcome::Completed { .. } => "completed",
            PipelineOutcome::Failed { .. } => "failed",
            PipelineOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// Resolves once the paired [`PipelineStream`] finishes, fails or is dropped.
pub struct PipelineMonitor {
    receiver: oneshot::Receiver<PipelineOutcome>,
}

impl PipelineMonitor {
    pub async fn outcome(self) -> PipelineOutcome {
        self.receiver
            .await
            .unwrap_or(PipelineOutcome::Aborted { rows: 0, bytes: 0 })
    }
}

/// Re-encoded CSV bytes. Ends right after the first error.
pub struct PipelineStream {
    inner: BoxStream<'static, Result<Chunk, PipelineError>>,
    reporter: Option<oneshot::Sender<PipelineOutcome>>,
    started: Instant,
    rows: u64,
    bytes: u64,
}

impl PipelineStream {
    pub(crate) fn new(
        inner: BoxStream<'static, Result<Chunk, PipelineError>>,
    ) -> (Self, PipelineMonitor) {
        let (sender, receiver) = oneshot::channel();
        let stream = Self {
            inner,
            reporter: Some(sender),
            started: Instant::now(),
            rows: 0,
            bytes: 0,
        };
        (stream, PipelineMonitor { receiver })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn finish(&mut self, outcome: PipelineOutcome) {
        if let Some(reporter) = self.reporter.take() {
            let _ = reporter.send(outcome);
        }
    }
}

impl Stream for PipelineStream {
    type Item = Result<Bytes, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.reporter.is_none() {
            return Poll::Ready(None);
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                if chunk.is_row {
                    self.rows += 1;
                }
                self.bytes += chunk.bytes.len() as u64;
                Poll::Ready(Some(Ok(chunk.bytes)))
            }
            Poll::Ready(Some(Err(err))) => {
                error!(
                    stage = %err.stage,
                    row = err.row,
                    rows_written = self.rows,
                    bytes_written = self.bytes,
                    elapsed_ms = self.started.elapsed().as_millis() as u64,
                    error = %err.source,
                    "CSV pipeline failed mid-stream"
                );
                let outcome = PipelineOutcome::Failed {
                    error: err.clone(),
                    rows: self.rows,
                    bytes: self.bytes,
                };
                self.finish(outcome);
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                let outcome = PipelineOutcome::Completed {
                    rows: self.rows,
                    bytes: self.bytes,
                };
                self.finish(outcome);
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for PipelineStream {
    fn drop(&mut self) {
        if self.reporter.is_some() {
            warn!(
                rows_written = self.rows,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "CSV pipeline dropped before completion"
            );
            let outcome = PipelineOutcome::Aborted {
                rows: self.rows,
                bytes: self.bytes,
            };
            self.finish(outcome);
        }
    }
}
