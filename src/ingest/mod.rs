//! Transport consumer loop.
//!
//! Receives raw messages, decodes them, and hands each update to either the
//! batch processor or the dispatcher before acknowledging it. Undecodable
//! messages are logged and acknowledged, since redelivery cannot fix them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::batch::{BatchCategory, BatchError, BatchProcessor};
use crate::bus::{decode, BusError, Transport};
use crate::model::GraphUpdate;
use crate::pipeline::{PipelineError, Submitter};

/// Where an update was handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Batch,
    Dispatcher,
}

/// Counters for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub received: u64,
    pub decoded: u64,
    pub dropped: u64,
    pub batched: u64,
}

pub struct IngestRouter {
    submitter: Submitter,
    batch: Option<Arc<BatchProcessor>>,
    retry_delay: Duration,
}

impl IngestRouter {
    pub fn new(submitter: Submitter) -> Self {
        Self {
            submitter,
            batch: None,
            retry_delay: Duration::ZERO,
        }
    }

    /// Send node, link and prefix updates through `batch`, waiting
    /// `retry_delay` whenever its queue is full.
    pub fn with_batch(mut self, batch: Arc<BatchProcessor>, retry_delay: Duration) -> Self {
        self.batch = Some(batch);
        self.retry_delay = retry_delay;
        self
    }

    pub async fn route(&self, update: GraphUpdate) -> Result<Route, PipelineError> {
        if let Some(batch) = &self.batch {
            if BatchCategory::of(&update.record).is_some() {
                loop {
                    match batch.submit(update.clone()) {
                        Ok(()) => return Ok(Route::Batch),
                        Err(BatchError::QueueFull(category)) => {
                            debug!(%category, "Batch queue full, waiting one flush interval");
                            tokio::time::sleep(self.retry_delay).await;
                        }
                        Err(e) => {
                            debug!(error = %e, "Batch path unavailable, using dispatcher");
                            break;
                        }
                    }
                }
            }
        }
        self.submitter.submit(update)?;
        Ok(Route::Dispatcher)
    }
}

/// Consume `transport` until it is exhausted or `stop` fires.
pub async fn run_ingest<T>(
    transport: &mut T,
    router: &IngestRouter,
    mut stop: watch::Receiver<bool>,
) -> Result<IngestReport, BusError>
where
    T: Transport + ?Sized,
{
    let mut report = IngestReport::default();
    info!("Ingest started");

    loop {
        let message = tokio::select! {
            biased;
            _ = stop.changed() => break,
            received = transport.receive() => match received? {
                Some(message) => message,
                None => {
                    info!("Transport exhausted");
                    break;
                }
            },
        };
        report.received += 1;

        match decode(&message) {
            Ok(update) => {
                report.decoded += 1;
                match router.route(update).await {
                    Ok(Route::Batch) => report.batched += 1,
                    Ok(Route::Dispatcher) => {}
                    Err(e) => {
                        // Leave the message unacked so it is redelivered.
                        warn!(offset = message.offset, error = %e, "Hand-off failed, stopping ingest");
                        break;
                    }
                }
            }
            Err(e) => {
                report.dropped += 1;
                warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "Dropping undecodable message"
                );
            }
        }

        transport.ack(&message).await?;
    }

    info!(
        received = report.received,
        decoded = report.decoded,
        dropped = report.dropped,
        "Ingest stopped"
    );
    Ok(report)
}
