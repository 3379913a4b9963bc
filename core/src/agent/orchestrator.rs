//! Retry and deadline orchestration
//!
//! Each attempt stream is raced against its own deadline and the caller's
//! cancellation token. Failed attempts are dropped before the next one is
//! started, so no decoder state carries over.

use futures::StreamExt;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::pipeline::{AgentUpdate, UpdateStream};
use crate::config::RetryConfig;
use crate::error::RahyabError;
use crate::protocol::OperationStatus;

enum Step {
    Update(AgentUpdate),
    Failed(RahyabError),
    TimedOut,
    Cancelled,
}

pub struct Orchestrator {
    config: RetryConfig,
}

impl Orchestrator {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Drive attempts produced by `make_attempt` (called with the 0-based
    /// attempt number) until one yields a briefing.
    ///
    /// Between attempts a `RETRYING` status is emitted and the configured
    /// delay is awaited. Cancellation ends the run with
    /// [`RahyabError::Cancelled`] and is never retried.
    pub fn run<F>(&self, mut make_attempt: F, cancel: CancellationToken) -> UpdateStream
    where
        F: FnMut(u32) -> UpdateStream + Send + 'static,
    {
        let config = self.config.clone();

        Box::pin(async_stream::try_stream! {
            let total = config.total_attempts();
            let mut last_error = String::new();

            for attempt in 0..total {
                if cancel.is_cancelled() {
                    Err(RahyabError::Cancelled)?;
                }

                let mut updates = make_attempt(attempt);
                let deadline = Instant::now() + config.attempt_timeout();

                let failure = loop {
                    let step = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Step::Cancelled,
                        _ = sleep_until(deadline) => Step::TimedOut,
                        item = updates.next() => match item {
                            Some(Ok(update)) => Step::Update(update),
                            Some(Err(e)) => Step::Failed(e),
                            None => Step::Failed(RahyabError::ReportMissing),
                        },
                    };

                    match step {
                        Step::Update(update) => {
                            let finished = matches!(update, AgentUpdate::Briefing(_));
                            yield update;
                            if finished {
                                info!("Attempt {}/{} produced a briefing", attempt + 1, total);
                                return;
                            }
                        }
                        Step::Failed(e) if !e.is_retryable() => {
                            Err(e)?;
                        }
                        Step::Failed(e) => break e,
                        Step::TimedOut => break RahyabError::Timeout(config.attempt_timeout()),
                        Step::Cancelled => {
                            Err(RahyabError::Cancelled)?;
                        }
                    }
                };
                drop(updates);

                warn!("Attempt {}/{} failed: {}", attempt + 1, total, failure);
                last_error = failure.to_string();

                if attempt + 1 < total {
                    yield AgentUpdate::Status(OperationStatus::retrying(attempt + 1, total, &last_error));

                    let cancelled = tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = sleep(config.retry_delay()) => false,
                    };
                    if cancelled {
                        Err(RahyabError::Cancelled)?;
                    }
                }
            }

            Err(RahyabError::RetriesExhausted { attempts: total, last_error })?;
        })
    }
}
