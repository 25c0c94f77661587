//! Order Consumer
//!
//! Sequential poll → handle → acknowledge loop. An offset is stored and
//! committed only once its message reached a terminal [`Disposition`] or
//! the store refused it for good. Other storage failures are retried in
//! place and then rewound, never committed.

use std::time::Duration;
use tokio::sync::watch;

use crate::domain::{MessagePosition, ProcessingContext};
use crate::ingest::{Disposition, MessageHandler};

use super::{InboundMessage, MessageSource, PollOutcome, RetryPolicy};

/// Loop tuning
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Bounded wait for one poll
    pub poll_timeout: Duration,
    /// Pause after a poll that returned nothing
    pub idle_backoff: Duration,
    /// Deadline for persisting one message
    pub store_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(5000),
            idle_backoff: Duration::from_millis(200),
            store_timeout: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub stored: u64,
    pub skipped: u64,
    pub duplicates: u64,
    /// Messages the store refused for good, acknowledged without storing
    pub rejected: u64,
    pub empty: u64,
    pub retries: u64,
    pub rewinds: u64,
    pub poll_errors: u64,
    pub commit_errors: u64,
}

impl ConsumerStats {
    /// Messages whose offsets were acknowledged
    pub fn acknowledged(&self) -> u64 {
        self.stored + self.skipped + self.duplicates + self.rejected
    }
}

pub struct OrderConsumer<M, H> {
    source: M,
    handler: H,
    settings: ConsumerSettings,
    stats: ConsumerStats,
}

impl<M: MessageSource, H: MessageHandler> OrderConsumer<M, H> {
    pub fn new(source: M, handler: H, settings: ConsumerSettings) -> Self {
        Self {
            source,
            handler,
            settings,
            stats: ConsumerStats::default(),
        }
    }

    /// Run until `stop` turns `true` or its sender is dropped
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> ConsumerStats {
        tracing::info!(
            poll_timeout_ms = self.settings.poll_timeout.as_millis() as u64,
            retry_attempts = self.settings.retry.max_attempts,
            "Order consumer started"
        );

        loop {
            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                outcome = self.source.poll(self.settings.poll_timeout) => outcome,
            };

            match outcome {
                PollOutcome::Message(message) => self.dispatch(message, &mut stop).await,
                PollOutcome::Timeout => {
                    if pause(self.settings.idle_backoff, &mut stop).await {
                        break;
                    }
                }
                PollOutcome::Empty => {
                    self.stats.empty += 1;
                    tracing::debug!("Skipping message without payload");
                }
                PollOutcome::Error(e) => {
                    self.stats.poll_errors += 1;
                    tracing::error!(error = %e, "Kafka poll failed");
                    if pause(self.settings.idle_backoff, &mut stop).await {
                        break;
                    }
                }
            }
        }

        self.shutdown();
        self.stats
    }

    /// Handle one message to a terminal outcome, or rewind to it
    async fn dispatch(&mut self, message: InboundMessage, stop: &mut watch::Receiver<bool>) {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let ctx = ProcessingContext::new()
                .with_position(message.position.clone())
                .with_timeout(self.settings.store_timeout);

            match self.handler.handle(&message.payload, &ctx).await {
                Ok(disposition) => {
                    self.record(&disposition);
                    self.acknowledge(&message.position);
                    return;
                }
                Err(e) if !e.is_retryable() => {
                    self.stats.rejected += 1;
                    tracing::error!(
                        error = %e,
                        offset = message.position.offset,
                        partition = message.position.partition,
                        "Order can never be stored, dropping message"
                    );
                    self.acknowledge(&message.position);
                    return;
                }
                Err(e) if self.settings.retry.allows_retry(attempt) => {
                    let delay = self.settings.retry.delay_for(attempt);
                    self.stats.retries += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        offset = message.position.offset,
                        partition = message.position.partition,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to store order, retrying"
                    );

                    if pause(delay, stop).await {
                        tracing::warn!(
                            offset = message.position.offset,
                            "Stop requested during retry, leaving message uncommitted"
                        );
                        return;
                    }
                }
                Err(e) => {
                    self.stats.rewinds += 1;
                    tracing::error!(
                        error = %e,
                        attempt = attempt,
                        offset = message.position.offset,
                        partition = message.position.partition,
                        "Failed to store order, rewinding for redelivery"
                    );

                    if let Err(e) = self.source.rewind(&message.position) {
                        tracing::error!(
                            error = %e,
                            offset = message.position.offset,
                            "Failed to rewind consumer"
                        );
                    }
                    return;
                }
            }
        }
    }

    fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Stored { .. } => self.stats.stored += 1,
            Disposition::Skipped(_) => self.stats.skipped += 1,
            Disposition::Duplicate { .. } => self.stats.duplicates += 1,
        }
    }

    fn acknowledge(&mut self, position: &MessagePosition) {
        if let Err(e) = self.source.store_offset(position) {
            self.stats.commit_errors += 1;
            tracing::error!(error = %e, offset = position.offset, "Failed to store offset");
            return;
        }

        match self.source.commit() {
            Ok(()) => tracing::debug!(
                offset = position.offset,
                partition = position.partition,
                "Offset committed"
            ),
            Err(e) => {
                self.stats.commit_errors += 1;
                tracing::error!(error = %e, offset = position.offset, "Failed to commit offset");
            }
        }
    }

    fn shutdown(&mut self) {
        tracing::info!("Stopping order consumer");

        if let Err(e) = self.source.commit() {
            tracing::warn!(error = %e, "Final offset commit failed");
        }
        if let Err(e) = self.source.close() {
            tracing::error!(error = %e, "Failed to close consumer");
        }

        tracing::info!(
            stored = self.stats.stored,
            skipped = self.stats.skipped,
            duplicates = self.stats.duplicates,
            rejected = self.stats.rejected,
            rewinds = self.stats.rewinds,
            poll_errors = self.stats.poll_errors,
            "Order consumer stopped"
        );
    }
}

/// Resolves once a stop was requested
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay`; returns `true` if interrupted by a stop request
async fn pause(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = stopped(stop) => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
