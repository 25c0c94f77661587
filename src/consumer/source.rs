//! Message Source
//!
//! Broker abstraction used by the consumer loop: poll with a bounded
//! wait, store and commit offsets manually, rewind, close.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::MessagePosition;

/// An owned copy of a consumed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub position: MessagePosition,
    pub payload: Vec<u8>,
}

/// Result of a single poll
#[derive(Debug)]
pub enum PollOutcome {
    /// A message with a body
    Message(InboundMessage),
    /// Nothing arrived within the wait
    Timeout,
    /// A record without a body
    Empty,
    /// Transport-level failure
    Error(SourceError),
}

/// Broker-side failure
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Broker error: {0}")]
    Other(String),
}

/// Broker connection driven by the consumer loop
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next message
    async fn poll(&mut self, timeout: Duration) -> PollOutcome;

    /// Mark a message as processed; committed by the next [`commit`](Self::commit)
    fn store_offset(&mut self, position: &MessagePosition) -> Result<(), SourceError>;

    /// Commit all stored offsets
    fn commit(&mut self) -> Result<(), SourceError>;

    /// Re-position so the next poll re-delivers this message
    fn rewind(&mut self, position: &MessagePosition) -> Result<(), SourceError>;

    /// Leave the group and release the connection
    fn close(&mut self) -> Result<(), SourceError>;
}
