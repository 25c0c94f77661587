//! Consumer module
//!
//! Broker-facing side of the service: the [`MessageSource`] seam, its
//! Kafka implementation and the consumer loop driving the ingest pipeline.

mod kafka;
mod order_consumer;
mod retry;
mod source;

pub use kafka::{KafkaSettings, KafkaSource};
pub use order_consumer::{ConsumerSettings, ConsumerStats, OrderConsumer};
pub use retry::RetryPolicy;
pub use source::{InboundMessage, MessageSource, PollOutcome, SourceError};
