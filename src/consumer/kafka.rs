//! Kafka Source
//!
//! [`MessageSource`] over an rdkafka `StreamConsumer` subscribed to one
//! topic. Auto-commit and auto offset store are both disabled: offsets
//! move only when the consumer loop stores and commits them.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::Offset;
use std::time::Duration;

use crate::domain::MessagePosition;

use super::{InboundMessage, MessageSource, PollOutcome, SourceError};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub session_timeout: Duration,
}

impl KafkaSettings {
    /// librdkafka client configuration for a manually committing consumer.
    ///
    /// `auto.offset.reset=latest`: a new group starts at the tail of the topic.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("group.id", &self.group_id)
            .set(
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            )
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "latest");
        config
    }
}

/// Kafka-backed message source
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSource {
    /// Create the consumer and subscribe to the configured topic
    pub fn connect(settings: &KafkaSettings) -> Result<Self, SourceError> {
        let consumer: StreamConsumer = settings.client_config().create()?;
        consumer.subscribe(&[settings.topic.as_str()])?;

        tracing::info!(
            brokers = %settings.brokers.join(","),
            topic = %settings.topic,
            group_id = %settings.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: settings.topic.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn poll(&mut self, timeout: Duration) -> PollOutcome {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => PollOutcome::Timeout,
            Ok(Err(e)) => PollOutcome::Error(e.into()),
            Ok(Ok(message)) => match message.payload() {
                None => PollOutcome::Empty,
                Some(payload) => PollOutcome::Message(InboundMessage {
                    position: MessagePosition {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                    },
                    payload: payload.to_vec(),
                }),
            },
        }
    }

    fn store_offset(&mut self, position: &MessagePosition) -> Result<(), SourceError> {
        // The stored offset is the next one to consume
        self.consumer
            .store_offset(&position.topic, position.partition, position.offset + 1)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SourceError> {
        self.consumer.commit_consumer_state(CommitMode::Sync)?;
        Ok(())
    }

    fn rewind(&mut self, position: &MessagePosition) -> Result<(), SourceError> {
        self.consumer.seek(
            &position.topic,
            position.partition,
            Offset::Offset(position.offset),
            SEEK_TIMEOUT,
        )?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Kafka consumer unsubscribed");
        Ok(())
    }
}
