//! Ingest Pipeline
//!
//! Decode → validate → persist for one consumed message. Poison messages
//! and duplicates are resolved here and reported as a [`Disposition`];
//! storage failures reach the caller as errors.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::ProcessingContext;
use crate::repository::{OrderStore, RepositoryError};
use crate::service::OrderService;

use super::{DecodeError, OrderDecoder};

/// Terminal outcome of handling one message. Every variant means the
/// message's offset may be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Order persisted and cached
    Stored { order_uid: String },
    /// Poison message, dropped
    Skipped(DecodeError),
    /// Order already persisted by an earlier delivery
    Duplicate { order_uid: String },
}

/// Something that can process a raw message body
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one payload. `Err` means the message was not processed; it
    /// may succeed on a later attempt when [`RepositoryError::is_retryable`].
    async fn handle(
        &self,
        payload: &[u8],
        ctx: &ProcessingContext,
    ) -> Result<Disposition, RepositoryError>;
}

#[async_trait]
impl<T: MessageHandler + ?Sized> MessageHandler for Arc<T> {
    async fn handle(
        &self,
        payload: &[u8],
        ctx: &ProcessingContext,
    ) -> Result<Disposition, RepositoryError> {
        (**self).handle(payload, ctx).await
    }
}

/// Message handler that feeds decoded orders into the [`OrderService`]
pub struct IngestPipeline<S> {
    decoder: OrderDecoder,
    service: Arc<OrderService<S>>,
}

impl<S: OrderStore> IngestPipeline<S> {
    pub fn new(decoder: OrderDecoder, service: Arc<OrderService<S>>) -> Self {
        Self { decoder, service }
    }
}

#[async_trait]
impl<S: OrderStore> MessageHandler for IngestPipeline<S> {
    async fn handle(
        &self,
        payload: &[u8],
        ctx: &ProcessingContext,
    ) -> Result<Disposition, RepositoryError> {
        let order = match self.decoder.decode(payload) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(
                    kind = %e.kind,
                    reason = %e.reason,
                    offset = ?ctx.offset(),
                    raw_payload = %String::from_utf8_lossy(payload),
                    "Skipping invalid message"
                );
                return Ok(Disposition::Skipped(e));
            }
        };

        let order_uid = order.order_uid.clone();
        tracing::info!(
            order_uid = %order_uid,
            offset = ?ctx.offset(),
            correlation_id = %ctx.correlation_id,
            "Processing order from Kafka"
        );

        match self.service.process_order(order, ctx).await {
            Ok(()) => Ok(Disposition::Stored { order_uid }),
            Err(RepositoryError::AlreadyExists { order_uid }) => {
                tracing::warn!(
                    order_uid = %order_uid,
                    offset = ?ctx.offset(),
                    "Order already stored, acknowledging duplicate message"
                );
                Ok(Disposition::Duplicate { order_uid })
            }
            Err(e) => Err(e),
        }
    }
}
