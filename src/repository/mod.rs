//! Repository module
//!
//! Durable storage of the order aggregate. [`OrderStore`] is the seam the
//! cache-aside service depends on; [`PgOrderRepository`] implements it on
//! PostgreSQL.

mod error;
mod order_repository;

pub use error::RepositoryError;
pub use order_repository::PgOrderRepository;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::domain::{Order, ProcessingContext};

/// Transactional persistence and reconstruction of orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order and every owned row in one transaction.
    ///
    /// Returns [`RepositoryError::AlreadyExists`] if `order_uid` is taken.
    async fn save(&self, order: &Order, ctx: &ProcessingContext) -> Result<(), RepositoryError>;

    /// Load a full aggregate. `Ok(None)` when no order row exists.
    async fn get_by_key(
        &self,
        order_uid: &str,
        ctx: &ProcessingContext,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Load every stored aggregate
    async fn get_all(&self, ctx: &ProcessingContext) -> Result<Vec<Order>, RepositoryError>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn save(&self, order: &Order, ctx: &ProcessingContext) -> Result<(), RepositoryError> {
        (**self).save(order, ctx).await
    }

    async fn get_by_key(
        &self,
        order_uid: &str,
        ctx: &ProcessingContext,
    ) -> Result<Option<Order>, RepositoryError> {
        (**self).get_by_key(order_uid, ctx).await
    }

    async fn get_all(&self, ctx: &ProcessingContext) -> Result<Vec<Order>, RepositoryError> {
        (**self).get_all(ctx).await
    }
}

/// Run a store future under the context deadline.
///
/// Dropping the future on timeout drops any open transaction with it,
/// which rolls it back.
pub(crate) async fn within_deadline<T, F>(
    ctx: &ProcessingContext,
    fut: F,
) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match ctx.remaining() {
        None => fut.await,
        Some(budget) => tokio::time::timeout(budget, fut)
            .await
            .map_err(|_| RepositoryError::Timeout(budget))?,
    }
}
