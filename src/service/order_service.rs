//! Order Service
//!
//! Cache-aside orchestration over an [`OrderStore`]. Writes go to the store
//! first and reach the cache only after commit; reads try the cache, then
//! fall back to the store and fill the cache on a hit.
//!
//! The mirror is an unbounded map with no eviction or TTL: it grows with
//! the durable dataset.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{Order, ProcessingContext};
use crate::repository::{OrderStore, RepositoryError};

/// Cache-aside service for orders
pub struct OrderService<S> {
    store: S,
    cache: RwLock<HashMap<String, Order>>,
}

impl<S: OrderStore> OrderService<S> {
    /// Create a service and warm its cache from the store.
    ///
    /// A failed warm-up is logged and leaves the cache empty; lookups then
    /// fall back to the store.
    pub async fn new(store: S, ctx: &ProcessingContext) -> Self {
        let service = Self::cold(store);
        if let Err(e) = service.warm(ctx).await {
            tracing::warn!(
                error = %e,
                correlation_id = %ctx.correlation_id,
                "Cache warm-up failed, starting with an empty cache"
            );
        }
        service
    }

    /// Create a service with an empty cache
    pub fn cold(store: S) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the cache with every order in the store.
    ///
    /// Returns the number of cached orders.
    pub async fn warm(&self, ctx: &ProcessingContext) -> Result<usize, RepositoryError> {
        let orders = self.store.get_all(ctx).await?;

        let snapshot: HashMap<String, Order> = orders
            .into_iter()
            .map(|order| (order.order_uid.clone(), order))
            .collect();
        let count = snapshot.len();

        *self.cache.write().await = snapshot;

        tracing::info!(orders = count, "Order cache warmed");
        Ok(count)
    }

    /// Persist a new order, then publish it to the cache.
    ///
    /// The store error is returned unchanged and the cache is left as is.
    pub async fn process_order(
        &self,
        order: Order,
        ctx: &ProcessingContext,
    ) -> Result<(), RepositoryError> {
        self.store.save(&order, ctx).await?;

        let order_uid = order.order_uid.clone();
        self.cache.write().await.insert(order_uid.clone(), order);

        tracing::info!(
            order_uid = %order_uid,
            correlation_id = %ctx.correlation_id,
            "Order stored and cached"
        );

        Ok(())
    }

    /// Look up an order by uid.
    ///
    /// `Ok(None)` means no such order exists. Store errors propagate and
    /// never touch the cache.
    pub async fn get_order(
        &self,
        order_uid: &str,
        ctx: &ProcessingContext,
    ) -> Result<Option<Order>, RepositoryError> {
        if let Some(order) = self.cache.read().await.get(order_uid) {
            tracing::debug!(order_uid = %order_uid, "Order served from cache");
            return Ok(Some(order.clone()));
        }

        let order = self.store.get_by_key(order_uid, ctx).await?;
        tracing::debug!(
            order_uid = %order_uid,
            found = order.is_some(),
            correlation_id = %ctx.correlation_id,
            "Order looked up in store"
        );

        if let Some(order) = &order {
            self.cache
                .write()
                .await
                .insert(order.order_uid.clone(), order.clone());
        }

        Ok(order)
    }

    /// Number of cached orders
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Check whether an order is cached, without touching the store
    pub async fn is_cached(&self, order_uid: &str) -> bool {
        self.cache.read().await.contains_key(order_uid)
    }
}
