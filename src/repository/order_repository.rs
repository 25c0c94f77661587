//! Order Repository
//!
//! PostgreSQL implementation of [`OrderStore`]. An aggregate spans four
//! tables (`orders`, `deliveries`, `payments`, `items`) and is written in
//! a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Delivery, Item, Order, Payment, ProcessingContext};

use super::{within_deadline, OrderStore, RepositoryError};

type OrderRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i32,
    DateTime<Utc>,
    String,
);

type DeliveryRow = (String, String, String, String, String, String, String);

type PaymentRow = (
    String,
    String,
    String,
    String,
    i64,
    i64,
    String,
    i64,
    i64,
    i64,
);

type ItemRow = (
    i64,
    String,
    i64,
    String,
    String,
    i32,
    String,
    i64,
    i64,
    String,
    i32,
);

const SELECT_ORDER_COLUMNS: &str = r#"
    SELECT order_uid, track_number, entry, locale, internal_signature,
           customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
    FROM orders
"#;

/// Order repository backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new repository with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Write path
    // =========================================================================

    async fn insert_aggregate(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Any early return drops `tx`, which rolls back every insert
        self.insert_order(&mut tx, order).await?;
        self.insert_delivery(&mut tx, &order.order_uid, &order.delivery)
            .await?;
        self.insert_payment(&mut tx, &order.order_uid, &order.payment)
            .await?;
        for item in &order.items {
            self.insert_item(&mut tx, &order.order_uid, item).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order aggregate committed"
        );

        Ok(())
    }

    async fn insert_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::AlreadyExists {
                    order_uid: order.order_uid.clone(),
                }
            }
            other => classify(&order.order_uid, other),
        })?;

        Ok(())
    }

    async fn insert_delivery(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_uid: &str,
        delivery: &Delivery,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order_uid)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify(order_uid, e))?;

        Ok(())
    }

    async fn insert_payment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_uid: &str,
        payment: &Payment,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                order_uid, transaction, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order_uid)
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify(order_uid, e))?;

        Ok(())
    }

    async fn insert_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_uid: &str,
        item: &Item,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO items (
                order_uid, chrt_id, track_number, price, rid, name,
                sale, size, total_price, nm_id, brand, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order_uid)
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify(order_uid, e))?;

        Ok(())
    }

    // =========================================================================
    // Read path
    // =========================================================================

    async fn fetch_order(&self, order_uid: &str) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("{SELECT_ORDER_COLUMNS} WHERE order_uid = $1"))
                .bind(order_uid)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.assemble(row).await?)),
            None => Ok(None),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> =
            sqlx::query_as(&format!("{SELECT_ORDER_COLUMNS} ORDER BY date_created, order_uid"))
                .fetch_all(&self.pool)
                .await?;

        // One reconstruction per row; only used for warm start
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.assemble(row).await?);
        }

        Ok(orders)
    }

    /// Load the owned rows for an order row and build the aggregate
    async fn assemble(&self, row: OrderRow) -> Result<Order, RepositoryError> {
        let (
            order_uid,
            track_number,
            entry,
            locale,
            internal_signature,
            customer_id,
            delivery_service,
            shardkey,
            sm_id,
            date_created,
            oof_shard,
        ) = row;

        let delivery = self.fetch_delivery(&order_uid).await?;
        let payment = self.fetch_payment(&order_uid).await?;
        let items = self.fetch_items(&order_uid).await?;

        Ok(Order {
            order_uid,
            track_number,
            entry,
            delivery,
            payment,
            items,
            locale,
            internal_signature,
            customer_id,
            delivery_service,
            shardkey,
            sm_id,
            date_created,
            oof_shard,
        })
    }

    async fn fetch_delivery(&self, order_uid: &str) -> Result<Delivery, RepositoryError> {
        let row: Option<DeliveryRow> = sqlx::query_as(
            r#"
            SELECT name, phone, zip, city, address, region, email
            FROM deliveries
            WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?;

        let (name, phone, zip, city, address, region, email) =
            row.ok_or_else(|| missing(order_uid, "delivery row not found"))?;

        Ok(Delivery {
            name,
            phone,
            zip,
            city,
            address,
            region,
            email,
        })
    }

    async fn fetch_payment(&self, order_uid: &str) -> Result<Payment, RepositoryError> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            SELECT transaction, request_id, currency, provider, amount,
                   payment_dt, bank, delivery_cost, goods_total, custom_fee
            FROM payments
            WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?;

        let (
            transaction,
            request_id,
            currency,
            provider,
            amount,
            payment_dt,
            bank,
            delivery_cost,
            goods_total,
            custom_fee,
        ) = row.ok_or_else(|| missing(order_uid, "payment row not found"))?;

        Ok(Payment {
            transaction,
            request_id,
            currency,
            provider,
            amount,
            payment_dt,
            bank,
            delivery_cost,
            goods_total,
            custom_fee,
        })
    }

    async fn fetch_items(&self, order_uid: &str) -> Result<Vec<Item>, RepositoryError> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale,
                   size, total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(missing(order_uid, "order has no item rows"));
        }

        Ok(rows
            .into_iter()
            .map(
                |(chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status)| {
                    Item {
                        chrt_id,
                        track_number,
                        price,
                        rid,
                        name,
                        sale,
                        size,
                        total_price,
                        nm_id,
                        brand,
                        status,
                    }
                },
            )
            .collect())
    }
}

/// SQLSTATE classes for values the database will never accept:
/// 22 (data exception) and 23 (integrity constraint violation)
fn is_data_rejection(sqlstate: &str) -> bool {
    sqlstate.starts_with("22") || sqlstate.starts_with("23")
}

/// Map a write error to [`RepositoryError::Rejected`] when the row itself is
/// at fault, otherwise to [`RepositoryError::Storage`]
fn classify(order_uid: &str, err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db) = err {
        if let Some(code) = db.code().filter(|code| is_data_rejection(code)) {
            return RepositoryError::Rejected {
                order_uid: order_uid.to_string(),
                reason: format!("{}: {}", code, db.message()),
            };
        }
    }
    RepositoryError::Storage(err)
}

fn missing(order_uid: &str, reason: &str) -> RepositoryError {
    RepositoryError::Inconsistent {
        order_uid: order_uid.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl OrderStore for PgOrderRepository {
    async fn save(&self, order: &Order, ctx: &ProcessingContext) -> Result<(), RepositoryError> {
        within_deadline(ctx, self.insert_aggregate(order)).await
    }

    async fn get_by_key(
        &self,
        order_uid: &str,
        ctx: &ProcessingContext,
    ) -> Result<Option<Order>, RepositoryError> {
        within_deadline(ctx, self.fetch_order(order_uid)).await
    }

    async fn get_all(&self, ctx: &ProcessingContext) -> Result<Vec<Order>, RepositoryError> {
        within_deadline(ctx, self.fetch_all()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_builds_inconsistent_error() {
        let err = missing("uid-1", "payment row not found");
        assert!(matches!(err, RepositoryError::Inconsistent { .. }));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("uid-1"));
    }

    #[test]
    fn test_data_and_constraint_classes_are_rejections() {
        // invalid byte sequence, timestamp out of range, check violation
        for code in ["22021", "22008", "23514", "23503"] {
            assert!(is_data_rejection(code), "{code}");
        }
        // connection failure, serialization failure, admin shutdown
        for code in ["08006", "40001", "57P01"] {
            assert!(!is_data_rejection(code), "{code}");
        }
    }

    #[test]
    fn test_non_database_errors_stay_retryable() {
        let err = classify("uid-1", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, RepositoryError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_select_columns_match_order_row_arity() {
        let columns = SELECT_ORDER_COLUMNS
            .split("FROM")
            .next()
            .unwrap()
            .trim()
            .trim_start_matches("SELECT")
            .split(',')
            .count();
        assert_eq!(columns, 11);
    }
}
