//! Common test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use order_service::consumer::{
    ConsumerSettings, InboundMessage, MessageSource, PollOutcome, RetryPolicy, SourceError,
};
use order_service::domain::{MessagePosition, Order, ProcessingContext};
use order_service::ingest::{IngestPipeline, OrderDecoder};
use order_service::repository::{OrderStore, RepositoryError};
use order_service::service::OrderService;
use order_service::OrderValidator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tokio::sync::watch;

pub const FIXTURE_ORDER_UID: &str = "b563feb7b2b84b6test10";

/// The reference order message
pub fn fixture_message(order_uid: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "order_uid": order_uid,
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }))
    .unwrap()
}

/// The reference order, decoded
pub fn fixture_order(order_uid: &str) -> Order {
    serde_json::from_slice(&fixture_message(order_uid)).unwrap()
}

pub fn decoder() -> OrderDecoder {
    OrderDecoder::new(Arc::new(OrderValidator::new()))
}

// =========================================================================
// In-memory OrderStore
// =========================================================================

/// Map-backed store with call counters and injectable failures
#[derive(Default)]
pub struct MemoryStore {
    orders: Mutex<HashMap<String, Order>>,
    pub save_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub get_all_calls: AtomicUsize,
    /// Number of upcoming saves that fail with a storage error
    pub failing_saves: AtomicUsize,
    /// Every read fails with a storage error while set
    pub fail_reads: AtomicBool,
    /// Every save is refused as unstorable while set
    pub reject_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: Vec<Order>) -> Self {
        let store = Self::default();
        {
            let mut map = store.orders.lock().unwrap();
            for order in orders {
                map.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn set_reject_saves(&self, reject: bool) {
        self.reject_saves.store(reject, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn saves(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn storage_error() -> RepositoryError {
        RepositoryError::Storage(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn save(&self, order: &Order, _ctx: &ProcessingContext) -> Result<(), RepositoryError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Rejected {
                order_uid: order.order_uid.clone(),
                reason: "22021: invalid byte sequence for encoding \"UTF8\": 0x00".to_string(),
            });
        }

        let failing = self.failing_saves.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_saves.store(failing - 1, Ordering::SeqCst);
            return Err(Self::storage_error());
        }

        let mut orders = self.orders.lock().unwrap();
        if orders.contains_key(&order.order_uid) {
            return Err(RepositoryError::AlreadyExists {
                order_uid: order.order_uid.clone(),
            });
        }
        orders.insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_by_key(
        &self,
        order_uid: &str,
        _ctx: &ProcessingContext,
    ) -> Result<Option<Order>, RepositoryError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::storage_error());
        }
        Ok(self.orders.lock().unwrap().get(order_uid).cloned())
    }

    async fn get_all(&self, _ctx: &ProcessingContext) -> Result<Vec<Order>, RepositoryError> {
        self.get_all_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::storage_error());
        }
        Ok(self.orders.lock().unwrap().values().cloned().collect())
    }
}

/// Service and pipeline wired over a shared in-memory store
pub fn memory_pipeline(
    store: Arc<MemoryStore>,
) -> (Arc<OrderService<Arc<MemoryStore>>>, IngestPipeline<Arc<MemoryStore>>) {
    let service = Arc::new(OrderService::cold(store));
    let pipeline = IngestPipeline::new(decoder(), Arc::clone(&service));
    (service, pipeline)
}

// =========================================================================
// Scripted MessageSource
// =========================================================================

/// Broker interaction recorded by [`ScriptedSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    StoreOffset(i64),
    Commit(Option<i64>),
    Rewind(i64),
    Close,
}

/// Source that replays a fixed list of poll outcomes.
///
/// A rewound message is delivered again on the next poll. Once the script
/// is exhausted the stop signal is raised.
pub struct ScriptedSource {
    script: VecDeque<PollOutcome>,
    stop: watch::Sender<bool>,
    pending: Option<i64>,
    last: Option<InboundMessage>,
    events: Arc<Mutex<Vec<SourceEvent>>>,
}

impl ScriptedSource {
    pub fn new(
        script: Vec<PollOutcome>,
        stop: watch::Sender<bool>,
    ) -> (Self, Arc<Mutex<Vec<SourceEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let source = Self {
            script: script.into(),
            stop,
            pending: None,
            last: None,
            events: Arc::clone(&events),
        };
        (source, events)
    }

    fn record(&self, event: SourceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn poll(&mut self, _timeout: Duration) -> PollOutcome {
        match self.script.pop_front() {
            Some(PollOutcome::Message(message)) => {
                self.last = Some(message.clone());
                PollOutcome::Message(message)
            }
            Some(outcome) => outcome,
            None => {
                self.stop.send(true).ok();
                PollOutcome::Timeout
            }
        }
    }

    fn store_offset(&mut self, position: &MessagePosition) -> Result<(), SourceError> {
        self.pending = Some(position.offset + 1);
        self.record(SourceEvent::StoreOffset(position.offset));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SourceError> {
        self.record(SourceEvent::Commit(self.pending));
        Ok(())
    }

    fn rewind(&mut self, position: &MessagePosition) -> Result<(), SourceError> {
        self.record(SourceEvent::Rewind(position.offset));
        if let Some(message) = self.last.take() {
            if message.position.offset == position.offset {
                self.script.push_front(PollOutcome::Message(message));
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.record(SourceEvent::Close);
        Ok(())
    }
}

/// A message on partition 0 of `orders`
pub fn message(offset: i64, payload: Vec<u8>) -> PollOutcome {
    PollOutcome::Message(InboundMessage {
        position: MessagePosition {
            topic: "orders".to_string(),
            partition: 0,
            offset,
        },
        payload,
    })
}

/// Consumer settings with millisecond delays
pub fn fast_settings(retry_attempts: u32) -> ConsumerSettings {
    ConsumerSettings {
        poll_timeout: Duration::from_millis(10),
        idle_backoff: Duration::from_millis(1),
        store_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            max_attempts: retry_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        },
    }
}

// =========================================================================
// PostgreSQL
// =========================================================================

/// Setup test database - connect and make sure the schema exists.
///
/// `None` when `DATABASE_URL` is unset, so database tests pass trivially
/// on machines without PostgreSQL.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    // Tests run concurrently; serialize the DDL
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    sqlx::query("SELECT pg_advisory_lock(7301)")
        .execute(&mut *conn)
        .await
        .expect("Failed to take schema lock");
    (&mut *conn)
        .execute(include_str!("../../migrations/0001_create_orders.sql"))
        .await
        .expect("Failed to apply schema");
    sqlx::query("SELECT pg_advisory_unlock(7301)")
        .execute(&mut *conn)
        .await
        .expect("Failed to release schema lock");
    drop(conn);

    Some(pool)
}

/// Delete an order and its owned rows
pub async fn remove_order(pool: &PgPool, order_uid: &str) {
    sqlx::query("DELETE FROM orders WHERE order_uid = $1")
        .bind(order_uid)
        .execute(pool)
        .await
        .expect("Failed to clean up order");
}

/// Row count per table for one order: orders, deliveries, payments, items
pub async fn row_counts(pool: &PgPool, order_uid: &str) -> [i64; 4] {
    let mut counts = [0; 4];
    for (idx, table) in ["orders", "deliveries", "payments", "items"].iter().enumerate() {
        counts[idx] = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE order_uid = $1",
            table
        ))
        .bind(order_uid)
        .fetch_one(pool)
        .await
        .expect("Failed to count rows");
    }
    counts
}
