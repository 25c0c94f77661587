//! Service module
//!
//! Cache-aside read/write orchestration for orders.

mod order_service;

pub use order_service::OrderService;
