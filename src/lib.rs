//! order_service Library
//!
//! Re-exports modules for integration testing and the service binary.

pub mod api;
pub mod consumer;
pub mod domain;
pub mod ingest;
pub mod repository;
pub mod service;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::AppError;
pub use domain::{Order, OrderValidator, ProcessingContext};
