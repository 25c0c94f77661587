//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::consumer::{ConsumerSettings, KafkaSettings, RetryPolicy};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Kafka bootstrap servers
    pub kafka_brokers: Vec<String>,

    pub kafka_topic: String,

    pub kafka_group_id: String,

    /// Bounded wait for one poll
    pub kafka_poll_timeout: Duration,

    pub kafka_session_timeout: Duration,

    /// Storage attempts per message before rewinding
    pub ingest_retry_attempts: u32,

    /// Deadline for persisting one message
    pub store_timeout: Duration,

    /// Deadline for one HTTP lookup
    pub request_timeout: Duration,

    /// Deadline for the startup cache load
    pub warmup_timeout: Duration,

    /// Bound on draining in-flight HTTP requests at shutdown
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = parse_or(&lookup, "PORT", 8081)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let kafka_brokers: Vec<String> = lookup("KAFKA_BROKERS")
            .unwrap_or_else(|| "localhost:9092".to_string())
            .split(',')
            .map(str::trim)
            .filter(|broker| !broker.is_empty())
            .map(str::to_string)
            .collect();
        if kafka_brokers.is_empty() {
            return Err(ConfigError::InvalidValue("KAFKA_BROKERS"));
        }

        let kafka_topic = lookup("KAFKA_TOPIC").unwrap_or_else(|| "orders".to_string());

        let kafka_group_id =
            lookup("KAFKA_GROUP_ID").unwrap_or_else(|| "order-service".to_string());

        let kafka_poll_timeout =
            Duration::from_millis(parse_or(&lookup, "KAFKA_POLL_TIMEOUT_MS", 5000)?);

        let kafka_session_timeout =
            Duration::from_millis(parse_or(&lookup, "KAFKA_SESSION_TIMEOUT_MS", 10000)?);

        let ingest_retry_attempts: u32 = parse_or(&lookup, "INGEST_RETRY_ATTEMPTS", 3)?;
        if ingest_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue("INGEST_RETRY_ATTEMPTS"));
        }

        let store_timeout = Duration::from_millis(parse_or(&lookup, "STORE_TIMEOUT_MS", 5000)?);

        let request_timeout =
            Duration::from_millis(parse_or(&lookup, "REQUEST_TIMEOUT_MS", 3000)?);

        let warmup_timeout = Duration::from_secs(parse_or(&lookup, "WARMUP_TIMEOUT_SECS", 60)?);

        let shutdown_timeout =
            Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 5)?);

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            kafka_brokers,
            kafka_topic,
            kafka_group_id,
            kafka_poll_timeout,
            kafka_session_timeout,
            ingest_retry_attempts,
            store_timeout,
            request_timeout,
            warmup_timeout,
            shutdown_timeout,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// HTTP bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn kafka_settings(&self) -> KafkaSettings {
        KafkaSettings {
            brokers: self.kafka_brokers.clone(),
            topic: self.kafka_topic.clone(),
            group_id: self.kafka_group_id.clone(),
            session_timeout: self.kafka_session_timeout,
        }
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            poll_timeout: self.kafka_poll_timeout,
            store_timeout: self.store_timeout,
            retry: RetryPolicy::default().with_max_attempts(self.ingest_retry_attempts),
            ..ConsumerSettings::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
