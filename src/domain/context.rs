//! Processing Context
//!
//! Metadata carried through one unit of work: a consumed message on the
//! ingest path or a lookup on the read path. Store calls made under a
//! context are bounded by its deadline.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Broker position of the message being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Context for an operation, used for tracing and deadlines.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// Correlation ID for log tracing
    pub correlation_id: Uuid,

    /// Source message position, set on the ingest path
    pub position: Option<MessagePosition>,

    /// Point in time after which store calls are abandoned
    pub deadline: Option<Instant>,
}

impl ProcessingContext {
    /// Create a new context with a fresh correlation ID and no deadline
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            position: None,
            deadline: None,
        }
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Create context for a consumed message
    pub fn with_position(mut self, position: MessagePosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Bound the context to `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Time left before the deadline, `None` if unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Offset of the source message, if any
    pub fn offset(&self) -> Option<i64> {
        self.position.as_ref().map(|p| p.offset)
    }
}

impl Default for ProcessingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let correlation_id = Uuid::new_v4();
        let position = MessagePosition {
            topic: "orders".to_string(),
            partition: 0,
            offset: 42,
        };

        let context = ProcessingContext::new()
            .with_correlation_id(correlation_id)
            .with_position(position.clone());

        assert_eq!(context.correlation_id, correlation_id);
        assert_eq!(context.position, Some(position));
        assert_eq!(context.offset(), Some(42));
        assert!(context.deadline.is_none());
        assert!(context.remaining().is_none());
    }

    #[test]
    fn test_with_timeout_sets_deadline() {
        let context = ProcessingContext::new().with_timeout(Duration::from_secs(5));

        let remaining = context.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }

    #[test]
    fn test_fresh_contexts_get_distinct_ids() {
        let a = ProcessingContext::new();
        let b = ProcessingContext::new();
        assert_ne!(a.correlation_id, b.correlation_id);
    }
}
