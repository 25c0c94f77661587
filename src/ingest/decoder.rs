//! Order Decoder
//!
//! Turns raw message bytes into a validated [`Order`], or a [`DecodeError`]
//! tagged with the failure class.

use chrono::SubsecRound;
use std::fmt;
use std::sync::Arc;

use crate::domain::{Order, OrderValidator};

/// Failure class of an undecodable message. Both classes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Bytes are not a well-formed order document
    MalformedPayload,
    /// Well-formed document that breaks a field rule
    ValidationFailure,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorKind::MalformedPayload => write!(f, "malformed payload"),
            DecodeErrorKind::ValidationFailure => write!(f, "validation failure"),
        }
    }
}

/// A message that can never be processed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {reason}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub reason: String,
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::MalformedPayload,
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::ValidationFailure,
            reason: reason.into(),
        }
    }
}

/// Decoder for inbound order messages
#[derive(Debug, Clone)]
pub struct OrderDecoder {
    validator: Arc<OrderValidator>,
}

impl OrderDecoder {
    pub fn new(validator: Arc<OrderValidator>) -> Self {
        Self { validator }
    }

    /// Parse and validate one message body
    pub fn decode(&self, payload: &[u8]) -> Result<Order, DecodeError> {
        let starts_with_object = payload
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{');
        if !starts_with_object {
            return Err(DecodeError::malformed("expected a JSON object"));
        }

        let mut order: Order = serde_json::from_slice(payload)
            .map_err(|e| DecodeError::malformed(e.to_string()))?;

        // TIMESTAMPTZ keeps microseconds; cache what the database will hold
        order.date_created = order.date_created.round_subsecs(6);

        self.validator
            .validate(&order)
            .map_err(|e| DecodeError::invalid(e.to_string()))?;

        Ok(order)
    }
}
