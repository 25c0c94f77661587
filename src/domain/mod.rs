//! Domain module
//!
//! The order aggregate, its validation rules and the per-operation context.

pub mod context;
pub mod order;
pub mod validation;

pub use context::{MessagePosition, ProcessingContext};
pub use order::{Delivery, Item, Order, Payment};
pub use validation::{FieldViolation, OrderValidator, ValidationError, SUPPORTED_LOCALES};
