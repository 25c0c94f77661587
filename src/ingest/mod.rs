//! Ingest module
//!
//! Decoding, classification and persistence of inbound order messages.

mod decoder;
mod pipeline;

pub use decoder::{DecodeError, DecodeErrorKind, OrderDecoder};
pub use pipeline::{Disposition, IngestPipeline, MessageHandler};
