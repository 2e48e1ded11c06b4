//! Wire protocols shared by the wearable- and app-facing connections.
//!
//! Both codecs are stateful, append-only buffer decoders: bytes read from a
//! socket are pushed in, at most one complete message is decoded per call, and
//! a partial trailing frame stays buffered for the next read. Neither codec
//! ever blocks.

pub mod app;
pub mod data;
pub mod wearable;

pub use app::AppCodec;
pub use wearable::WearableCodec;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("refusing to encode an empty payload")]
    EmptyPayload,
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
