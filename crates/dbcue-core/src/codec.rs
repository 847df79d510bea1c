// crates/dbcue-core/src/codec.rs
// ============================================================================
// Module: Payload Codec Seam
// Description: Caller-supplied serialization for queue payloads.
// Purpose: Keep the wire format out of the coordination layer.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Queue rows store payloads as opaque bytes; the codec that produces those
//! bytes is supplied by the caller at construction time. [`JsonCodec`] is the
//! batteries-included implementation for serde types.
//!
//! Invariants:
//! - Codec failures surface as [`CoordError::Codec`] and never claim or
//!   mutate rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CoordError;

// ============================================================================
// SECTION: Codec Trait
// ============================================================================

/// Encodes and decodes queue payload values.
///
/// # Invariants
/// - `decode(encode(v))` must reproduce `v` for every value the caller
///   enqueues; the queue round-trips bytes without inspecting them.
pub trait PayloadCodec<T>: Send + Sync {
    /// Encodes a value into payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Codec`] when the value cannot be encoded.
    fn encode(&self, value: &T) -> Result<Vec<u8>, CoordError>;

    /// Decodes payload bytes back into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Codec`] when the bytes cannot be decoded.
    fn decode(&self, bytes: &[u8]) -> Result<T, CoordError>;
}

// ============================================================================
// SECTION: JSON Codec
// ============================================================================

/// JSON codec for serde-serializable payload types.
///
/// # Invariants
/// - Stateless; one instance may serve any number of queues.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> PayloadCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, CoordError> {
        serde_json::to_vec(value).map_err(|err| CoordError::Codec(err.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CoordError> {
        serde_json::from_slice(bytes).map_err(|err| CoordError::Codec(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use serde::Deserialize;
    use serde::Serialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Job {
        name: String,
        attempts: u32,
    }

    #[test]
    fn json_codec_round_trips_structured_payloads() {
        let job = Job { name: "reindex".to_string(), attempts: 3 };
        let bytes = JsonCodec.encode(&job).expect("encode");
        let decoded: Job = JsonCodec.decode(&bytes).expect("decode");
        assert_eq!(decoded, job);
    }

    #[test]
    fn json_codec_reports_undecodable_bytes_as_codec_errors() {
        let outcome: Result<Job, CoordError> = JsonCodec.decode(b"not json");
        assert!(matches!(outcome, Err(CoordError::Codec(_))));
    }
}
