//! Codec trait and implementations for message bodies.
//!
//! The envelope framing (`tag\r\n\r\nbody`) is fixed, but how the body is
//! serialized is a strategy behind the [`Codec`] trait. The server is generic
//! over it, so a test or an alternative deployment can swap the body format
//! without touching the connection handler.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts message bodies between Rust types and bytes.
///
/// `Send + Sync + 'static` because a single codec value is shared by every
/// connection task through the server state.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a body into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Parses a body from bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`. This is what browsers speak.
///
/// Behind the `json` feature (enabled by default).
///
/// ```rust
/// use agora_protocol::{Codec, JsonCodec, UserEntry, ParticipantId};
///
/// let codec = JsonCodec;
/// let entry = UserEntry { id: ParticipantId(3), name: "ann".into() };
/// let bytes = codec.encode(&entry).unwrap();
/// assert_eq!(bytes, br#"{"id":3,"name":"ann"}"#);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
