//! Error types for the protocol layer.
//!
//! Every crate in Agora has its own error enum, so a `ProtocolError` always
//! means "the bytes did not make sense", never "the socket broke" or "the
//! room is gone".

/// Errors that can occur while framing, encoding, or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a push body failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A request body could not be parsed for its tag.
    ///
    /// Typical causes are malformed JSON, a missing field, or a field of
    /// the wrong type (e.g. a string where `total` expects a number).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope carried a tag this server does not understand.
    ///
    /// Callers usually skip these rather than closing the connection.
    #[error("unknown message type: {0:?}")]
    UnknownType(String),

    /// The envelope itself is unusable (e.g. the tag is not UTF-8).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns `true` for errors that only concern a single unrecognised
    /// message and leave the stream itself in a usable state.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}
