//! Error types for the message envelope codec.

use thiserror::Error;

/// Why a raw payload could not be decoded into a [`super::CrossChainMessage`].
///
/// Every variant is permanent: a malformed payload will be just as malformed
/// on the next delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is shorter than the fixed envelope.
    #[error("truncated payload: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    /// The payload carries bytes past the fixed envelope.
    #[error("trailing bytes: expected {expected} bytes, got {got}")]
    TrailingBytes { expected: usize, got: usize },

    /// A fixed-width field has non-zero padding, so it is not a well-formed
    /// value of its declared width.
    #[error("malformed {field} field: non-zero padding")]
    MalformedField { field: &'static str },

    /// The amount word does not fit the protocol's amount type.
    #[error("amount exceeds 128 bits")]
    AmountOutOfRange,
}
