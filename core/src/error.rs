//! Error types for the bridge client.
//!
//! # Design
//! Every operation produces exactly one of a decoded payload or an `ApiError`.
//! Credential problems are caught while building the request, so they never
//! reach the transport. Non-200 responses keep the bridge's body verbatim;
//! per-item failures inside a 200 body surface as `StateUpdate`.

use std::fmt;

use thiserror::Error;

/// Longest body prefix kept in a `Decode` error.
pub const MAX_BODY_PREFIX: usize = 256;

/// Which half of the credential pair was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Host,
    User,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialField::Host => write!(f, "host"),
            CredentialField::User => write!(f, "user"),
        }
    }
}

/// Errors returned by `BridgeClient` and `BridgeSession`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Host or user token was absent or empty. No request was sent.
    #[error("missing {0}")]
    MissingCredential(CredentialField),

    /// The bridge answered with a non-200 status. `body` is its text verbatim.
    #[error("{body}")]
    Bridge { status: u16, body: String },

    /// The body was malformed JSON or did not have the expected shape.
    #[error("failed to decode '{body}': {message}")]
    Decode { message: String, body: String },

    /// A light key or identifier was not numeric.
    #[error("failed to parse light key into identifier '{0}'")]
    KeyParse(String),

    /// A mutation response held something other than objects.
    #[error("failed to read state response")]
    UnexpectedResponseShape,

    /// The bridge rejected a mutation.
    #[error("failed to set state: {0}")]
    StateUpdate(String),

    /// A field the caller relies on was missing or had the wrong type.
    #[error("unexpected resource shape: {0}")]
    ShapeMismatch(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The transport gave up waiting for the bridge.
    #[error("request timed out")]
    Timeout,

    /// The caller cancelled the operation.
    #[error("request canceled")]
    Canceled,

    /// Connection-level failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Build a `Decode` error, keeping at most `MAX_BODY_PREFIX` bytes of body.
    pub fn decode(message: impl fmt::Display, body: &str) -> Self {
        ApiError::Decode {
            message: message.to_string(),
            body: body_prefix(body).to_string(),
        }
    }
}

fn body_prefix(body: &str) -> &str {
    if body.len() <= MAX_BODY_PREFIX {
        return body;
    }
    let mut end = MAX_BODY_PREFIX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
