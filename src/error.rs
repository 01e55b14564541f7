//! Error types for the rest-record crate.
//!
//! Two layers of errors exist:
//!
//! - [`RestError`]: failures in the resource/operation pipeline, from URI
//!   resolution through transport and decoding.
//! - [`ModelError`]: record-level failures (not found, not saved, read-only)
//!   raised by the model persistence and query glue. Pipeline errors nest
//!   transparently inside it.
//!
//! # Example
//!
//! ```rust,ignore
//! match scope.find_one(json!(42)).await {
//!     Ok(record) => println!("found {record:?}"),
//!     Err(ModelError::RecordNotFound { model, key, id }) => {
//!         println!("couldn't find {model} with {key}={id}");
//!     }
//!     Err(e) => println!("operation failed: {e}"),
//! }
//! ```

use thiserror::Error;

use crate::transport::{Response, TransportError};

/// Error raised when a request completed with a non-2xx status code.
///
/// The failing [`Response`] is carried along so rescue handlers (and the
/// `unwrap_client_exceptions` configuration) can recover it. The display
/// message is derived from the status code's canonical reason phrase.
#[derive(Debug, Clone, Error)]
#[error("{}", .response.status_reason())]
pub struct RequestFailedError {
    /// The non-successful response that was received.
    pub response: Response,
}

/// Errors produced by the resource builder and operation pipeline.
#[derive(Debug, Error)]
pub enum RestError {
    /// Malformed or missing wire-level metadata, e.g. a body-bearing
    /// response without a Content-Type header.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A usable URI could not be derived from the builder, e.g. missing
    /// host or a scheme other than http/https.
    #[error("unresolvable resource: {0}")]
    Unresolvable(String),

    /// The operation cannot be performed as described: no verb, a
    /// disallowed verb, or a payload/verb mismatch.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A decoded body had an unexpected shape, e.g. a scalar where a
    /// collection was required.
    #[error("invalid representation: {0}")]
    InvalidRepresentation(String),

    /// A capability name was declared as both an operation and a
    /// subresource on the same resource.
    #[error("{name:?} has already been declared")]
    Declaration {
        /// The conflicting capability name.
        name: String,
    },

    /// A capability was invoked that the resource does not declare.
    #[error("{name:?} is not declared on this resource")]
    UnknownCapability {
        /// The undeclared capability name.
        name: String,
    },

    /// The response carried a Content-Type with no matching configured
    /// decoder.
    #[error("no decoder for {content_type:?} response")]
    NoDecoder {
        /// The unmatched wire Content-Type.
        content_type: String,
    },

    /// A payload could not be encoded or a body could not be decoded by
    /// the selected coder.
    #[error("codec error: {0}")]
    Codec(String),

    /// The request completed with a non-2xx status code.
    #[error(transparent)]
    RequestFailed(#[from] RequestFailedError),

    /// A connection-level failure (refused, timeout) from the transport.
    #[error(transparent)]
    Connection(#[from] TransportError),
}

impl RestError {
    /// Returns the response status code when this error wraps a received
    /// response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed(e) => Some(e.response.status),
            _ => None,
        }
    }

    /// Checks whether this error represents a connection-level failure
    /// rather than a protocol-level outcome.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Errors produced by the model persistence and query glue.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A single-record lookup found nothing, or a multi-id lookup did not
    /// resolve every requested id.
    #[error("couldn't find {model} with {key}={id}")]
    RecordNotFound {
        /// The model name.
        model: &'static str,
        /// The key attribute used for the lookup.
        key: &'static str,
        /// The id (or joined ids) that missed.
        id: String,
    },

    /// A strict save failed because the remote rejected the record.
    #[error("failed to save {model}")]
    RecordNotSaved {
        /// The model name.
        model: &'static str,
    },

    /// A strict destroy failed.
    #[error("failed to destroy {model}")]
    RecordNotDestroyed {
        /// The model name.
        model: &'static str,
    },

    /// A mutating operation was attempted on a read-only record.
    #[error("{model} is marked as read-only")]
    ReadOnlyRecord {
        /// The model name.
        model: &'static str,
    },

    /// Record attributes could not be serialized or deserialized.
    #[error("attribute serialization failed: {0}")]
    Attributes(String),

    /// An underlying pipeline error.
    #[error(transparent)]
    Rest(#[from] RestError),
}

impl ModelError {
    /// Returns the response status code when the underlying failure wraps
    /// a received response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rest(e) => e.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Response;

    #[test]
    fn test_request_failed_message_uses_reason_phrase() {
        let error = RequestFailedError {
            response: Response::new(404, Vec::new(), String::new()),
        };
        assert_eq!(error.to_string(), "Not Found");
    }

    #[test]
    fn test_rest_error_status_for_request_failed() {
        let error = RestError::from(RequestFailedError {
            response: Response::new(422, Vec::new(), String::new()),
        });
        assert_eq!(error.status(), Some(422));
    }

    #[test]
    fn test_rest_error_status_absent_for_other_kinds() {
        let error = RestError::Protocol("missing Content-Type".into());
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_connection_error_classification() {
        let error = RestError::Connection(TransportError::ConnectionRefused(
            "tcp connect error".into(),
        ));
        assert!(error.is_connection_error());
        assert!(!RestError::Protocol(String::new()).is_connection_error());
    }

    #[test]
    fn test_record_not_found_message() {
        let error = ModelError::RecordNotFound {
            model: "Segment",
            key: "id",
            id: "42".to_string(),
        };
        assert_eq!(error.to_string(), "couldn't find Segment with id=42");
    }

    #[test]
    fn test_model_error_wraps_rest_error_transparently() {
        let error = ModelError::from(RestError::InvalidRepresentation(
            "expected an array".into(),
        ));
        assert!(error.to_string().contains("expected an array"));
    }
}
