//! Single-attempt operation handler.
//!
//! An [`OperationHandler`] owns one network attempt: it transmits the
//! request, classifies the outcome into the three observable flags
//! (`transmitted`, `aborted`, `completed`), and funnels every failure
//! through an ordered rescue chain that may substitute a usable result.
//!
//! Transition rules:
//!
//! - The attempt starts out presumed untransmitted; receiving any response
//!   (even a non-2xx one that is then raised as [`RequestFailedError`])
//!   flips `transmitted` to true.
//! - Any raised error enters the abort path. A rescue handler counts as
//!   having handled the error only if it supplies a substitute response;
//!   otherwise the original error propagates with `aborted = true`.
//! - `completed` is true when transmitted and not aborted, or when a
//!   handler substituted a result.
//!
//! Two built-in rescues are installed from configuration: connection-level
//! errors may synthesize a 503 mock response
//! (`mock_response_on_connection_error`), and a failed request may be
//! unwrapped back into its raw response (`unwrap_client_exceptions`).

use serde_json::Value;

use crate::config::RestConfig;
use crate::error::{RequestFailedError, RestError};
use crate::transport::{Response, Transport, TransportRequest};

/// Validates a response, turning non-2xx statuses into errors.
pub type ResponseHandler = Box<dyn Fn(Response) -> Result<Response, RestError> + Send + Sync>;

/// Matches error kinds a recovery applies to.
pub type RescuePredicate = Box<dyn Fn(&RestError) -> bool + Send + Sync>;

/// Produces a substitute response for a matched error, or declines.
pub type RescueRecovery = Box<dyn Fn(&RestError) -> Option<Response> + Send + Sync>;

/// The outcome of one operation attempt.
///
/// Captures the three independent flags plus the raw response and, after
/// the decode stage, the decoded payload.
#[derive(Debug, Clone)]
pub struct OperationResult {
    transmitted: bool,
    aborted: bool,
    completed: bool,
    substituted: bool,
    /// The response, when one was received or substituted.
    pub response: Option<Response>,
    /// The decoded payload, filled in by the pipeline's decode stage.
    pub payload: Option<Value>,
}

impl OperationResult {
    /// A normally received and accepted response.
    #[must_use]
    pub const fn received(response: Response) -> Self {
        Self {
            transmitted: true,
            aborted: false,
            completed: true,
            substituted: false,
            response: Some(response),
            payload: None,
        }
    }

    /// A result substituted by a rescue handler. `transmitted` reflects
    /// whether a real response was received before the abort path ran.
    #[must_use]
    pub const fn substituted(response: Response, transmitted: bool) -> Self {
        Self {
            transmitted,
            aborted: false,
            completed: true,
            substituted: true,
            response: Some(response),
            payload: None,
        }
    }

    /// An aborted attempt with no usable result.
    #[must_use]
    pub const fn failed(transmitted: bool, response: Option<Response>) -> Self {
        Self {
            transmitted,
            aborted: true,
            completed: false,
            substituted: false,
            response,
            payload: None,
        }
    }

    /// Whether a response was received.
    #[must_use]
    pub const fn transmitted(&self) -> bool {
        self.transmitted
    }

    /// Whether an error terminated the attempt.
    #[must_use]
    pub const fn aborted(&self) -> bool {
        self.aborted
    }

    /// Whether the operation produced a usable result.
    #[must_use]
    pub const fn completed(&self) -> bool {
        self.completed
    }

    /// Whether a rescue handler supplied the result.
    #[must_use]
    pub const fn was_substituted(&self) -> bool {
        self.substituted
    }
}

/// An aborted operation: the error plus the flag-bearing result.
#[derive(Debug)]
pub struct Aborted {
    /// The error that terminated the attempt.
    pub error: RestError,
    /// The attempt's observable outcome (aborted, possibly transmitted).
    pub result: OperationResult,
}

/// Drives one request/response attempt through the transport.
pub struct OperationHandler<'a> {
    request: TransportRequest,
    transport: &'a dyn Transport,
    response_handler: ResponseHandler,
    rescues: Vec<(RescuePredicate, RescueRecovery)>,
}

impl<'a> OperationHandler<'a> {
    /// Creates a handler with the built-in rescue mappings derived from
    /// configuration and the default response handler (non-2xx raises
    /// [`RequestFailedError`]).
    #[must_use]
    pub fn new(request: TransportRequest, transport: &'a dyn Transport, config: &RestConfig) -> Self {
        let mock_on_connection_error = config.mock_response_on_connection_error;
        let unwrap_client_exceptions = config.unwrap_client_exceptions;

        let mut handler = Self {
            request,
            transport,
            response_handler: Box::new(default_response_handler),
            rescues: Vec::new(),
        };

        // Built-ins sit at the bottom of the chain; custom rescues
        // registered later take precedence.
        handler.rescues.push((
            Box::new(|error: &RestError| match error {
                RestError::Connection(e) => e.is_recoverable(),
                _ => false,
            }),
            Box::new(move |error: &RestError| {
                mock_on_connection_error.then(|| Response::mock(503, &error.to_string()))
            }),
        ));
        handler.rescues.push((
            Box::new(|error: &RestError| matches!(error, RestError::RequestFailed(_))),
            Box::new(move |error: &RestError| {
                if !unwrap_client_exceptions {
                    return None;
                }
                match error {
                    RestError::RequestFailed(e) => Some(e.response.clone()),
                    _ => None,
                }
            }),
        ));

        handler
    }

    /// Replaces the response handler for this attempt.
    #[must_use]
    pub fn with_response_handler(mut self, handler: ResponseHandler) -> Self {
        self.response_handler = handler;
        self
    }

    /// Registers a rescue mapping. Later registrations take precedence
    /// over earlier ones (and over the built-ins).
    #[must_use]
    pub fn rescue(mut self, predicate: RescuePredicate, recovery: RescueRecovery) -> Self {
        self.rescues.push((predicate, recovery));
        self
    }

    /// Performs the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] when the attempt raised an error no rescue
    /// handler substituted a result for; the embedded result still carries
    /// the observable flags.
    pub async fn transmit(&mut self) -> Result<OperationResult, Aborted> {
        match self.transport.perform(&self.request).await {
            Ok(response) => match (self.response_handler)(response) {
                Ok(accepted) => Ok(OperationResult::received(accepted)),
                // A response was received even though the handler raised.
                Err(error) => self.abort(error, true),
            },
            Err(transport_error) => self.abort(RestError::Connection(transport_error), false),
        }
    }

    /// Runs the abort path: the first matching rescue (searched newest
    /// first) gets one chance to supply a substitute result.
    fn abort(&self, error: RestError, transmitted: bool) -> Result<OperationResult, Aborted> {
        for (predicate, recovery) in self.rescues.iter().rev() {
            if !predicate(&error) {
                continue;
            }
            if let Some(substitute) = recovery(&error) {
                tracing::debug!(
                    url = %self.request.url,
                    error = %error,
                    "operation error handled by rescue"
                );
                return Ok(OperationResult::substituted(substitute, transmitted));
            }
            break;
        }

        tracing::warn!(url = %self.request.url, error = %error, "operation aborted");
        let response = match &error {
            RestError::RequestFailed(e) => Some(e.response.clone()),
            _ => None,
        };
        Err(Aborted {
            error,
            result: OperationResult::failed(transmitted, response),
        })
    }
}

/// The default response policy: any non-2xx response raises
/// [`RequestFailedError`] carrying the response.
fn default_response_handler(response: Response) -> Result<Response, RestError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(RestError::RequestFailed(RequestFailedError { response }))
    }
}
