//! The operation pipeline.
//!
//! A [`ResourceAdapter`] drives one remote call through its stages:
//! resolve (bind a concrete [`Resource`] and its configuration), prepare
//! (freeze an [`OperationReflection`] with a validated verb), encode (turn
//! the payload into a wire body when the verb carries one), execute (one
//! transport attempt through [`OperationHandler`], consulting the resource
//! cache for safe verbs), and decode (select a decoder by the response
//! Content-Type and produce the structured payload).
//!
//! The cache handle is passed in explicitly; there is no ambient global
//! state. An unsafe verb clears the entire cache before executing,
//! whether or not caching is enabled.

use std::time::Instant;

use serde_json::Value;

use crate::cache::ResourceCache;
use crate::config::RestConfig;
use crate::error::RestError;
use crate::handler::{OperationHandler, OperationResult};
use crate::resource::{OperationReflection, Resource};
use crate::transport::{Transport, TransportRequest};

/// Drives the resolve → prepare → encode → execute → decode lifecycle for
/// one call against a resource.
#[derive(Debug)]
pub struct ResourceAdapter<'a> {
    resource: Resource,
    config: RestConfig,
    transport: &'a dyn Transport,
    cache: &'a ResourceCache,
    event_name: Option<String>,
    last_result: Option<OperationResult>,
}

impl<'a> ResourceAdapter<'a> {
    /// Resolves an adapter onto a concrete resource. The operation's
    /// configuration is the resource's override chain layered over
    /// `base_config`.
    #[must_use]
    pub fn new(
        resource: Resource,
        base_config: &RestConfig,
        transport: &'a dyn Transport,
        cache: &'a ResourceCache,
    ) -> Self {
        let config = resource.build_config(base_config);
        Self {
            resource,
            config,
            transport,
            cache,
            event_name: None,
            last_result: None,
        }
    }

    /// Names the structured log event emitted per operation (usually the
    /// model name).
    #[must_use]
    pub fn with_event_name(mut self, name: &str) -> Self {
        self.event_name = Some(name.to_string());
        self
    }

    /// Overrides the HTTP verb at call time.
    #[must_use]
    pub fn with_verb(mut self, verb: &str) -> Self {
        self.resource = self.resource.http_method(verb);
        self
    }

    /// The resolved configuration for this operation.
    #[must_use]
    pub const fn config(&self) -> &RestConfig {
        &self.config
    }

    /// The flag-bearing outcome of the most recent call, including an
    /// aborted one.
    #[must_use]
    pub const fn last_result(&self) -> Option<&OperationResult> {
        self.last_result.as_ref()
    }

    /// Freezes the operation snapshot without executing anything.
    ///
    /// # Errors
    ///
    /// Returns the prepare-stage errors: [`RestError::InvalidOperation`]
    /// for a missing, unknown, or disallowed verb and
    /// [`RestError::Unresolvable`] when no URI can be built.
    pub fn reflect(&self) -> Result<OperationReflection, RestError> {
        self.resource.to_reflection(&self.config)
    }

    /// Runs the remaining pipeline stages for one call.
    ///
    /// # Errors
    ///
    /// Any stage error propagates: prepare and encode errors immediately,
    /// execute errors after the rescue chain declines, decode errors from
    /// an unusable response body. After an execute abort the flag-bearing
    /// result remains available through [`ResourceAdapter::last_result`].
    pub async fn call(&mut self, payload: Option<Value>) -> Result<OperationResult, RestError> {
        self.last_result = None;
        let reflection = self.reflect()?;
        let body = encode_payload(&reflection, payload.as_ref())?;
        let started = Instant::now();

        // An unsafe verb invalidates everything before it executes.
        if !reflection.verb.is_safe() {
            self.cache.clear();
        }
        let consult_cache = reflection.verb.is_safe() && self.cache.is_enabled();
        if consult_cache {
            if let Some(hit) = self.cache.lookup(&reflection.url, &reflection.headers) {
                self.emit_event(&reflection, started, true);
                self.last_result = Some(hit.clone());
                return Ok(hit);
            }
        }

        let request = TransportRequest {
            verb: reflection.verb,
            url: reflection.url.clone(),
            headers: reflection.headers.clone(),
            body,
            options: reflection.options.clone(),
        };
        let mut handler = OperationHandler::new(request, self.transport, &self.config);
        let mut result = match handler.transmit().await {
            Ok(result) => result,
            Err(aborted) => {
                tracing::error!(
                    verb = %reflection.verb,
                    url = %reflection.url,
                    error = %aborted.error,
                    "operation failed"
                );
                self.last_result = Some(aborted.result);
                return Err(aborted.error);
            }
        };

        decode_result(&reflection, &mut result)?;
        if consult_cache {
            self.cache.store(&reflection.url, &reflection.headers, &result);
        }
        self.emit_event(&reflection, started, false);
        self.last_result = Some(result.clone());
        Ok(result)
    }

    fn emit_event(&self, reflection: &OperationReflection, started: Instant, cached: bool) {
        let name = if cached {
            "CACHE"
        } else {
            self.event_name.as_deref().unwrap_or("operation")
        };
        tracing::info!(
            name,
            verb = %reflection.verb,
            url = %reflection.url,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "completed operation"
        );
    }
}

/// Encode stage: a body-bearing verb requires a payload, a bodyless verb
/// forbids one.
fn encode_payload(
    reflection: &OperationReflection,
    payload: Option<&Value>,
) -> Result<Option<String>, RestError> {
    if reflection.verb.request_has_body() {
        let value = payload.ok_or_else(|| {
            RestError::InvalidOperation(format!("{} requires a payload", reflection.verb))
        })?;
        Ok(Some(reflection.encoder.encode(value)?))
    } else if payload.is_some_and(|value| !value.is_null()) {
        Err(RestError::InvalidOperation(format!(
            "{} does not support a payload",
            reflection.verb
        )))
    } else {
        Ok(None)
    }
}

/// Decode stage: selects a decoder by matching the response Content-Type
/// against the declared candidates. Substituted results (e.g. a mock 503)
/// and bodyless responses are left undecoded.
fn decode_result(
    reflection: &OperationReflection,
    result: &mut OperationResult,
) -> Result<(), RestError> {
    if !reflection.verb.response_has_body() || result.was_substituted() {
        return Ok(());
    }
    let Some(response) = result.response.as_ref() else {
        return Ok(());
    };
    let content_type = response
        .content_type()
        .ok_or_else(|| RestError::Protocol("missing Content-Type in response".to_string()))?
        .to_string();
    let decoder = reflection
        .decoders
        .iter()
        .find(|candidate| candidate.matches(&content_type))
        .ok_or(RestError::NoDecoder { content_type })?;
    result.payload = Some(decoder.decode(&response.body)?);
    Ok(())
}
