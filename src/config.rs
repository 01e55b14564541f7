//! Operation configuration for the rest-record crate.
//!
//! Configuration is instance-based and merged explicitly; there is no global
//! state. A fully resolved [`RestConfig`] is produced by layering
//! [`ConfigOverrides`] over defaults, with precedence strictly innermost
//! wins: call-level overrides resource-level, which overrides scope-level,
//! which overrides the built-in defaults.
//!
//! # Example
//!
//! ```rust
//! use rest_record::config::{ConfigOverrides, RestConfig};
//!
//! let scope = ConfigOverrides {
//!     mock_response_on_connection_error: Some(false),
//!     ..ConfigOverrides::default()
//! };
//! let resolved = RestConfig::default().merged(&scope);
//! assert!(!resolved.mock_response_on_connection_error);
//! assert!(!resolved.unwrap_client_exceptions);
//! ```

use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Verb names permitted by default.
const DEFAULT_ALLOWED_METHODS: [&str; 8] = [
    "get", "head", "post", "put", "patch", "delete", "options", "trace",
];

/// Fully resolved configuration consumed by the operation pipeline.
///
/// Precedence when the same option is set at several levels: call-level
/// beats resource-level beats scope-level beats defaults (innermost wins).
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// When a request fails with a non-2xx status, unwrap the error back
    /// into the raw response instead of aborting the operation.
    pub unwrap_client_exceptions: bool,
    /// When a connection-level error occurs (refused, timeout), substitute
    /// a synthesized 503 response instead of raising.
    pub mock_response_on_connection_error: bool,
    /// Options merged beneath every request's option fragments, consumed
    /// by the transport layer (e.g. timeouts).
    pub default_options: Map<String, Value>,
    /// Lowercased verb names the pipeline will agree to execute.
    pub allowed_http_methods: BTreeSet<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            unwrap_client_exceptions: false,
            mock_response_on_connection_error: true,
            default_options: Map::new(),
            allowed_http_methods: DEFAULT_ALLOWED_METHODS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl RestConfig {
    /// Checks whether the given (lowercased) verb name is allowed.
    #[must_use]
    pub fn method_allowed(&self, verb: &str) -> bool {
        self.allowed_http_methods.contains(&verb.to_ascii_lowercase())
    }

    /// Layers a set of overrides on top of this configuration, returning
    /// the resolved result. Apply outermost layers first so the innermost
    /// override lands last and wins.
    #[must_use]
    pub fn merged(&self, overrides: &ConfigOverrides) -> Self {
        let mut out = self.clone();
        if let Some(v) = overrides.unwrap_client_exceptions {
            out.unwrap_client_exceptions = v;
        }
        if let Some(v) = overrides.mock_response_on_connection_error {
            out.mock_response_on_connection_error = v;
        }
        if let Some(v) = &overrides.default_options {
            for (key, value) in v {
                out.default_options.insert(key.clone(), value.clone());
            }
        }
        if let Some(v) = &overrides.allowed_http_methods {
            out.allowed_http_methods = v.iter().map(|m| m.to_ascii_lowercase()).collect();
        }
        out
    }
}

/// A partial configuration layer. `None` fields inherit from the layer
/// beneath.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// See [`RestConfig::unwrap_client_exceptions`].
    pub unwrap_client_exceptions: Option<bool>,
    /// See [`RestConfig::mock_response_on_connection_error`].
    pub mock_response_on_connection_error: Option<bool>,
    /// Keys merged into [`RestConfig::default_options`].
    pub default_options: Option<Map<String, Value>>,
    /// Replaces [`RestConfig::allowed_http_methods`] wholesale when set.
    pub allowed_http_methods: Option<BTreeSet<String>>,
}

impl ConfigOverrides {
    /// Checks whether this layer sets anything at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.unwrap_client_exceptions.is_none()
            && self.mock_response_on_connection_error.is_none()
            && self.default_options.is_none()
            && self.allowed_http_methods.is_none()
    }
}
