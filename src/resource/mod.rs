//! Copy-on-write resource builders.
//!
//! A [`Resource`] describes a remote endpoint as an accumulation of
//! fragments: URI components, query fragments, header and option edits,
//! codec choices, and declared capabilities. Every builder method takes
//! `&self` and returns a new value, so a base resource handed out to
//! callers is never altered in place.
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`Resource`]: the fragment-accumulating endpoint descriptor
//! - [`Verb`]: the closed set of supported HTTP methods
//! - [`Declarations`] / [`DeclarationBuilder`]: capability registration
//! - [`CapabilityTable`]: the compiled name → callable lookup table
//! - [`OperationReflection`]: a frozen snapshot taken before execution
//!
//! # Example
//!
//! ```rust
//! use rest_record::resource::Resource;
//!
//! let base = Resource::new("http://widgets.test/api/")?;
//! let listing = base.path("widgets").query("page=2").http_method("get");
//!
//! assert_eq!(listing.to_url()?, "http://widgets.test/api/widgets?page=2");
//! // `base` is untouched:
//! assert_eq!(base.to_url()?, "http://widgets.test/api/");
//! # Ok::<(), rest_record::RestError>(())
//! ```
//!
//! All `build_*` functions are pure functions of the accumulated
//! fragments; nothing is resolved until a URL or reflection is requested.

mod extension;
mod request;
mod uri;

pub use extension::{
    Capability, CapabilityTable, DeclarationBuilder, Declarations, OperationCall, OperationFn,
    SubresourceFn,
};
pub use request::Verb;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};
use url::Url;

use crate::codec::{CodecReflection, Representation, DEFAULT_DECODERS};
use crate::config::{ConfigOverrides, RestConfig};
use crate::error::RestError;

/// One accumulated query edit: either a raw query string kept verbatim,
/// or a key/value mapping.
#[derive(Debug, Clone)]
enum QueryFragment {
    Raw(String),
    Map(Map<String, Value>),
}

impl QueryFragment {
    fn is_empty(&self) -> bool {
        match self {
            Self::Raw(s) => s.is_empty(),
            Self::Map(m) => m.is_empty(),
        }
    }
}

/// One accumulated header edit: merge a mapping in, or delete a key.
#[derive(Debug, Clone)]
enum HeaderFragment {
    Merge(BTreeMap<String, String>),
    Delete(String),
}

/// One accumulated transport-option edit.
#[derive(Debug, Clone)]
enum OptionFragment {
    Merge(Map<String, Value>),
    Delete(String),
}

/// An immutable-intent descriptor of a target endpoint.
///
/// Mutating builder methods clone the receiver, apply the edit to the
/// clone, and return it. Building methods (`to_url`, [`Resource::to_reflection`])
/// evaluate the accumulated fragments on demand.
///
/// A resource created with [`Resource::subresource_of`] falls back to its
/// parent for unset URI components and merges query, header, and option
/// fragments with (rather than replacing) the parent's.
#[derive(Debug, Clone)]
pub struct Resource {
    base: Url,
    parent: Option<Box<Resource>>,
    ssl_value: Option<bool>,
    user_value: Option<String>,
    password_value: Option<String>,
    host_value: Option<String>,
    port_value: Option<u16>,
    path_values: Vec<String>,
    query_values: Vec<QueryFragment>,
    method_value: Option<String>,
    header_values: Vec<HeaderFragment>,
    option_values: Vec<OptionFragment>,
    accept_values: Vec<Representation>,
    decoder_values: Vec<CodecReflection>,
    encoder_value: Option<CodecReflection>,
    overrides: ConfigOverrides,
    declarations: Declarations,
    capabilities: OnceLock<Arc<CapabilityTable>>,
}

impl Resource {
    /// Creates a resource from an absolute base URL.
    ///
    /// Userinfo and any query string present in the base are extracted
    /// into their fragment equivalents so later edits merge with them.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Unresolvable`] if the URL cannot be parsed.
    pub fn new(base: &str) -> Result<Self, RestError> {
        let url = Url::parse(base)
            .map_err(|e| RestError::Unresolvable(format!("invalid base URL {base:?}: {e}")))?;
        Ok(Self::from_url(url))
    }

    /// Creates a resource from an already-parsed base URL.
    #[must_use]
    pub fn from_url(mut base: Url) -> Self {
        let mut query_values = Vec::new();
        if let Some(query) = base.query() {
            if !query.is_empty() {
                query_values.push(QueryFragment::Raw(query.to_string()));
            }
        }
        let user_value = (!base.username().is_empty()).then(|| base.username().to_string());
        let password_value = base.password().map(ToString::to_string);
        base.set_query(None);
        base.set_username("").ok();
        base.set_password(None).ok();

        Self {
            base,
            parent: None,
            ssl_value: None,
            user_value,
            password_value,
            host_value: None,
            port_value: None,
            path_values: Vec::new(),
            query_values,
            method_value: None,
            header_values: Vec::new(),
            option_values: Vec::new(),
            accept_values: Vec::new(),
            decoder_values: Vec::new(),
            encoder_value: None,
            overrides: ConfigOverrides::default(),
            declarations: Declarations::new(),
            capabilities: OnceLock::new(),
        }
    }

    /// Creates a subresource of `parent`.
    ///
    /// The child starts with no fragments of its own; unset scheme, host,
    /// and port fall back to the parent's built values, the parent's path
    /// is treated as a directory prefix once the child adds path fragments,
    /// and query/header/option fragments merge after the parent's. The
    /// parent's verb selection carries over.
    #[must_use]
    pub fn subresource_of(parent: &Self) -> Self {
        let mut child = Self::from_url(parent.base.clone());
        child.query_values.clear();
        child.method_value.clone_from(&parent.method_value);
        child.parent = Some(Box::new(parent.clone()));
        child
    }

    /// Layers configuration overrides onto this resource. Later layers
    /// win over earlier ones; a subresource's overrides win over its
    /// parent's.
    #[must_use]
    pub fn configure(&self, overrides: ConfigOverrides) -> Self {
        let mut next = self.clone();
        if let Some(v) = overrides.unwrap_client_exceptions {
            next.overrides.unwrap_client_exceptions = Some(v);
        }
        if let Some(v) = overrides.mock_response_on_connection_error {
            next.overrides.mock_response_on_connection_error = Some(v);
        }
        if let Some(v) = overrides.default_options {
            let target = next.overrides.default_options.get_or_insert_with(Map::new);
            for (key, value) in v {
                target.insert(key, value);
            }
        }
        if let Some(v) = overrides.allowed_http_methods {
            next.overrides.allowed_http_methods = Some(v);
        }
        next
    }

    /// Resolves the configuration for an operation on this resource by
    /// layering the parent chain's overrides, then this resource's own,
    /// over the supplied base.
    #[must_use]
    pub fn build_config(&self, base: &RestConfig) -> RestConfig {
        let inherited = self
            .parent
            .as_ref()
            .map_or_else(|| base.clone(), |p| p.build_config(base));
        if self.overrides.is_empty() {
            inherited
        } else {
            inherited.merged(&self.overrides)
        }
    }

    /// Takes a frozen snapshot of everything an execution needs: the
    /// validated verb, the built URL, headers, transport options, and the
    /// codec selections.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::InvalidOperation`] when no verb is resolvable
    /// (or the verb is unknown or disallowed) and [`RestError::Unresolvable`]
    /// when no usable URI can be derived.
    pub fn to_reflection(&self, config: &RestConfig) -> Result<OperationReflection, RestError> {
        let verb = self.build_verb(config)?;
        let url = self.build_uri()?;
        Ok(OperationReflection {
            verb,
            url: url.to_string(),
            headers: self.build_headers(),
            options: self.build_options(config.default_options.clone()),
            encoder: self.encoder_reflection(),
            decoders: self.decoder_reflections(),
        })
    }

    /// The effective encoder: this resource's choice, else the nearest
    /// ancestor's, else url-encoded.
    pub(crate) fn encoder_reflection(&self) -> CodecReflection {
        if let Some(encoder) = &self.encoder_value {
            return encoder.clone();
        }
        self.parent.as_ref().map_or_else(
            || CodecReflection::of(Representation::UrlEncoded),
            |p| p.encoder_reflection(),
        )
    }

    /// The declared decoder candidates, else the built-in default set.
    pub(crate) fn decoder_reflections(&self) -> Vec<CodecReflection> {
        if self.decoder_values.is_empty() {
            DEFAULT_DECODERS.iter().map(|r| CodecReflection::of(*r)).collect()
        } else {
            self.decoder_values.clone()
        }
    }
}

/// A frozen snapshot of an operation about to execute.
///
/// Used both to drive the actual transport call and for introspection in
/// tests, so assertions can be made about the negotiated request without
/// performing it.
#[derive(Debug, Clone)]
pub struct OperationReflection {
    /// The validated HTTP verb.
    pub verb: Verb,
    /// The fully built URL.
    pub url: String,
    /// Final request headers, lowercased keys.
    pub headers: BTreeMap<String, String>,
    /// Merged transport options.
    pub options: Map<String, Value>,
    /// The encoder that will serialize a request body.
    pub encoder: CodecReflection,
    /// Decoder candidates matched against the response Content-Type.
    pub decoders: Vec<CodecReflection>,
}

/// Deep-merges `incoming` into `target`: nested objects merge key-wise,
/// anything else is replaced (last wins).
pub(crate) fn deep_merge(target: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        match (target.get_mut(key), value) {
            (Some(Value::Object(nested)), Value::Object(update)) => deep_merge(nested, update),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
