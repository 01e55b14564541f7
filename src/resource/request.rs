//! Request-descriptor methods for [`Resource`]: verb selection, header
//! and transport-option fragments, accepts, and codec choices.
//!
//! Verb selection is speculative: `http_method` records any word, and
//! validation against the known verb set and the configured allow-list
//! happens only when an operation is prepared.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::codec::{CodecReflection, Representation, DEFAULT_ACCEPTS};
use crate::config::RestConfig;
use crate::error::RestError;

use super::{deep_merge, HeaderFragment, OptionFragment, Resource};

/// The closed set of HTTP verbs the pipeline can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
}

impl Verb {
    /// Parses a verb name, case-insensitively.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        let known = [
            Self::Get,
            Self::Head,
            Self::Post,
            Self::Put,
            Self::Patch,
            Self::Delete,
            Self::Options,
            Self::Trace,
        ];
        known
            .into_iter()
            .find(|verb| word.eq_ignore_ascii_case(verb.as_str()))
    }

    /// The canonical uppercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }

    /// Safe verbs may be served from the resource cache; any other verb
    /// invalidates it.
    #[must_use]
    pub const fn is_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }

    /// Whether requests with this verb carry a body.
    #[must_use]
    pub const fn request_has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    /// Whether responses to this verb carry a body.
    #[must_use]
    pub const fn response_has_body(self) -> bool {
        !matches!(self, Self::Head)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Resource {
    /// Records the HTTP verb for this resource. The word is not checked
    /// here; an unknown or disallowed verb fails at prepare time with
    /// [`RestError::InvalidOperation`].
    #[must_use]
    pub fn http_method(&self, verb: &str) -> Self {
        let mut next = self.clone();
        next.method_value = Some(verb.to_ascii_lowercase());
        next
    }

    /// Shorthand for `http_method("get")`.
    #[must_use]
    pub fn get(&self) -> Self {
        self.http_method("get")
    }

    /// Shorthand for `http_method("head")`.
    #[must_use]
    pub fn head(&self) -> Self {
        self.http_method("head")
    }

    /// Shorthand for `http_method("post")`.
    #[must_use]
    pub fn post(&self) -> Self {
        self.http_method("post")
    }

    /// Shorthand for `http_method("put")`.
    #[must_use]
    pub fn put(&self) -> Self {
        self.http_method("put")
    }

    /// Shorthand for `http_method("patch")`.
    #[must_use]
    pub fn patch(&self) -> Self {
        self.http_method("patch")
    }

    /// Shorthand for `http_method("delete")`.
    #[must_use]
    pub fn delete(&self) -> Self {
        self.http_method("delete")
    }

    /// Merges a mapping of headers in.
    #[must_use]
    pub fn headers(&self, headers: BTreeMap<String, String>) -> Self {
        let mut next = self.clone();
        next.header_values.push(HeaderFragment::Merge(headers));
        next
    }

    /// Sets a single header.
    #[must_use]
    pub fn header(&self, key: &str, value: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.to_string(), value.to_string());
        self.headers(map)
    }

    /// Deletes a header, including any computed Content-Type or Accept.
    #[must_use]
    pub fn remove_header(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.header_values.push(HeaderFragment::Delete(key.to_string()));
        next
    }

    /// Discards all accumulated header fragments.
    #[must_use]
    pub fn reset_headers(&self) -> Self {
        let mut next = self.clone();
        next.header_values.clear();
        next
    }

    /// Merges transport options in. Recognized request options are routed
    /// to their builder equivalent instead of being passed to the
    /// transport: `method`/`http_method` (verb), `headers`, `params`
    /// (query), and `accepts`.
    #[must_use]
    pub fn options(&self, options: Map<String, Value>) -> Self {
        let mut next = self.clone();
        let mut remainder = Map::new();
        for (key, value) in options {
            let routed = match key.as_str() {
                "method" | "http_method" => {
                    if let Value::String(verb) = &value {
                        next = next.http_method(verb);
                        true
                    } else {
                        false
                    }
                }
                "headers" => {
                    if let Value::Object(map) = &value {
                        let headers = map
                            .iter()
                            .map(|(k, v)| (k.clone(), header_text(v)))
                            .collect();
                        next = next.headers(headers);
                        true
                    } else {
                        false
                    }
                }
                "params" => match &value {
                    Value::String(query) => {
                        next = next.query(query);
                        true
                    }
                    Value::Object(map) => {
                        next = next.query_map(map.clone());
                        true
                    }
                    _ => false,
                },
                "accepts" => {
                    if let Value::String(name) = &value {
                        Representation::for_search(name).is_some_and(|representation| {
                            next = next.accepts(&[representation]);
                            true
                        })
                    } else {
                        false
                    }
                }
                _ => false,
            };
            if !routed {
                remainder.insert(key, value);
            }
        }
        if !remainder.is_empty() {
            next.option_values.push(OptionFragment::Merge(remainder));
        }
        next
    }

    /// Sets a single transport option.
    #[must_use]
    pub fn option(&self, key: &str, value: Value) -> Self {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        self.options(map)
    }

    /// Deletes a transport option.
    #[must_use]
    pub fn remove_option(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.option_values.push(OptionFragment::Delete(key.to_string()));
        next
    }

    /// Appends representations to the accepts list used to compute the
    /// Accept header. Defaults to json then xml when never called.
    #[must_use]
    pub fn accepts(&self, representations: &[Representation]) -> Self {
        let mut next = self.clone();
        next.accept_values.extend_from_slice(representations);
        next
    }

    /// Chooses the encoder for request bodies. Also drives the computed
    /// Content-Type header.
    #[must_use]
    pub fn encoder(&self, representation: Representation) -> Self {
        self.encoder_custom(CodecReflection::of(representation))
    }

    /// Chooses the encoder by a path-like search term (e.g. `"json"` or
    /// `"record.xml"`).
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Codec`] when no representation matches.
    pub fn encoder_for(&self, search: &str) -> Result<Self, RestError> {
        Representation::for_search(search)
            .map(|representation| self.encoder(representation))
            .ok_or_else(|| RestError::Codec(format!("unknown representation: {search:?}")))
    }

    /// Chooses a fully custom encoder reflection.
    #[must_use]
    pub fn encoder_custom(&self, reflection: CodecReflection) -> Self {
        let mut next = self.clone();
        next.encoder_value = Some(reflection);
        next
    }

    /// Appends decoder candidates consulted against the response
    /// Content-Type. Defaults to url-encoded, xml, json when never called.
    #[must_use]
    pub fn decoders(&self, representations: &[Representation]) -> Self {
        let mut next = self.clone();
        next.decoder_values
            .extend(representations.iter().map(|r| CodecReflection::of(*r)));
        next
    }

    /// Appends a custom decoder reflection.
    #[must_use]
    pub fn decoder_custom(&self, reflection: CodecReflection) -> Self {
        let mut next = self.clone();
        next.decoder_values.push(reflection);
        next
    }

    /// Discards all declared decoders, restoring the default set.
    #[must_use]
    pub fn reset_decoders(&self) -> Self {
        let mut next = self.clone();
        next.decoder_values.clear();
        next
    }

    /// Finalizes the verb, validating it against the known verb set and
    /// the configured allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::InvalidOperation`] when no verb was selected,
    /// the verb is unknown, or it is not allowed by `config`.
    pub(crate) fn build_verb(&self, config: &RestConfig) -> Result<Verb, RestError> {
        let name = self
            .method_value
            .as_deref()
            .ok_or_else(|| RestError::InvalidOperation("no HTTP method specified".to_string()))?;
        let verb = Verb::parse(name).ok_or_else(|| {
            RestError::InvalidOperation(format!(
                "unsupported HTTP method: {}",
                name.to_ascii_uppercase()
            ))
        })?;
        if !config.method_allowed(name) {
            return Err(RestError::InvalidOperation(format!(
                "disallowed HTTP method: {}",
                name.to_ascii_uppercase()
            )));
        }
        Ok(verb)
    }

    /// Builds the final header mapping: the parent chain's headers, then
    /// this resource's computed Content-Type and Accept, then the
    /// accumulated merge/delete fragments. Keys are lowercased.
    pub(crate) fn build_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self
            .parent
            .as_ref()
            .map(|p| p.build_headers())
            .unwrap_or_default();
        if let Some(encoder) = &self.encoder_value {
            headers.insert("content-type".to_string(), encoder.default_type.clone());
        }
        headers.insert("accept".to_string(), self.build_accept());
        for fragment in &self.header_values {
            match fragment {
                HeaderFragment::Merge(map) => {
                    for (key, value) in map {
                        headers.insert(key.to_ascii_lowercase(), value.clone());
                    }
                }
                HeaderFragment::Delete(key) => {
                    headers.remove(&key.to_ascii_lowercase());
                }
            }
        }
        headers
    }

    /// Builds the transport options by deep-merging fragments over `base`
    /// in order, with bare-key fragments deleting.
    pub(crate) fn build_options(&self, base: Map<String, Value>) -> Map<String, Value> {
        let mut options = self
            .parent
            .as_ref()
            .map_or(base.clone(), |p| p.build_options(base));
        for fragment in &self.option_values {
            match fragment {
                OptionFragment::Merge(map) => deep_merge(&mut options, map),
                OptionFragment::Delete(key) => {
                    options.remove(key);
                }
            }
        }
        options
    }

    fn build_accept(&self) -> String {
        let representations: Vec<Representation> = if self.accept_values.is_empty() {
            DEFAULT_ACCEPTS.to_vec()
        } else {
            self.accept_values.clone()
        };
        let mut parts: Vec<String> = representations
            .iter()
            .map(|r| r.default_type().to_string())
            .collect();
        parts.push("*/*;q=0.5".to_string());
        parts.join(", ")
    }
}

/// Renders a JSON value as header text: strings verbatim, anything else
/// via its JSON serialization.
fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Resource {
        Resource::new("http://example.test/").unwrap()
    }

    #[test]
    fn test_verb_parsing_and_semantics() {
        assert_eq!(Verb::parse("GeT"), Some(Verb::Get));
        assert_eq!(Verb::parse("brew"), None);
        assert!(Verb::Get.is_safe());
        assert!(!Verb::Post.is_safe());
        assert!(Verb::Put.request_has_body());
        assert!(!Verb::Get.request_has_body());
        assert!(!Verb::Head.response_has_body());
        assert!(Verb::Delete.response_has_body());
    }

    #[test]
    fn test_verb_validation_is_deferred() {
        let config = RestConfig::default();
        let speculative = base().http_method("brew");
        // Selection succeeds; preparation fails.
        assert!(matches!(
            speculative.build_verb(&config),
            Err(RestError::InvalidOperation(_))
        ));
        assert!(matches!(
            base().build_verb(&config),
            Err(RestError::InvalidOperation(_))
        ));
        assert_eq!(base().get().build_verb(&config).unwrap(), Verb::Get);
    }

    #[test]
    fn test_disallowed_verb_rejected_at_prepare() {
        let config = RestConfig {
            allowed_http_methods: ["get".to_string()].into_iter().collect(),
            ..RestConfig::default()
        };
        assert!(base().get().build_verb(&config).is_ok());
        assert!(matches!(
            base().delete().build_verb(&config),
            Err(RestError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_default_accept_header() {
        let headers = base().build_headers();
        assert_eq!(
            headers.get("accept").map(String::as_str),
            Some("application/json, application/xml, */*;q=0.5")
        );
        assert!(!headers.contains_key("content-type"));
    }

    #[test]
    fn test_content_type_follows_encoder() {
        let headers = base().encoder(Representation::Json).build_headers();
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_header_fragments_merge_and_delete() {
        let headers = base()
            .header("X-Token", "abc")
            .header("x-token", "def")
            .remove_header("Accept")
            .build_headers();
        assert_eq!(headers.get("x-token").map(String::as_str), Some("def"));
        assert!(!headers.contains_key("accept"));
    }

    #[test]
    fn test_explicit_content_type_overrides_encoder() {
        let headers = base()
            .encoder(Representation::Json)
            .header("Content-Type", "application/vnd.custom+json")
            .build_headers();
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("application/vnd.custom+json")
        );
    }

    #[test]
    fn test_options_merge_and_delete() {
        let options = base()
            .option("timeout", json!(30))
            .option("retries", json!({"max": 2, "delay": 1}))
            .option("retries", json!({"max": 5}))
            .remove_option("timeout")
            .build_options(Map::new());
        assert!(!options.contains_key("timeout"));
        assert_eq!(options["retries"], json!({"max": 5, "delay": 1}));
    }

    #[test]
    fn test_request_options_are_routed() {
        let map = json!({
            "method": "post",
            "headers": {"X-Ctx": "ops"},
            "params": {"page": 1},
            "timeout": 10,
        })
        .as_object()
        .cloned()
        .unwrap();
        let resource = base().options(map);
        assert_eq!(
            resource.build_verb(&RestConfig::default()).unwrap(),
            Verb::Post
        );
        assert_eq!(
            resource.build_headers().get("x-ctx").map(String::as_str),
            Some("ops")
        );
        assert_eq!(resource.build_query().unwrap().as_deref(), Some("page=1"));
        let options = resource.build_options(Map::new());
        assert_eq!(options.len(), 1);
        assert_eq!(options["timeout"], json!(10));
    }

    #[test]
    fn test_subresource_inherits_headers_and_options() {
        let parent = base()
            .header("X-Token", "abc")
            .option("timeout", json!(5));
        let child = Resource::subresource_of(&parent)
            .header("X-Extra", "1")
            .option("timeout", json!(9));
        let headers = child.build_headers();
        assert_eq!(headers.get("x-token").map(String::as_str), Some("abc"));
        assert_eq!(headers.get("x-extra").map(String::as_str), Some("1"));
        let options = child.build_options(Map::new());
        assert_eq!(options["timeout"], json!(9));
    }
}
