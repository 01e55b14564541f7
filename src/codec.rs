//! Codec registry: representation types and their encode/decode pairs.
//!
//! A [`Representation`] is a symbolic wire format name (json, xml,
//! url_encoded). Each resolves to a [`CodecReflection`] carrying its MIME
//! type set, default type, and a [`Coder`] that converts between
//! [`serde_json::Value`] and wire text. Response Content-Types are matched
//! against reflections with `type/*` wildcard support.
//!
//! # Example
//!
//! ```rust
//! use rest_record::codec::{CodecReflection, Representation};
//! use serde_json::json;
//!
//! let json_codec = CodecReflection::of(Representation::Json);
//! assert!(json_codec.matches("application/json"));
//!
//! let wire = json_codec.encode(&json!({"id": 1})).unwrap();
//! assert_eq!(wire, r#"{"id":1}"#);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::RestError;

/// Decoders consulted when a resource declares none.
pub const DEFAULT_DECODERS: [Representation; 3] = [
    Representation::UrlEncoded,
    Representation::Xml,
    Representation::Json,
];

/// Accept-header representations used when none are declared.
pub const DEFAULT_ACCEPTS: [Representation; 2] = [Representation::Json, Representation::Xml];

/// A symbolic wire representation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// JSON (`application/json`).
    Json,
    /// XML (`application/xml`, `text/xml`).
    Xml,
    /// URL form encoding (`application/x-www-form-urlencoded`).
    UrlEncoded,
}

impl Representation {
    /// The symbolic name of this representation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::UrlEncoded => "url_encoded",
        }
    }

    /// The registered MIME type set, primary first.
    #[must_use]
    pub const fn types(self) -> &'static [&'static str] {
        match self {
            Self::Json => &["application/json", "text/json"],
            Self::Xml => &["application/xml", "text/xml"],
            Self::UrlEncoded => &["application/x-www-form-urlencoded"],
        }
    }

    /// The default (primary) MIME type.
    #[must_use]
    pub const fn default_type(self) -> &'static str {
        self.types()[0]
    }

    /// Looks a representation up by symbol name or by the trailing
    /// path-like suffix of a string (`"record.json"` resolves to json).
    #[must_use]
    pub fn for_search(search: &str) -> Option<Self> {
        let suffix = search.rsplit('.').next().unwrap_or(search);
        match suffix {
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            "url_encoded" | "urlencoded" => Some(Self::UrlEncoded),
            _ => None,
        }
    }

    fn coder(self) -> Arc<dyn Coder> {
        match self {
            Self::Json => Arc::new(JsonCoder),
            Self::Xml => Arc::new(XmlCoder),
            Self::UrlEncoded => Arc::new(UrlEncodedCoder),
        }
    }
}

/// An encode/decode pair for one wire representation.
pub trait Coder: Send + Sync {
    /// Encodes a structured value into wire text.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Codec`] when the value cannot be represented.
    fn encode(&self, value: &Value) -> Result<String, RestError>;

    /// Decodes wire text into a structured value.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Codec`] when the text is malformed.
    fn decode(&self, text: &str) -> Result<Value, RestError>;
}

/// A resolved representation: name, MIME type set, default type, coder.
#[derive(Clone)]
pub struct CodecReflection {
    /// The symbolic name.
    pub name: String,
    /// Registered MIME types, primary first.
    pub types: Vec<String>,
    /// The default MIME type, used for Content-Type injection.
    pub default_type: String,
    coder: Arc<dyn Coder>,
}

impl fmt::Debug for CodecReflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecReflection")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("default_type", &self.default_type)
            .finish_non_exhaustive()
    }
}

impl CodecReflection {
    /// Resolves a built-in representation.
    #[must_use]
    pub fn of(representation: Representation) -> Self {
        Self {
            name: representation.name().to_string(),
            types: representation
                .types()
                .iter()
                .map(ToString::to_string)
                .collect(),
            default_type: representation.default_type().to_string(),
            coder: representation.coder(),
        }
    }

    /// Registers a custom representation under a name and MIME type set.
    ///
    /// # Panics
    ///
    /// Panics if `types` is empty.
    #[must_use]
    pub fn custom(name: impl Into<String>, types: Vec<String>, coder: Arc<dyn Coder>) -> Self {
        let default_type = types.first().expect("at least one MIME type").clone();
        Self {
            name: name.into(),
            types,
            default_type,
            coder,
        }
    }

    /// Checks whether any registered type matches the given wire MIME
    /// type, honoring `type/*` patterns on either side.
    #[must_use]
    pub fn matches(&self, mime_type: &str) -> bool {
        self.types.iter().any(|t| mime_like(t, mime_type))
    }

    /// Encodes through this reflection's coder.
    ///
    /// # Errors
    ///
    /// See [`Coder::encode`].
    pub fn encode(&self, value: &Value) -> Result<String, RestError> {
        self.coder.encode(value)
    }

    /// Decodes through this reflection's coder.
    ///
    /// # Errors
    ///
    /// See [`Coder::decode`].
    pub fn decode(&self, text: &str) -> Result<Value, RestError> {
        self.coder.decode(text)
    }
}

/// MIME pattern match: exact, or wildcard subtype on either operand.
fn mime_like(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (a.parse::<mime::Mime>(), b.parse::<mime::Mime>()) else {
        return false;
    };
    let type_match = a.type_() == mime::STAR || b.type_() == mime::STAR || a.type_() == b.type_();
    let subtype_match =
        a.subtype() == mime::STAR || b.subtype() == mime::STAR || a.subtype() == b.subtype();
    type_match && subtype_match
}

/// JSON coder backed by `serde_json`.
#[derive(Debug)]
pub struct JsonCoder;

impl Coder for JsonCoder {
    fn encode(&self, value: &Value) -> Result<String, RestError> {
        serde_json::to_string(value).map_err(|e| RestError::Codec(e.to_string()))
    }

    fn decode(&self, text: &str) -> Result<Value, RestError> {
        serde_json::from_str(text).map_err(|e| RestError::Codec(e.to_string()))
    }
}

/// URL form encoding coder.
///
/// Encoding flattens nested maps into bracketed keys (`a[b]=1`) and arrays
/// into repeated `key[]` pairs. Bare scalars fall back to their string
/// conversion; booleans and null encode as the literals `true`/`false` and
/// the empty string. Decoding reverses the bracket convention.
#[derive(Debug)]
pub struct UrlEncodedCoder;

impl Coder for UrlEncodedCoder {
    fn encode(&self, value: &Value) -> Result<String, RestError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Object(map) => {
                let mut pairs = Vec::new();
                for (key, value) in map {
                    flatten_pairs(key, value, &mut pairs);
                }
                serde_urlencoded::to_string(&pairs).map_err(|e| RestError::Codec(e.to_string()))
            }
            other => Ok(scalar_text(other)),
        }
    }

    fn decode(&self, text: &str) -> Result<Value, RestError> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(text).map_err(|e| RestError::Codec(e.to_string()))?;
        let mut root = Map::new();
        for (key, value) in pairs {
            insert_nested(&mut root, &key, value);
        }
        Ok(Value::Object(root))
    }
}

/// Renders a scalar the way it appears in a query string.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flattens one (key, value) into bracketed form pairs.
fn flatten_pairs(key: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (inner_key, inner) in map {
                flatten_pairs(&format!("{key}[{inner_key}]"), inner, pairs);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_pairs(&format!("{key}[]"), item, pairs);
            }
        }
        scalar => pairs.push((key.to_string(), scalar_text(scalar))),
    }
}

/// Reassembles a bracketed key (`a[b][]`) into the nested map.
fn insert_nested(root: &mut Map<String, Value>, key: &str, value: String) {
    let Some(open) = key.find('[') else {
        root.insert(key.to_string(), Value::String(value));
        return;
    };

    let (head, rest) = key.split_at(open);
    // rest looks like "[b][]..." — take the first bracketed segment.
    let Some(close) = rest.find(']') else {
        root.insert(key.to_string(), Value::String(value));
        return;
    };
    let segment = &rest[1..close];
    let remainder = &rest[close + 1..];

    if segment.is_empty() {
        // "a[]" — append to an array.
        let entry = root
            .entry(head.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::String(value));
        }
    } else {
        let entry = root
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(inner) = entry {
            let nested_key = format!("{segment}{remainder}");
            insert_nested(inner, &nested_key, value);
        }
    }
}

/// XML coder backed by `quick-xml`.
///
/// Encoding renders a map as an element tree; a single-key map supplies
/// the document root, anything else is wrapped in `<hash>`. Decoding
/// produces a map keyed by element names, with repeated siblings promoted
/// to arrays and text-only elements becoming string leaves.
#[derive(Debug)]
pub struct XmlCoder;

impl Coder for XmlCoder {
    fn encode(&self, value: &Value) -> Result<String, RestError> {
        let mut out = String::new();
        match value {
            Value::Object(map) if map.len() == 1 => {
                let (root, inner) = map.iter().next().ok_or_else(|| {
                    RestError::Codec("empty XML document".to_string())
                })?;
                write_element(&mut out, root, inner);
            }
            other => write_element(&mut out, "hash", other),
        }
        Ok(out)
    }

    fn decode(&self, text: &str) -> Result<Value, RestError> {
        use quick_xml::events::Event;

        let mut reader = quick_xml::Reader::from_str(text);
        reader.config_mut().trim_text(true);

        // Stack of (element name, children-so-far, text-so-far).
        let mut stack: Vec<(String, Map<String, Value>, String)> = Vec::new();
        let mut root = Map::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    stack.push((name, Map::new(), String::new()));
                }
                Ok(Event::Empty(start)) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    let parent = stack.last_mut().map(|(_, children, _)| children);
                    insert_child(parent.unwrap_or(&mut root), &name, Value::Null);
                }
                Ok(Event::Text(text)) => {
                    if let Some((_, _, buffer)) = stack.last_mut() {
                        let decoded = text
                            .unescape()
                            .map_err(|e| RestError::Codec(e.to_string()))?;
                        buffer.push_str(&decoded);
                    }
                }
                Ok(Event::End(_)) => {
                    let (name, children, text) = stack
                        .pop()
                        .ok_or_else(|| RestError::Codec("unbalanced XML".to_string()))?;
                    let value = if children.is_empty() {
                        if text.is_empty() {
                            Value::Null
                        } else {
                            Value::String(text)
                        }
                    } else {
                        Value::Object(children)
                    };
                    let parent = stack.last_mut().map(|(_, children, _)| children);
                    insert_child(parent.unwrap_or(&mut root), &name, value);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RestError::Codec(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(RestError::Codec("unbalanced XML".to_string()));
        }
        Ok(Value::Object(root))
    }
}

/// Inserts a decoded child, promoting repeated siblings to an array.
fn insert_child(parent: &mut Map<String, Value>, name: &str, value: Value) {
    match parent.get_mut(name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(name.to_string(), value);
        }
    }
}

/// Writes one element (recursively) with escaped text content.
fn write_element(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Null => {
            out.push_str(&format!("<{name}/>"));
        }
        Value::Object(map) => {
            out.push_str(&format!("<{name}>"));
            for (key, inner) in map {
                write_element(out, key, inner);
            }
            out.push_str(&format!("</{name}>"));
        }
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item);
            }
        }
        scalar => {
            let text = scalar_text(scalar);
            let escaped = quick_xml::escape::escape(text.as_str());
            out.push_str(&format!("<{name}>{escaped}</{name}>"));
        }
    }
}
