//! Record-oriented access to remote collections.
//!
//! A [`ModelScope`] binds a [`Model`] type to a base resource carrying the
//! standard collection capabilities (`find_instances`, `create_instance`,
//! and an `identify` subresource with `find_instance`, `update_instance`,
//! `delete_instance`). Query methods dispatch through [`FindCriteria`] and
//! return [`Record`] values that track local versus remote attributes and
//! the new/destroyed/read-only lifecycle.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rest_record::cache::ResourceCache;
//! use rest_record::config::RestConfig;
//! use rest_record::model::{Model, ModelScope};
//! use rest_record::transport::HttpTransport;
//!
//! struct Widget;
//!
//! impl Model for Widget {
//!     const NAME: &'static str = "widget";
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new()?);
//! let cache = Arc::new(ResourceCache::new());
//! let widgets: ModelScope<Widget> = ModelScope::new(
//!     "https://shop.example.test/widgets",
//!     RestConfig::default(),
//!     transport,
//!     cache,
//! )?;
//! let widget = widgets.find_one(&serde_json::json!(42)).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod record;
mod scope;

pub use record::Record;
pub use scope::{FindCriteria, Found, ModelScope};

use serde_json::Value;

/// A remote collection's entity type: a name for errors and log events,
/// plus the attribute establishing identity.
pub trait Model: Send + Sync + 'static {
    /// The model name, used in error messages and as the per-operation
    /// log event name.
    const NAME: &'static str;

    /// The attribute that identifies a record within its collection.
    const KEY: &'static str = "id";
}

/// Strips the conventional single-key envelope from a decoded payload and
/// normalizes blank values to `None`.
///
/// A one-entry mapping whose key is not `"errors"` unwraps to its value
/// (`{"widget": {...}}` becomes `{...}`); anything blank afterwards (null,
/// false, empty text, empty collection) reads as "no data".
pub(crate) fn unwrap_remote_data(data: Option<Value>) -> Option<Value> {
    let data = match data? {
        Value::Object(map) if map.len() == 1 && !map.contains_key("errors") => map
            .into_iter()
            .next()
            .map_or(Value::Null, |(_, value)| value),
        other => other,
    };
    if is_blank(&data) {
        None
    } else {
        Some(data)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(_) => false,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Renders an identity value as a path segment / display form: strings
/// verbatim, everything else via its JSON rendering.
pub(crate) fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_removes_single_key_envelope() {
        let data = unwrap_remote_data(Some(json!({"widget": {"id": 1}})));
        assert_eq!(data, Some(json!({"id": 1})));
    }

    #[test]
    fn test_unwrap_keeps_multi_key_mappings() {
        let data = unwrap_remote_data(Some(json!({"id": 1, "name": "gear"})));
        assert_eq!(data, Some(json!({"id": 1, "name": "gear"})));
    }

    #[test]
    fn test_unwrap_keeps_errors_envelope() {
        let data = unwrap_remote_data(Some(json!({"errors": ["name is blank"]})));
        assert_eq!(data, Some(json!({"errors": ["name is blank"]})));
    }

    #[test]
    fn test_unwrap_blank_values_read_as_absent() {
        assert_eq!(unwrap_remote_data(None), None);
        assert_eq!(unwrap_remote_data(Some(json!(null))), None);
        assert_eq!(unwrap_remote_data(Some(json!(""))), None);
        assert_eq!(unwrap_remote_data(Some(json!({}))), None);
        assert_eq!(unwrap_remote_data(Some(json!({"data": []}))), None);
    }

    #[test]
    fn test_value_to_param_renders_identities() {
        assert_eq!(value_to_param(&json!("abc")), "abc");
        assert_eq!(value_to_param(&json!(42)), "42");
        assert_eq!(value_to_param(&json!(true)), "true");
    }
}
