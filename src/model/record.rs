//! The entity value backing one remote record.

use std::fmt;
use std::marker::PhantomData;

use serde_json::{Map, Value};

use crate::error::ModelError;
use crate::resource::deep_merge;

use super::{value_to_param, Model};

/// One record of a remote collection.
///
/// Attributes are an ordered JSON mapping. The locally visible set and the
/// last server-confirmed set are tracked separately, so a caller can tell
/// pending assignments apart from what the remote last returned. Lifecycle
/// state rides along: a record starts as a new record until saved, a
/// destroyed record is frozen, and a read-only record rejects mutation.
pub struct Record<M: Model> {
    attributes: Map<String, Value>,
    remote_attributes: Map<String, Value>,
    new_record: bool,
    destroyed: bool,
    readonly: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Record<M> {
    /// Creates an unsaved record from locally assigned attributes.
    #[must_use]
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self {
            attributes,
            remote_attributes: Map::new(),
            new_record: true,
            destroyed: false,
            readonly: false,
            _model: PhantomData,
        }
    }

    /// Builds a persisted record from unwrapped remote data.
    ///
    /// A non-mapping payload (a bare scalar or array) is carried under a
    /// `"data"` attribute rather than rejected.
    #[must_use]
    pub fn from_remote(data: Value) -> Self {
        let remote = into_attribute_map(data);
        Self {
            attributes: remote.clone(),
            remote_attributes: remote,
            new_record: false,
            destroyed: false,
            readonly: false,
            _model: PhantomData,
        }
    }

    /// The identity value, when present and non-null.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.attributes.get(M::KEY).filter(|v| !v.is_null())
    }

    /// The identity rendered as text (path-segment form).
    #[must_use]
    pub fn id_text(&self) -> Option<String> {
        self.id().map(value_to_param)
    }

    /// Reads one attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Assigns one attribute.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ReadOnlyRecord`] on a read-only record and
    /// [`ModelError::Attributes`] on a destroyed one.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ModelError> {
        self.check_writable()?;
        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    /// Assigns a batch of attributes, left to right.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Record::set`].
    pub fn assign(&mut self, attributes: Map<String, Value>) -> Result<(), ModelError> {
        self.check_writable()?;
        for (key, value) in attributes {
            self.attributes.insert(key, value);
        }
        Ok(())
    }

    /// The locally visible attribute set.
    #[must_use]
    pub const fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// The attribute set as last confirmed by the remote.
    #[must_use]
    pub const fn remote_attributes(&self) -> &Map<String, Value> {
        &self.remote_attributes
    }

    /// The wire payload for a create or update.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    /// Whether the record has never been saved.
    #[must_use]
    pub const fn new_record(&self) -> bool {
        self.new_record
    }

    /// Whether the record has been destroyed.
    #[must_use]
    pub const fn destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether the record exists remotely: saved and not destroyed.
    #[must_use]
    pub const fn persisted(&self) -> bool {
        !self.new_record && !self.destroyed
    }

    /// Whether mutation is rejected.
    #[must_use]
    pub const fn readonly(&self) -> bool {
        self.readonly
    }

    /// Marks the record read-only.
    pub fn mark_readonly(&mut self) {
        self.readonly = true;
    }

    /// Folds unwrapped remote data into the record after a save: the
    /// remote set is replaced and its values override local ones.
    pub(crate) fn absorb_remote(&mut self, data: Option<Value>) {
        if let Some(data) = data {
            let remote = into_attribute_map(data);
            deep_merge(&mut self.attributes, &remote);
            self.remote_attributes = remote;
        }
        self.new_record = false;
    }

    /// Replaces both attribute sets wholesale (a refetch).
    pub(crate) fn replace_remote(&mut self, data: Value) {
        let remote = into_attribute_map(data);
        self.attributes = remote.clone();
        self.remote_attributes = remote;
        self.new_record = false;
    }

    /// Marks the record destroyed and freezes it.
    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
        self.readonly = true;
    }

    fn check_writable(&self) -> Result<(), ModelError> {
        if self.destroyed {
            return Err(ModelError::Attributes(format!(
                "cannot modify a destroyed {}",
                M::NAME
            )));
        }
        if self.readonly {
            return Err(ModelError::ReadOnlyRecord { model: M::NAME });
        }
        Ok(())
    }
}

fn into_attribute_map(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    }
}

impl<M: Model> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            remote_attributes: self.remote_attributes.clone(),
            new_record: self.new_record,
            destroyed: self.destroyed,
            readonly: self.readonly,
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &M::NAME)
            .field("attributes", &self.attributes)
            .field("new_record", &self.new_record)
            .field("destroyed", &self.destroyed)
            .field("readonly", &self.readonly)
            .finish()
    }
}
