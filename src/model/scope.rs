//! Collection-level query and persistence operations.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::adapter::ResourceAdapter;
use crate::cache::ResourceCache;
use crate::codec::Representation;
use crate::config::RestConfig;
use crate::error::{ModelError, RestError};
use crate::handler::OperationResult;
use crate::resource::{Declarations, OperationCall, Resource};
use crate::transport::{Response, Transport};

use super::cache::RecordCache;
use super::{unwrap_remote_data, value_to_param, Model, Record};

/// The shape of a `find` request.
#[derive(Debug, Clone)]
pub enum FindCriteria {
    /// Every record in the collection.
    All,
    /// The first record of the collection, if any.
    First,
    /// One record by identity; missing is an error.
    One(Value),
    /// A batch of identities; a single id behaves like [`FindCriteria::One`].
    Ids(Vec<Value>),
    /// The collection filtered by query conditions.
    Filter(Map<String, Value>),
}

/// What a `find` dispatch produced, shaped by its criteria.
pub enum Found<M: Model> {
    /// A collection result.
    Many(Vec<Record<M>>),
    /// An optional single result (`First`).
    Maybe(Option<Record<M>>),
    /// A required single result.
    One(Record<M>),
}

impl<M: Model> fmt::Debug for Found<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Many(records) => f.debug_tuple("Many").field(records).finish(),
            Self::Maybe(record) => f.debug_tuple("Maybe").field(record).finish(),
            Self::One(record) => f.debug_tuple("One").field(record).finish(),
        }
    }
}

/// The access point for one remote collection.
///
/// Owns the collection's base resource with the standard capabilities
/// declared on it, the resolved configuration, and the transport and cache
/// handles every operation runs against. All methods take `&self`; record
/// state lives on the [`Record`] values passed in and out.
pub struct ModelScope<M: Model> {
    base: Resource,
    config: RestConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<ResourceCache>,
    records: RecordCache<M>,
}

impl<M: Model> ModelScope<M> {
    /// Binds the model to a collection URL. Payloads are JSON-encoded;
    /// start from [`ModelScope::from_resource`] to choose another codec.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Rest`] when the URL cannot be parsed.
    pub fn new(
        url: &str,
        config: RestConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<ResourceCache>,
    ) -> Result<Self, ModelError> {
        let base = Resource::new(url)?.encoder(Representation::Json);
        Self::from_resource(base, config, transport, cache)
    }

    /// Binds the model to an already-shaped base resource (custom headers,
    /// auth, encoder choice).
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Rest`] when the standard capability names
    /// collide with declarations already present on the base.
    pub fn from_resource(
        base: Resource,
        config: RestConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<ResourceCache>,
    ) -> Result<Self, ModelError> {
        let base = base.declare(collection_declarations()?)?;
        Ok(Self {
            base,
            config,
            transport,
            cache,
            records: RecordCache::new(),
        })
    }

    /// The declared base resource.
    #[must_use]
    pub const fn resource(&self) -> &Resource {
        &self.base
    }

    /// Installs the collection snapshot cache: unfiltered reads populate
    /// an identity-keyed map served until the response's freshness window
    /// lapses. Cached records come back read-only.
    pub fn cache_all(&self) {
        self.records.install();
    }

    /// Uninstalls the snapshot cache and drops its contents.
    pub fn uncache_all(&self) {
        self.records.uninstall();
    }

    /// Dispatches a query by criteria shape.
    ///
    /// # Errors
    ///
    /// [`ModelError::RecordNotFound`] from the single-record paths, plus
    /// anything the underlying find methods raise.
    pub async fn find(&self, criteria: FindCriteria) -> Result<Found<M>, ModelError> {
        match criteria {
            FindCriteria::All => Ok(Found::Many(self.find_all(None).await?)),
            FindCriteria::First => Ok(Found::Maybe(self.find_first(None).await?)),
            FindCriteria::Filter(conditions) => {
                Ok(Found::Many(self.find_all(Some(conditions)).await?))
            }
            FindCriteria::One(id) => Ok(Found::One(self.find_one(&id).await?)),
            FindCriteria::Ids(ids) => match ids.as_slice() {
                [] => Ok(Found::Many(Vec::new())),
                [id] => Ok(Found::One(self.find_one(id).await?)),
                _ => Ok(Found::Many(self.find_some(&ids).await?)),
            },
        }
    }

    /// Fetches the collection, optionally filtered by query conditions.
    ///
    /// An unfiltered read consults the snapshot cache when installed, and
    /// repopulates it from the response.
    ///
    /// # Errors
    ///
    /// [`RestError::InvalidRepresentation`] when the decoded payload is
    /// not a collection, plus pipeline errors.
    pub async fn find_all(
        &self,
        conditions: Option<Map<String, Value>>,
    ) -> Result<Vec<Record<M>>, ModelError> {
        let unfiltered = conditions.is_none();
        if unfiltered {
            if let Some(all) = self.records.fresh_all() {
                return Ok(all);
            }
        }

        let args: Vec<Value> = conditions.map(Value::Object).into_iter().collect();
        let result = self.perform_collection("find_instances", &args).await?;
        let records = collection_records::<M>(result.payload.clone())?;

        if unfiltered && self.records.installed() {
            let deadline = result
                .response
                .as_ref()
                .map_or_else(Utc::now, Response::freshness_deadline);
            self.records.fill(&records, deadline);
        }
        Ok(records)
    }

    /// The first record of the (optionally filtered) collection.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ModelScope::find_all`].
    pub async fn find_first(
        &self,
        conditions: Option<Map<String, Value>>,
    ) -> Result<Option<Record<M>>, ModelError> {
        Ok(self.find_all(conditions).await?.into_iter().next())
    }

    /// One record by identity.
    ///
    /// # Errors
    ///
    /// [`ModelError::RecordNotFound`] when the remote has no such record.
    pub async fn find_one(&self, id: &Value) -> Result<Record<M>, ModelError> {
        self.find_by_identity(id)
            .await?
            .ok_or_else(|| ModelError::RecordNotFound {
                model: M::NAME,
                key: M::KEY,
                id: value_to_param(id),
            })
    }

    /// One record by identity, where "not found" is an answer: a 404 from
    /// the remote surfaces as `None` rather than an error.
    ///
    /// # Errors
    ///
    /// Pipeline errors other than a 404 response.
    pub async fn find_by_identity(&self, id: &Value) -> Result<Option<Record<M>>, ModelError> {
        if let Some(answer) = self.records.fresh_one(&value_to_param(id)) {
            return Ok(answer);
        }
        let result = match self.perform_identified(id, "find_instance", &[]).await {
            Ok(result) => result,
            Err(error) if error.status() == Some(404) => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        Ok(unwrap_remote_data(result.payload).map(Record::from_remote))
    }

    /// A batch of records by identity.
    ///
    /// # Errors
    ///
    /// [`ModelError::RecordNotFound`] unless every requested id resolved;
    /// the error carries the missing ids joined together.
    pub async fn find_some(&self, ids: &[Value]) -> Result<Vec<Record<M>>, ModelError> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.find_by_identity(id).await? {
                Some(record) => found.push(record),
                None => missing.push(value_to_param(id)),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(ModelError::RecordNotFound {
                model: M::NAME,
                key: M::KEY,
                id: missing.join(", "),
            })
        }
    }

    /// Builds a record from attributes and saves it. The returned record's
    /// [`Record::persisted`] flag tells whether the remote accepted it.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ModelScope::save`].
    pub async fn create(&self, attributes: Map<String, Value>) -> Result<Record<M>, ModelError> {
        let mut record = Record::new(attributes);
        self.save(&mut record).await?;
        Ok(record)
    }

    /// Creates or updates the record, returning `false` when the remote
    /// rejected it (a client-error response) rather than raising.
    ///
    /// On success the response data is folded back into the record, so a
    /// server-assigned identity becomes visible.
    ///
    /// # Errors
    ///
    /// [`ModelError::ReadOnlyRecord`] and [`ModelError::Attributes`] for a
    /// record that cannot be written; server and connection errors
    /// propagate.
    pub async fn save(&self, record: &mut Record<M>) -> Result<bool, ModelError> {
        if record.destroyed() {
            return Err(ModelError::Attributes(format!(
                "cannot save a destroyed {}",
                M::NAME
            )));
        }
        if record.readonly() {
            return Err(ModelError::ReadOnlyRecord { model: M::NAME });
        }

        let payload = record.to_payload();
        let outcome = if record.new_record() {
            self.perform_collection("create_instance", &[payload]).await
        } else {
            let id = self.identity_of(record)?;
            self.perform_identified(&id, "update_instance", &[payload])
                .await
        };
        match outcome {
            Ok(result) => {
                record.absorb_remote(unwrap_remote_data(result.payload));
                self.records.invalidate();
                Ok(true)
            }
            Err(error) if is_rejection(&error) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    /// Like [`ModelScope::save`], but a rejected save is an error.
    ///
    /// # Errors
    ///
    /// [`ModelError::RecordNotSaved`] when the remote rejected the record.
    pub async fn save_strict(&self, record: &mut Record<M>) -> Result<(), ModelError> {
        if self.save(record).await? {
            Ok(())
        } else {
            Err(ModelError::RecordNotSaved { model: M::NAME })
        }
    }

    /// Deletes the record remotely, then marks it destroyed and frozen.
    ///
    /// # Errors
    ///
    /// [`ModelError::ReadOnlyRecord`] on a read-only record and
    /// [`ModelError::RecordNotDestroyed`] on one that was never persisted.
    pub async fn destroy(&self, record: &mut Record<M>) -> Result<(), ModelError> {
        if record.readonly() {
            return Err(ModelError::ReadOnlyRecord { model: M::NAME });
        }
        if !record.persisted() {
            return Err(ModelError::RecordNotDestroyed { model: M::NAME });
        }
        let id = self.identity_of(record)?;
        self.perform_identified(&id, "delete_instance", &[])
            .await
            .map_err(ModelError::from)?;
        record.mark_destroyed();
        self.records.invalidate();
        Ok(())
    }

    /// Deletes by identity without materializing a record.
    ///
    /// # Errors
    ///
    /// Pipeline errors from the delete operation.
    pub async fn delete(&self, id: &Value) -> Result<(), ModelError> {
        self.perform_identified(id, "delete_instance", &[])
            .await
            .map_err(ModelError::from)?;
        self.records.invalidate();
        Ok(())
    }

    /// Refetches the record, replacing its attributes wholesale.
    ///
    /// # Errors
    ///
    /// [`ModelError::RecordNotFound`] when the record no longer exists
    /// remotely; [`ModelError::Attributes`] when it carries no identity.
    pub async fn reload(&self, record: &mut Record<M>) -> Result<(), ModelError> {
        let id = self.identity_of(record)?;
        match self.find_by_identity(&id).await? {
            Some(fresh) => {
                record.replace_remote(Value::Object(fresh.attributes().clone()));
                Ok(())
            }
            None => Err(ModelError::RecordNotFound {
                model: M::NAME,
                key: M::KEY,
                id: value_to_param(&id),
            }),
        }
    }

    /// Assigns a batch of attributes and saves.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Record::assign`] and [`ModelScope::save`].
    pub async fn update(
        &self,
        record: &mut Record<M>,
        attributes: Map<String, Value>,
    ) -> Result<bool, ModelError> {
        record.assign(attributes)?;
        self.save(record).await
    }

    /// Assigns one attribute and saves.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Record::set`] and [`ModelScope::save`].
    pub async fn update_attribute(
        &self,
        record: &mut Record<M>,
        key: &str,
        value: Value,
    ) -> Result<bool, ModelError> {
        record.set(key, value)?;
        self.save(record).await
    }

    async fn perform(&self, call: OperationCall) -> Result<OperationResult, RestError> {
        let mut adapter = ResourceAdapter::new(
            call.resource,
            &self.config,
            self.transport.as_ref(),
            &self.cache,
        )
        .with_event_name(M::NAME);
        adapter.call(call.payload).await
    }

    async fn perform_collection(
        &self,
        name: &str,
        args: &[Value],
    ) -> Result<OperationResult, RestError> {
        let call = self.base.operation_call(name, args)?;
        self.perform(call).await
    }

    async fn perform_identified(
        &self,
        id: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<OperationResult, RestError> {
        let scoped = self
            .base
            .subresource("identify", std::slice::from_ref(id))?;
        let call = scoped.operation_call(name, args)?;
        self.perform(call).await
    }

    fn identity_of(&self, record: &Record<M>) -> Result<Value, ModelError> {
        record.id().cloned().ok_or_else(|| {
            ModelError::Attributes(format!(
                "a persisted {} is missing its {} attribute",
                M::NAME,
                M::KEY
            ))
        })
    }
}

impl<M: Model> fmt::Debug for ModelScope<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelScope")
            .field("model", &M::NAME)
            .field("base", &self.base)
            .field("records", &self.records)
            .finish()
    }
}

/// The standard collection capabilities: `find_instances` (GET),
/// `create_instance` (POST), and an `identify(id)` subresource carrying
/// `find_instance` (GET), `update_instance` (PUT), `delete_instance`
/// (DELETE).
fn collection_declarations() -> Result<Declarations, RestError> {
    let identified = Declarations::new()
        .operation(
            "find_instance",
            Arc::new(|resource, args| {
                Ok(OperationCall {
                    resource: with_conditions(resource.get(), args)?,
                    payload: None,
                })
            }),
        )?
        .operation(
            "update_instance",
            Arc::new(|resource, args| {
                Ok(OperationCall {
                    resource: resource.put(),
                    payload: args.first().cloned(),
                })
            }),
        )?
        .operation(
            "delete_instance",
            Arc::new(|resource, args| {
                Ok(OperationCall {
                    resource: with_conditions(resource.delete(), args)?,
                    payload: None,
                })
            }),
        )?;

    Declarations::new()
        .operation(
            "find_instances",
            Arc::new(|resource, args| {
                Ok(OperationCall {
                    resource: with_conditions(resource.get(), args)?,
                    payload: None,
                })
            }),
        )?
        .operation(
            "create_instance",
            Arc::new(|resource, args| {
                Ok(OperationCall {
                    resource: resource.post(),
                    payload: args.first().cloned(),
                })
            }),
        )?
        .subresource(
            "identify",
            Arc::new(|resource, args| {
                let id = args.first().filter(|v| !v.is_null()).ok_or_else(|| {
                    RestError::InvalidOperation("identify requires an identity value".to_string())
                })?;
                Ok(resource.path(&value_to_param(id)))
            }),
            Some(identified),
        )
}

/// Merges optional query conditions into the operation's resource.
fn with_conditions(resource: Resource, args: &[Value]) -> Result<Resource, RestError> {
    match args.first() {
        None | Some(Value::Null) => Ok(resource),
        Some(Value::Object(conditions)) => Ok(resource.query_map(conditions.clone())),
        Some(other) => Err(RestError::InvalidOperation(format!(
            "query conditions must be a mapping, got {other}"
        ))),
    }
}

fn collection_records<M: Model>(payload: Option<Value>) -> Result<Vec<Record<M>>, ModelError> {
    match unwrap_remote_data(payload) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.into_iter().map(Record::from_remote).collect()),
        Some(other) => Err(RestError::InvalidRepresentation(format!(
            "expected a collection of {} records, got {}",
            M::NAME,
            json_kind(&other)
        ))
        .into()),
    }
}

fn is_rejection(error: &RestError) -> bool {
    error
        .status()
        .is_some_and(|status| (400..500).contains(&status))
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, TransportRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Widget;

    impl Model for Widget {
        const NAME: &'static str = "widget";
    }

    /// Routes requests by `(verb, path)`, recording each one.
    #[derive(Debug, Default)]
    struct RoutedTransport {
        routes: Vec<(&'static str, &'static str, u16, &'static str)>,
        seen: Mutex<Vec<(String, String, Option<String>)>>,
        calls: AtomicUsize,
    }

    impl RoutedTransport {
        fn with_routes(routes: Vec<(&'static str, &'static str, u16, &'static str)>) -> Self {
            Self {
                routes,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<(String, String, Option<String>)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RoutedTransport {
        async fn perform(&self, request: &TransportRequest) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                request.verb.to_string(),
                request.url.clone(),
                request.body.clone(),
            ));
            for (verb, url, status, body) in &self.routes {
                if request.verb.as_str() == *verb && request.url == *url {
                    let headers = vec![(
                        "Content-Type".to_string(),
                        "application/json".to_string(),
                    )];
                    return Ok(Response::new(*status, headers, (*body).to_string()));
                }
            }
            Ok(Response::new(404, Vec::new(), String::new()))
        }
    }

    fn scope_over(transport: Arc<RoutedTransport>) -> ModelScope<Widget> {
        ModelScope::new(
            "http://shop.test/widgets",
            RestConfig::default(),
            transport,
            Arc::new(ResourceCache::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_all_builds_records_from_collection() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "GET",
            "http://shop.test/widgets",
            200,
            r#"{"widgets":[{"id":1,"name":"gear"},{"id":2,"name":"sprocket"}]}"#,
        )]));
        let scope = scope_over(Arc::clone(&transport));

        let all = scope.find_all(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(Record::persisted));
        assert_eq!(all[0].get("name"), Some(&json!("gear")));
    }

    #[tokio::test]
    async fn test_find_all_rejects_non_collection_payload() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "GET",
            "http://shop.test/widgets",
            200,
            r#"{"widget":{"id":1}}"#,
        )]));
        let scope = scope_over(transport);

        let error = scope.find_all(None).await.unwrap_err();
        assert!(matches!(
            error,
            ModelError::Rest(RestError::InvalidRepresentation(_))
        ));
    }

    #[tokio::test]
    async fn test_find_filter_merges_query_conditions() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "GET",
            "http://shop.test/widgets?active=true",
            200,
            r#"{"widgets":[{"id":1}]}"#,
        )]));
        let scope = scope_over(Arc::clone(&transport));

        let conditions = match json!({"active": true}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let found = scope.find(FindCriteria::Filter(conditions)).await.unwrap();
        assert!(matches!(found, Found::Many(records) if records.len() == 1));
        assert_eq!(transport.seen()[0].1, "http://shop.test/widgets?active=true");
    }

    #[tokio::test]
    async fn test_find_one_unwraps_singular_envelope() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "GET",
            "http://shop.test/widgets/42",
            200,
            r#"{"widget":{"id":42,"name":"gear"}}"#,
        )]));
        let scope = scope_over(transport);

        let record = scope.find_one(&json!(42)).await.unwrap();
        assert_eq!(record.id(), Some(&json!(42)));
        assert_eq!(record.get("name"), Some(&json!("gear")));
    }

    #[tokio::test]
    async fn test_find_one_missing_raises_record_not_found() {
        let transport = Arc::new(RoutedTransport::default());
        let scope = scope_over(transport);

        let error = scope.find_one(&json!(7)).await.unwrap_err();
        assert!(matches!(
            error,
            ModelError::RecordNotFound {
                model: "widget",
                key: "id",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_find_by_identity_swallows_404() {
        let transport = Arc::new(RoutedTransport::default());
        let scope = scope_over(transport);

        let found = scope.find_by_identity(&json!(7)).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_single_id_batch_unwraps_to_one() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "GET",
            "http://shop.test/widgets/5",
            200,
            r#"{"widget":{"id":5}}"#,
        )]));
        let scope = scope_over(transport);

        let found = scope.find(FindCriteria::Ids(vec![json!(5)])).await.unwrap();
        assert!(matches!(found, Found::One(_)));
    }

    #[tokio::test]
    async fn test_find_some_reports_every_missing_id() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "GET",
            "http://shop.test/widgets/1",
            200,
            r#"{"widget":{"id":1}}"#,
        )]));
        let scope = scope_over(transport);

        let error = scope
            .find_some(&[json!(1), json!(2), json!(3)])
            .await
            .unwrap_err();
        match error {
            ModelError::RecordNotFound { id, .. } => assert_eq!(id, "2, 3"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_posts_and_absorbs_server_identity() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "POST",
            "http://shop.test/widgets",
            201,
            r#"{"widget":{"id":9,"name":"gear"}}"#,
        )]));
        let scope = scope_over(Arc::clone(&transport));

        let attributes = match json!({"name": "gear"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let record = scope.create(attributes).await.unwrap();
        assert!(record.persisted());
        assert_eq!(record.id(), Some(&json!(9)));

        let seen = transport.seen();
        assert_eq!(seen[0].0, "POST");
        assert_eq!(seen[0].2.as_deref(), Some(r#"{"name":"gear"}"#));
    }

    #[tokio::test]
    async fn test_save_returns_false_on_client_rejection() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "POST",
            "http://shop.test/widgets",
            422,
            r#"{"errors":["name is blank"]}"#,
        )]));
        let scope = scope_over(transport);

        let mut record: Record<Widget> = Record::new(Map::new());
        let saved = scope.save(&mut record).await.unwrap();
        assert!(!saved);
        assert!(record.new_record());
    }

    #[tokio::test]
    async fn test_save_strict_raises_record_not_saved() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "POST",
            "http://shop.test/widgets",
            422,
            "{}",
        )]));
        let scope = scope_over(transport);

        let mut record: Record<Widget> = Record::new(Map::new());
        let error = scope.save_strict(&mut record).await.unwrap_err();
        assert!(matches!(error, ModelError::RecordNotSaved { model: "widget" }));
    }

    #[tokio::test]
    async fn test_save_persisted_record_puts_to_identity_path() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "PUT",
            "http://shop.test/widgets/3",
            200,
            r#"{"widget":{"id":3,"name":"gear mk2"}}"#,
        )]));
        let scope = scope_over(Arc::clone(&transport));

        let mut record: Record<Widget> = Record::from_remote(json!({"id": 3, "name": "gear"}));
        record.set("name", json!("gear mk2")).unwrap();
        assert!(scope.save(&mut record).await.unwrap());
        assert_eq!(transport.seen()[0].0, "PUT");
        assert_eq!(record.remote_attributes().get("name"), Some(&json!("gear mk2")));
    }

    #[tokio::test]
    async fn test_destroy_deletes_then_freezes() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "DELETE",
            "http://shop.test/widgets/3",
            200,
            "{}",
        )]));
        let scope = scope_over(Arc::clone(&transport));

        let mut record: Record<Widget> = Record::from_remote(json!({"id": 3}));
        scope.destroy(&mut record).await.unwrap();
        assert!(record.destroyed());
        assert!(scope.save(&mut record).await.is_err());
        assert_eq!(transport.seen()[0].0, "DELETE");
    }

    #[tokio::test]
    async fn test_destroy_rejects_unsaved_record() {
        let transport = Arc::new(RoutedTransport::default());
        let scope = scope_over(transport);

        let mut record: Record<Widget> = Record::new(Map::new());
        let error = scope.destroy(&mut record).await.unwrap_err();
        assert!(matches!(
            error,
            ModelError::RecordNotDestroyed { model: "widget" }
        ));
    }

    #[tokio::test]
    async fn test_reload_replaces_local_divergence() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![(
            "GET",
            "http://shop.test/widgets/3",
            200,
            r#"{"widget":{"id":3,"name":"gear"}}"#,
        )]));
        let scope = scope_over(transport);

        let mut record: Record<Widget> = Record::from_remote(json!({"id": 3, "name": "old"}));
        record.set("name", json!("local edit")).unwrap();
        scope.reload(&mut record).await.unwrap();
        assert_eq!(record.get("name"), Some(&json!("gear")));
    }

    #[tokio::test]
    async fn test_snapshot_without_freshness_window_rereads_remotely() {
        let transport = Arc::new(RoutedTransport::with_routes(vec![
            (
                "GET",
                "http://shop.test/widgets",
                200,
                r#"{"widgets":[{"id":1,"name":"gear"}]}"#,
            ),
        ]));
        let scope = scope_over(Arc::clone(&transport));
        scope.cache_all();

        // No Expires/max-age header on the stub response, so the snapshot
        // is immediately stale and the second read goes remote again.
        assert_eq!(scope.find_all(None).await.unwrap().len(), 1);
        assert_eq!(scope.find_all(None).await.unwrap().len(), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_cached_identity_lookup_skips_transport() {
        let transport = Arc::new(RoutedTransport {
            routes: vec![(
                "GET",
                "http://shop.test/widgets",
                200,
                r#"{"widgets":[{"id":1,"name":"gear"}]}"#,
            )],
            ..RoutedTransport::default()
        });
        let scope = scope_over(Arc::clone(&transport));
        scope.cache_all();

        // Install a fresh snapshot directly, as a max-age response would.
        let records = vec![Record::from_remote(json!({"id": 1, "name": "gear"}))];
        scope
            .records
            .fill(&records, Utc::now() + chrono::Duration::minutes(5));

        let hit = scope.find_by_identity(&json!(1)).await.unwrap().unwrap();
        assert!(hit.readonly());
        assert_eq!(transport.calls(), 0);

        let miss = scope.find_by_identity(&json!(99)).await.unwrap();
        assert!(miss.is_none());
        assert_eq!(transport.calls(), 0);
    }
}
