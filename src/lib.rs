//! # rest-record
//!
//! A remote-resource access layer: fluent copy-on-write resource builders,
//! an explicit operation pipeline over HTTP, and record-style model glue
//! for REST collections.
//!
//! ## Overview
//!
//! This crate provides:
//! - Copy-on-write endpoint descriptors via [`Resource`], with subresources
//!   that fall back to and merge with their parent
//! - Declared capabilities (named operations and subresources) compiled
//!   into a memoized lookup table per resource
//! - An operation pipeline ([`ResourceAdapter`]) driving
//!   resolve → prepare → encode → execute → decode for one call
//! - A single-attempt transport handler with transmitted/aborted/completed
//!   outcome flags and an ordered rescue chain ([`OperationHandler`])
//! - A codec registry for JSON, XML, and URL-encoded wire representations,
//!   matched by Content-Type ([`codec`])
//! - A scoped memo of safe-verb results keyed by URL and headers
//!   ([`ResourceCache`]), invalidated by any unsafe verb
//! - Record-style collection access via [`ModelScope`] and [`Record`]:
//!   find dispatch, create/save/destroy, and an optional collection
//!   snapshot cache with response-derived freshness
//!
//! ## Quick Start
//!
//! ```rust
//! use rest_record::Resource;
//!
//! // Builders never mutate their receiver.
//! let base = Resource::new("https://shop.example.test/api/")?;
//! let listing = base.path("widgets").query("page=2").get();
//!
//! assert_eq!(
//!     listing.to_url()?,
//!     "https://shop.example.test/api/widgets?page=2"
//! );
//! assert_eq!(base.to_url()?, "https://shop.example.test/api/");
//! # Ok::<(), rest_record::RestError>(())
//! ```
//!
//! ## Running an Operation
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use rest_record::{Resource, ResourceAdapter, ResourceCache, RestConfig};
//! use rest_record::transport::HttpTransport;
//!
//! let transport = HttpTransport::new()?;
//! let cache = ResourceCache::new();
//! let resource = Resource::new("https://shop.example.test/widgets/1")?.get();
//!
//! let mut adapter = ResourceAdapter::new(resource, &RestConfig::default(), &transport, &cache);
//! let result = adapter.call(None).await?;
//! println!("decoded: {:?}", result.payload);
//! ```
//!
//! ## Record-Style Models
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use rest_record::model::{Model, ModelScope};
//! use rest_record::transport::HttpTransport;
//! use rest_record::{ResourceCache, RestConfig};
//!
//! struct Widget;
//!
//! impl Model for Widget {
//!     const NAME: &'static str = "widget";
//! }
//!
//! let widgets: ModelScope<Widget> = ModelScope::new(
//!     "https://shop.example.test/widgets",
//!     RestConfig::default(),
//!     Arc::new(HttpTransport::new()?),
//!     Arc::new(ResourceCache::new()),
//! )?;
//!
//! let all = widgets.find_all(None).await?;
//! let one = widgets.find_one(&serde_json::json!(42)).await?;
//! ```
//!
//! ## Design Principles
//!
//! - **No global state**: the cache and configuration are explicit handles
//!   passed into the pipeline, scoped to one unit of work
//! - **Copy-on-write builders**: every mutator returns a new value; shared
//!   base resources are never altered in place
//! - **Typed outcomes**: errors are enums, not strings; an aborted
//!   operation still exposes its transmitted/aborted/completed flags
//! - **Async-first**: designed for use with the Tokio async runtime

pub mod adapter;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod model;
pub mod resource;
pub mod transport;

// Re-export the main types at the crate root for convenience
pub use adapter::ResourceAdapter;
pub use cache::{CacheScope, ResourceCache};
pub use codec::{CodecReflection, Representation};
pub use config::{ConfigOverrides, RestConfig};
pub use error::{ModelError, RequestFailedError, RestError};
pub use handler::{OperationHandler, OperationResult};
pub use model::{FindCriteria, Found, Model, ModelScope, Record};
pub use resource::{DeclarationBuilder, Declarations, OperationCall, Resource, Verb};
pub use transport::{HttpTransport, Response, Transport};
