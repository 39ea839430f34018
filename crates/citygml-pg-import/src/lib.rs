//! # citygml-pg-import
//!
//! CityGML to PostgreSQL relational import engine.
//!
//! This library imports a hierarchical city model object graph into a
//! normalized relational schema, one entity at a time, with support for:
//!
//! - **Batched bulk inserts** with a run-wide auto-flush threshold
//! - **Deferred forward references** resolved in a second pass, so
//!   associations may point at entities that appear later in the stream
//! - **Schema capability probing** gating version-conditional columns
//! - **Extension delegates** persisting schema-extension data per entity
//!
//! Parsing source documents, geometry conversion internals, and the SQL
//! dialect are external collaborators behind trait boundaries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use citygml_pg_import::{Config, ImportEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let engine = ImportEngine::new(config).await?;
//!     let entities = Vec::new(); // produced by the upstream parser
//!     let summary = engine.run(entities).await?;
//!     println!("Imported {} entities", summary.imported);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod extension;
pub mod geometry;
pub mod importer;
pub mod ledger;
pub mod model;
pub mod schema;
pub mod target;

// Re-exports for convenient access
pub use batch::{BatchWriter, WriterRegistry};
pub use config::{Config, ImportConfig, OnUnsupported, TargetConfig};
pub use engine::{ImportEngine, ImportSummary};
pub use error::{ImportError, Result};
pub use extension::{DelegateRegistry, ExtensionDelegate};
pub use geometry::{EwkbConverter, GeometryConverter, GeometryValue};
pub use importer::{import_entity, ImportContext, SkippedEntity};
pub use ledger::{ForwardReference, ReferenceLedger, UnresolvedReference};
pub use model::{AttributeValue, CityObject, EntityRef, FeatureClass, RefTarget};
pub use schema::{SchemaCapabilities, SchemaFeature};
pub use target::{BulkSink, ParamType, PgSink, SqlValue, TableTarget};
