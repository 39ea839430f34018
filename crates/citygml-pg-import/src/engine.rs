//! Import engine - main run coordinator.
//!
//! Drives one unit of work: entities are imported strictly in stream
//! order on one logical task, batch writers are flushed when the stream
//! is exhausted, the forward-reference resolution pass runs against the
//! fully-populated identity index, and the run reports what it imported,
//! skipped, and could not resolve.

use crate::config::Config;
use crate::error::Result;
use crate::extension::{DelegateRegistry, ExtensionDelegate};
use crate::geometry::{EwkbConverter, GeometryConverter};
use crate::importer::{core_targets, import_entity, ImportContext, SkippedEntity};
use crate::ledger::UnresolvedReference;
use crate::model::CityObject;
use crate::schema::SchemaCapabilities;
use crate::target::{BulkSink, PgSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of an import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed" or "completed_with_warnings".
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Entities whose core row was written.
    pub imported: u64,

    /// Rows executed across all batch writers.
    pub rows_written: u64,

    /// Entities or sub-entities skipped under the run policy.
    pub skipped_entities: Vec<SkippedEntity>,

    /// Forward references whose target never materialized.
    pub unresolved_references: Vec<UnresolvedReference>,
}

impl ImportSummary {
    /// Serialize the summary as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Import engine for one target database.
pub struct ImportEngine {
    config: Config,
    sink: Arc<dyn BulkSink>,
    delegates: DelegateRegistry,
    converter: Arc<dyn GeometryConverter>,
}

impl ImportEngine {
    /// Create an engine connected to the configured PostgreSQL target.
    pub async fn new(config: Config) -> Result<Self> {
        let sink = PgSink::new(&config.target, config.import.get_max_connections()).await?;
        Ok(Self::with_sink(config, Arc::new(sink)))
    }

    /// Create an engine over a caller-supplied sink.
    pub fn with_sink(config: Config, sink: Arc<dyn BulkSink>) -> Self {
        Self {
            config,
            sink,
            delegates: DelegateRegistry::new(),
            converter: Arc::new(EwkbConverter),
        }
    }

    /// Attach an extension delegate. Must happen before the run starts.
    pub fn register_delegate(&mut self, delegate: Arc<dyn ExtensionDelegate>) {
        self.delegates.register(delegate);
    }

    /// Replace the geometry converter.
    pub fn with_converter(mut self, converter: Arc<dyn GeometryConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Run the import over `entities`, consuming the engine.
    pub async fn run(
        self,
        entities: impl IntoIterator<Item = CityObject>,
    ) -> Result<ImportSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting import run: {}", run_id);

        // Capabilities are probed once and passed by value into importers.
        let capabilities = SchemaCapabilities::probe(self.sink.as_ref()).await?;

        let mut ctx = ImportContext::new(
            Arc::clone(&self.sink),
            &self.config.target.schema,
            self.config.import.get_srid(),
            self.config.import.get_batch_size(),
            self.config.import.on_unsupported,
            capabilities,
            self.delegates.clone(),
            Arc::clone(&self.converter),
        );

        // Open every core writer up front. Statement preparation failures
        // belong to run start, before a single entity row is queued.
        for target in core_targets(&ctx) {
            if let Err(e) = ctx.writers.open(&target).await {
                return self.abort(ctx, e).await;
            }
        }

        for entity in entities {
            match import_entity(&mut ctx, &entity).await {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    if let Err(fatal) = ctx.skip_or_abort(&entity.label(), e) {
                        return self.abort(ctx, fatal).await;
                    }
                }
                Err(e) => return self.abort(ctx, e).await,
            }
        }

        // Flush everything the entity pass queued before resolving
        // references against the now-complete identity index.
        if let Err(e) = ctx.writers.flush_all().await {
            return self.abort(ctx, e).await;
        }

        let (mut writers, mut ledger, id_index, stats) = ctx.into_resolution_parts();
        let unresolved = match ledger.resolve_all(&id_index, &mut writers).await {
            Ok(unresolved) => unresolved,
            Err(e) => {
                error!("Resolution pass failed: {}", e.format_detailed());
                writers.close_all();
                self.sink.close().await;
                return Err(e);
            }
        };

        let rows_written = writers.total_rows_written();
        writers.close_all();
        self.sink.close().await;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let status = if unresolved.is_empty() && stats.skipped.is_empty() {
            "completed"
        } else {
            "completed_with_warnings"
        };

        info!(
            "Import run {} {}: {} entities imported, {} rows written, {} skipped, {} unresolved references in {:.1}s",
            run_id,
            status,
            stats.imported,
            rows_written,
            stats.skipped.len(),
            unresolved.len(),
            duration
        );
        for reference in &unresolved {
            warn!(
                "Unresolved: {} row for source {} -> '{}'",
                reference.table, reference.source_id, reference.target_external_id
            );
        }

        Ok(ImportSummary {
            run_id,
            status: status.to_string(),
            started_at,
            completed_at,
            duration_seconds: duration,
            imported: stats.imported,
            rows_written,
            skipped_entities: stats.skipped,
            unresolved_references: unresolved,
        })
    }

    /// Abort path: close writers without a final flush, dropping pending
    /// rows, and surface the fatal error.
    async fn abort(&self, mut ctx: ImportContext, error: crate::error::ImportError) -> Result<ImportSummary> {
        error!("Import run aborted: {}", error.format_detailed());
        ctx.writers.close_all();
        self.sink.close().await;
        Err(error)
    }
}
