//! Entity importers and the per-run import context.
//!
//! One [`ImportContext`] holds every piece of mutable state of one run:
//! batch writers, the forward-reference ledger, the identity sequence and
//! external-id index, capability flags, policy, and counters. Nothing is
//! process-global, so independent runs can execute in parallel without
//! sharing state.

pub mod building;
pub mod city_object;
pub mod relief;

use crate::batch::WriterRegistry;
use crate::config::OnUnsupported;
use crate::error::{ImportError, Result};
use crate::extension::DelegateRegistry;
use crate::geometry::GeometryConverter;
use crate::ledger::ReferenceLedger;
use crate::model::{CityObject, FeatureClass};
use crate::schema::SchemaCapabilities;
use crate::target::{BulkSink, TableTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// A per-entity condition the run policy downgraded to a logged skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntity {
    pub entity: String,
    pub reason: String,
}

/// Counters accumulated over one run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Entities whose core row was written.
    pub imported: u64,

    /// Entities (or sub-entities) skipped under the run policy.
    pub skipped: Vec<SkippedEntity>,
}

/// All mutable state of one import run.
pub struct ImportContext {
    pub(crate) schema: String,
    pub(crate) srid: i32,
    pub(crate) policy: OnUnsupported,
    pub(crate) capabilities: SchemaCapabilities,
    pub(crate) writers: WriterRegistry,
    pub(crate) ledger: ReferenceLedger,
    pub(crate) delegates: DelegateRegistry,
    pub(crate) converter: Arc<dyn GeometryConverter>,
    pub(crate) stats: RunStats,
    next_id: i64,
    id_index: HashMap<String, i64>,
}

impl ImportContext {
    /// Assemble the context for one run.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sink: Arc<dyn BulkSink>,
        schema: impl Into<String>,
        srid: i32,
        batch_threshold: usize,
        policy: OnUnsupported,
        capabilities: SchemaCapabilities,
        delegates: DelegateRegistry,
        converter: Arc<dyn GeometryConverter>,
    ) -> Self {
        Self {
            schema: schema.into(),
            srid,
            policy,
            capabilities,
            writers: WriterRegistry::new(sink, batch_threshold),
            ledger: ReferenceLedger::new(),
            delegates,
            converter,
            stats: RunStats::default(),
            next_id: 0,
            id_index: HashMap::new(),
        }
    }

    /// Allocate the next entity identity of this run.
    pub fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record the external identifier of an imported entity, for the
    /// resolution pass.
    pub fn record_external_id(&mut self, external_id: &str, id: i64) {
        self.id_index.insert(external_id.to_string(), id);
    }

    /// Look up the identity an external identifier resolved to, if the
    /// entity has been imported.
    pub fn resolve_external(&self, external_id: &str) -> Option<i64> {
        self.id_index.get(external_id).copied()
    }

    /// Decompose the context into the pieces the resolution pass needs.
    pub(crate) fn into_resolution_parts(
        self,
    ) -> (WriterRegistry, ReferenceLedger, HashMap<String, i64>, RunStats) {
        (self.writers, self.ledger, self.id_index, self.stats)
    }

    /// Apply the run policy to a recoverable per-entity error: record and
    /// continue under `Skip`, escalate under `Abort`.
    pub fn skip_or_abort(&mut self, entity: &str, error: ImportError) -> Result<()> {
        match self.policy {
            OnUnsupported::Skip => {
                warn!("Skipping {}: {}", entity, error);
                self.stats.skipped.push(SkippedEntity {
                    entity: entity.to_string(),
                    reason: error.to_string(),
                });
                Ok(())
            }
            OnUnsupported::Abort => Err(error),
        }
    }
}

/// Every table target the importers write to. The engine opens these
/// before the entity loop, so an invalid destination fails at run start
/// with nothing queued or written.
pub(crate) fn core_targets(ctx: &ImportContext) -> Vec<TableTarget> {
    vec![
        city_object::cityobject_target(ctx),
        building::building_target(ctx),
        building::thematic_surface_target(ctx),
        building::address_target(ctx),
        building::address_to_building_target(ctx),
        relief::relief_feature_target(ctx),
        relief::relief_component_target(ctx),
        relief::tin_relief_target(ctx),
        relief::masspoint_relief_target(ctx),
        relief::relief_feat_to_rel_comp_target(ctx),
    ]
}

/// Import one top-level entity, dispatching on its classification.
/// Returns the entity's allocated identity.
pub async fn import_entity(ctx: &mut ImportContext, entity: &CityObject) -> Result<i64> {
    match entity.class {
        FeatureClass::Building => building::import_building(ctx, entity).await,
        FeatureClass::ReliefFeature => relief::import_relief(ctx, entity).await,
        FeatureClass::Address => building::import_address(ctx, entity).await,
        _ => Err(ImportError::classification(
            entity.label(),
            format!(
                "feature class {} has no top-level table mapping",
                entity.class.name()
            ),
        )),
    }
}

/// Invoke every registered extension delegate for an imported entity.
/// Delegate failures fall under the run policy, like unsupported variants.
pub(crate) async fn run_delegates(
    ctx: &mut ImportContext,
    entity: &CityObject,
    id: i64,
) -> Result<()> {
    if ctx.delegates.is_empty() {
        return Ok(());
    }
    let delegates: Vec<_> = ctx.delegates.iter().cloned().collect();
    for delegate in delegates {
        if let Err(e) = delegate.persist(entity, id, &mut ctx.writers).await {
            // Batch and statement integrity failures stay fatal even when
            // raised inside a delegate.
            if matches!(
                e,
                ImportError::Binding { .. }
                    | ImportError::BatchExecution { .. }
                    | ImportError::StatementPreparation { .. }
                    | ImportError::Target(_)
                    | ImportError::Pool { .. }
            ) {
                return Err(e);
            }
            let label = format!("{} (delegate {})", entity.label(), delegate.name());
            ctx.skip_or_abort(&label, e)?;
        }
    }
    Ok(())
}
