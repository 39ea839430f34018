//! Forward-reference ledger and resolution pass.
//!
//! Associations whose target is identified only by an external identifier
//! are recorded here during entity import and resolved in a second pass,
//! once the full stream has been imported. Resolving eagerly would recurse
//! into cyclic graphs; the ledger keeps resolution flat and bounded.

use crate::batch::WriterRegistry;
use crate::error::Result;
use crate::target::{SqlValue, TableTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One deferred association, waiting for its target entity's identity.
///
/// The join table target carries the source and target column names; the
/// emitted row is `(source_id, resolved_target_id)` in that column order.
#[derive(Debug, Clone)]
pub struct ForwardReference {
    /// Join or relation table receiving the resolved row. Must have
    /// exactly two columns: source id first, target id second.
    pub join_table: TableTarget,

    /// Identity of the already-imported source entity.
    pub source_id: i64,

    /// External identifier of the not-yet-resolved target entity.
    pub target_external_id: String,
}

/// A forward reference whose target never materialized. Reported in the
/// run summary, never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub table: String,
    pub source_id: i64,
    pub target_external_id: String,
}

/// Registry of unresolved forward references for one import run.
#[derive(Default)]
pub struct ReferenceLedger {
    records: Vec<ForwardReference>,
}

impl ReferenceLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a forward reference. Never fails.
    pub fn register(&mut self, record: ForwardReference) {
        debug!(
            "Deferred reference {} -> '{}' via {}",
            record.source_id,
            record.target_external_id,
            record.join_table.qualified_name()
        );
        self.records.push(record);
    }

    /// Number of records awaiting resolution.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are pending.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolve every record against `lookup`, emitting join rows through
    /// `writers` for the targets that were imported and collecting the
    /// rest as unresolved. Each record is consumed exactly once; an
    /// unresolved target never aborts resolution of the remaining records.
    /// All writers touched during resolution are flushed afterwards.
    pub async fn resolve_all(
        &mut self,
        lookup: &HashMap<String, i64>,
        writers: &mut WriterRegistry,
    ) -> Result<Vec<UnresolvedReference>> {
        let records = std::mem::take(&mut self.records);
        let total = records.len();
        let mut unresolved = Vec::new();

        for record in records {
            match lookup.get(&record.target_external_id) {
                Some(target_id) => {
                    writers
                        .enqueue(
                            &record.join_table,
                            vec![SqlValue::I64(record.source_id), SqlValue::I64(*target_id)],
                        )
                        .await?;
                }
                None => {
                    warn!(
                        "Unresolved reference from {} in {} to '{}'",
                        record.source_id,
                        record.join_table.qualified_name(),
                        record.target_external_id
                    );
                    unresolved.push(UnresolvedReference {
                        table: record.join_table.qualified_name(),
                        source_id: record.source_id,
                        target_external_id: record.target_external_id,
                    });
                }
            }
        }

        writers.flush_all().await?;

        debug!(
            "Resolution pass processed {} records, {} unresolved",
            total,
            unresolved.len()
        );
        Ok(unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::testing::RecordingSink;
    use crate::target::ParamType;
    use std::sync::Arc;

    fn join_target() -> TableTarget {
        TableTarget::new(
            "citydb",
            "address_to_building",
            &[("building_id", ParamType::I64), ("address_id", ParamType::I64)],
        )
    }

    #[tokio::test]
    async fn test_forward_reference_round_trip() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut writers = WriterRegistry::new(sink.clone(), 10);
        let mut ledger = ReferenceLedger::new();

        // Entity A (id 1) references entity B before B is imported.
        ledger.register(ForwardReference {
            join_table: join_target(),
            source_id: 1,
            target_external_id: "ADDR_B".into(),
        });

        // B is imported later and receives an arbitrary identity.
        let mut lookup = HashMap::new();
        lookup.insert("ADDR_B".to_string(), 7710_i64);

        let unresolved = ledger.resolve_all(&lookup, &mut writers).await.unwrap();
        assert!(unresolved.is_empty());
        assert!(ledger.is_empty());

        let rows = sink.rows_for("citydb.address_to_building");
        assert_eq!(rows, vec![vec![SqlValue::I64(1), SqlValue::I64(7710)]]);
    }

    #[tokio::test]
    async fn test_unresolved_reported_once_and_rest_still_resolve() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut writers = WriterRegistry::new(sink.clone(), 10);
        let mut ledger = ReferenceLedger::new();

        ledger.register(ForwardReference {
            join_table: join_target(),
            source_id: 1,
            target_external_id: "MISSING".into(),
        });
        ledger.register(ForwardReference {
            join_table: join_target(),
            source_id: 2,
            target_external_id: "PRESENT".into(),
        });

        let mut lookup = HashMap::new();
        lookup.insert("PRESENT".to_string(), 42_i64);

        let unresolved = ledger.resolve_all(&lookup, &mut writers).await.unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].target_external_id, "MISSING");
        assert_eq!(unresolved[0].source_id, 1);

        // The resolvable record still produced its join row.
        let rows = sink.rows_for("citydb.address_to_building");
        assert_eq!(rows, vec![vec![SqlValue::I64(2), SqlValue::I64(42)]]);

        // A second pass has nothing left to process.
        let again = ledger.resolve_all(&lookup, &mut writers).await.unwrap();
        assert!(again.is_empty());
    }
}
