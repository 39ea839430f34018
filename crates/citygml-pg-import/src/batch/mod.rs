//! Batched bulk writes.
//!
//! A [`BatchWriter`] wraps one bulk-insert destination, accumulates bound
//! rows in insertion order, and flushes them as a single bulk operation
//! when the configured threshold is reached. The flush triggered by the
//! threshold-reaching enqueue is awaited before control returns, which
//! bounds memory to one batch per writer.

use crate::error::{ImportError, Result};
use crate::target::{BulkSink, SqlValue, TableTarget};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Batched writer for one table target.
pub struct BatchWriter {
    target: TableTarget,
    sink: Arc<dyn BulkSink>,
    pending: Vec<Vec<SqlValue>>,
    threshold: usize,
    rows_written: u64,
    closed: bool,
}

impl BatchWriter {
    /// Prepare a writer for `target`, validating the destination against
    /// the active schema.
    pub async fn open(
        sink: Arc<dyn BulkSink>,
        target: TableTarget,
        threshold: usize,
    ) -> Result<Self> {
        if threshold == 0 {
            return Err(ImportError::Config(
                "batch threshold must be at least 1".into(),
            ));
        }
        sink.validate_target(&target).await?;

        Ok(Self {
            target,
            sink,
            pending: Vec::with_capacity(threshold),
            threshold,
            rows_written: 0,
            closed: false,
        })
    }

    /// Bind `values` positionally and add them to the pending batch. When
    /// the batch reaches the threshold, flushes before returning.
    pub async fn enqueue(&mut self, values: Vec<SqlValue>) -> Result<()> {
        if self.closed {
            return Err(ImportError::binding(
                self.target.qualified_name(),
                "enqueue on a closed writer",
            ));
        }
        if values.len() != self.target.columns.len() {
            return Err(ImportError::binding(
                self.target.qualified_name(),
                format!(
                    "expected {} values, got {}",
                    self.target.columns.len(),
                    values.len()
                ),
            ));
        }
        for (column, value) in self.target.columns.iter().zip(&values) {
            if !column.ty.accepts(value) {
                return Err(ImportError::binding(
                    self.target.qualified_name(),
                    format!("value {:?} does not match column {}", value, column.name),
                ));
            }
        }

        self.pending.push(values);
        if self.pending.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Execute the accumulated batch as one bulk operation. No-op when the
    /// batch is empty.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let rows = std::mem::take(&mut self.pending);
        let count = rows.len();
        match self.sink.execute(&self.target, &rows).await {
            Ok(written) => {
                self.rows_written += written;
                debug!(
                    "Flushed {} rows to {} (total {})",
                    count,
                    self.target.qualified_name(),
                    self.rows_written
                );
                Ok(())
            }
            Err(ImportError::BatchExecution { table, rows, message }) => {
                Err(ImportError::BatchExecution { table, rows, message })
            }
            Err(e) => Err(ImportError::BatchExecution {
                table: self.target.qualified_name(),
                rows: count,
                message: e.to_string(),
            }),
        }
    }

    /// Release the writer. Safe after a failed or empty flush; pending
    /// rows that were never flushed are dropped.
    pub fn close(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Closing writer for {} with {} unflushed rows",
                self.target.qualified_name(),
                self.pending.len()
            );
            self.pending.clear();
        }
        self.closed = true;
    }

    /// Rows currently queued and not yet flushed.
    pub fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    /// Rows successfully executed so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// The destination this writer is bound to.
    pub fn target(&self) -> &TableTarget {
        &self.target
    }
}

/// Owns every batch writer of one import run, keyed by qualified table
/// name. Writers share a single sink and one run-wide threshold.
pub struct WriterRegistry {
    sink: Arc<dyn BulkSink>,
    threshold: usize,
    writers: HashMap<String, BatchWriter>,
}

impl WriterRegistry {
    /// Create an empty registry.
    pub fn new(sink: Arc<dyn BulkSink>, threshold: usize) -> Self {
        Self {
            sink,
            threshold,
            writers: HashMap::new(),
        }
    }

    /// Get the writer for `target`, opening it on first use.
    pub async fn writer(&mut self, target: &TableTarget) -> Result<&mut BatchWriter> {
        let key = target.qualified_name();
        if !self.writers.contains_key(&key) {
            let writer =
                BatchWriter::open(Arc::clone(&self.sink), target.clone(), self.threshold).await?;
            self.writers.insert(key.clone(), writer);
        }
        // The entry was just inserted if it was missing.
        Ok(self.writers.get_mut(&key).expect("writer just inserted"))
    }

    /// Open the writer for `target` ahead of the first enqueue, so an
    /// invalid destination surfaces before any rows are queued.
    pub async fn open(&mut self, target: &TableTarget) -> Result<()> {
        self.writer(target).await.map(|_| ())
    }

    /// Enqueue one row against `target`.
    pub async fn enqueue(&mut self, target: &TableTarget, values: Vec<SqlValue>) -> Result<()> {
        self.writer(target).await?.enqueue(values).await
    }

    /// Flush every writer.
    pub async fn flush_all(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush().await?;
        }
        Ok(())
    }

    /// Close every writer without flushing. Pending rows are dropped.
    pub fn close_all(&mut self) {
        for writer in self.writers.values_mut() {
            writer.close();
        }
    }

    /// Total rows executed across all writers.
    pub fn total_rows_written(&self) -> u64 {
        self.writers.values().map(|w| w.rows_written()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::testing::RecordingSink;
    use crate::target::ParamType;

    fn test_target() -> TableTarget {
        TableTarget::new(
            "citydb",
            "cityobject",
            &[("id", ParamType::I64), ("gmlid", ParamType::Text)],
        )
    }

    fn row(id: i64, gmlid: &str) -> Vec<SqlValue> {
        vec![SqlValue::I64(id), SqlValue::String(gmlid.to_string())]
    }

    #[tokio::test]
    async fn test_seven_rows_threshold_three_flush_pattern() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut writer = BatchWriter::open(sink.clone(), test_target(), 3)
            .await
            .unwrap();

        for i in 1..=7 {
            writer.enqueue(row(i, &format!("r{}", i))).await.unwrap();
        }
        // Two automatic flushes so far, one row pending.
        assert_eq!(writer.pending_rows(), 1);
        writer.flush().await.unwrap();

        assert_eq!(sink.batch_sizes("citydb.cityobject"), vec![3, 3, 1]);
        assert_eq!(sink.total_executes(), 3);
        assert_eq!(writer.rows_written(), 7);

        // Exactly once each, in original order.
        let rows = sink.rows_for("citydb.cityobject");
        let gmlids: Vec<_> = rows
            .iter()
            .map(|r| match &r[1] {
                SqlValue::String(s) => s.clone(),
                other => panic!("unexpected value {:?}", other),
            })
            .collect();
        assert_eq!(gmlids, vec!["r1", "r2", "r3", "r4", "r5", "r6", "r7"]);
    }

    #[tokio::test]
    async fn test_queue_stays_below_threshold() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut writer = BatchWriter::open(sink, test_target(), 4).await.unwrap();

        for i in 0..20 {
            writer.enqueue(row(i, "x")).await.unwrap();
            assert!(writer.pending_rows() < 4);
        }
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut writer = BatchWriter::open(sink.clone(), test_target(), 3)
            .await
            .unwrap();

        writer.flush().await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(sink.total_executes(), 0);
    }

    #[tokio::test]
    async fn test_arity_mismatch_is_binding_error() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut writer = BatchWriter::open(sink, test_target(), 3).await.unwrap();

        let result = writer.enqueue(vec![SqlValue::I64(1)]).await;
        assert!(matches!(result, Err(ImportError::Binding { .. })));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_binding_error() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut writer = BatchWriter::open(sink, test_target(), 3).await.unwrap();

        let result = writer
            .enqueue(vec![SqlValue::String("not an id".into()), SqlValue::I64(2)])
            .await;
        assert!(matches!(result, Err(ImportError::Binding { .. })));
    }

    #[tokio::test]
    async fn test_execution_failure_carries_table_and_rows() {
        let sink = Arc::new(RecordingSink::new(4));
        sink.fail_table("citydb.cityobject");
        let mut writer = BatchWriter::open(sink, test_target(), 10).await.unwrap();

        writer.enqueue(row(1, "a")).await.unwrap();
        writer.enqueue(row(2, "b")).await.unwrap();
        let result = writer.flush().await;

        match result {
            Err(ImportError::BatchExecution { table, rows, .. }) => {
                assert_eq!(table, "citydb.cityobject");
                assert_eq!(rows, 2);
            }
            other => panic!("expected BatchExecution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_after_failed_flush_is_safe() {
        let sink = Arc::new(RecordingSink::new(4));
        sink.fail_table("citydb.cityobject");
        let mut writer = BatchWriter::open(sink, test_target(), 10).await.unwrap();

        writer.enqueue(row(1, "a")).await.unwrap();
        assert!(writer.flush().await.is_err());
        writer.close();
        writer.close();
        assert!(writer.enqueue(row(2, "b")).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_open_surfaces_invalid_target() {
        let sink = Arc::new(RecordingSink::new(4));
        sink.fail_validation("citydb.cityobject");
        let mut registry = WriterRegistry::new(sink.clone(), 2);

        let result = registry.open(&test_target()).await;
        assert!(matches!(
            result,
            Err(ImportError::StatementPreparation { .. })
        ));
        assert_eq!(sink.total_executes(), 0);
    }

    #[tokio::test]
    async fn test_registry_reuses_writer_per_target() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut registry = WriterRegistry::new(sink.clone(), 2);
        let target = test_target();

        registry.enqueue(&target, row(1, "a")).await.unwrap();
        registry.enqueue(&target, row(2, "b")).await.unwrap();
        registry.enqueue(&target, row(3, "c")).await.unwrap();
        registry.flush_all().await.unwrap();

        assert_eq!(sink.batch_sizes("citydb.cityobject"), vec![2, 1]);
        assert_eq!(registry.total_rows_written(), 3);
    }
}
