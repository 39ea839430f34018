//! PostgreSQL target database operations.
//!
//! The [`BulkSink`] trait is the single seam between the import engine and
//! the underlying database: one parameterized bulk insert per table target,
//! plus the metadata queries the run needs at startup.

use crate::config::TargetConfig;
use crate::error::{ImportError, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{types::ToSql, Config as PgConfig, NoTls};
use tracing::{debug, info};

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlNullType),
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Type hint for NULL values to ensure correct PostgreSQL encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNullType {
    Bool,
    I32,
    I64,
    F64,
    String,
    Bytes,
}

/// Declared parameter type of one table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    I32,
    I64,
    F64,
    Text,
    Bytes,
}

impl ParamType {
    /// Whether `value` may be bound to a column of this type. NULLs must
    /// carry a matching type hint.
    pub fn accepts(&self, value: &SqlValue) -> bool {
        matches!(
            (self, value),
            (ParamType::Bool, SqlValue::Bool(_))
                | (ParamType::Bool, SqlValue::Null(SqlNullType::Bool))
                | (ParamType::I32, SqlValue::I32(_))
                | (ParamType::I32, SqlValue::Null(SqlNullType::I32))
                | (ParamType::I64, SqlValue::I64(_))
                | (ParamType::I64, SqlValue::Null(SqlNullType::I64))
                | (ParamType::F64, SqlValue::F64(_))
                | (ParamType::F64, SqlValue::Null(SqlNullType::F64))
                | (ParamType::Text, SqlValue::String(_))
                | (ParamType::Text, SqlValue::Null(SqlNullType::String))
                | (ParamType::Bytes, SqlValue::Bytes(_))
                | (ParamType::Bytes, SqlValue::Null(SqlNullType::Bytes))
        )
    }

    /// SQL cast suffix appended to bind placeholders.
    fn cast(&self) -> &'static str {
        match self {
            ParamType::Bool => "::boolean",
            ParamType::I32 => "::integer",
            ParamType::I64 => "::bigint",
            ParamType::F64 => "::double precision",
            ParamType::Text => "::text",
            ParamType::Bytes => "::bytea",
        }
    }
}

/// One column of a table target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ParamType,
}

/// A bulk-insert destination: schema-qualified table name plus an ordered
/// column list with parameter types. Fixed for the lifetime of the batch
/// writer bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableTarget {
    /// Build a table target from (column name, type) pairs.
    pub fn new(schema: &str, name: &str, columns: &[(&str, ParamType)]) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(name, ty)| Column {
                    name: (*name).to_string(),
                    ty: *ty,
                })
                .collect(),
        }
    }

    /// Schema-qualified display name.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Trait for target database operations.
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Verify that the target table and columns exist in the active schema.
    async fn validate_target(&self, target: &TableTarget) -> Result<()>;

    /// Execute one bulk insert of `rows` against `target`, preserving row
    /// order. Returns the number of rows written.
    async fn execute(&self, target: &TableTarget, rows: &[Vec<SqlValue>]) -> Result<u64>;

    /// Read the schema version from the target's metadata table.
    async fn schema_version(&self) -> Result<u32>;

    /// Close all connections.
    async fn close(&self);
}

/// PostgreSQL bulk sink implementation.
pub struct PgSink {
    pool: Pool,
    schema: String,
}

impl PgSink {
    /// Create a new PostgreSQL sink.
    pub async fn new(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let pg_config: PgConfig = config.connection_string().parse()?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| ImportError::pool(e.to_string(), "creating connection pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| ImportError::pool(e.to_string(), "acquiring test connection"))?;

        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    /// Quote a PostgreSQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Fully qualify a table name.
    fn qualify_table(schema: &str, table: &str) -> String {
        format!("{}.{}", Self::quote_ident(schema), Self::quote_ident(table))
    }
}

#[async_trait]
impl BulkSink for PgSink {
    async fn validate_target(&self, target: &TableTarget) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ImportError::pool(e.to_string(), "validating table target"))?;

        let rows = client
            .query(
                "SELECT column_name FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2",
                &[&target.schema, &target.name],
            )
            .await?;

        if rows.is_empty() {
            return Err(ImportError::preparation(
                target.qualified_name(),
                "table does not exist in the active schema",
            ));
        }

        let present: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
        for column in &target.columns {
            if !present.contains(&column.name) {
                return Err(ImportError::preparation(
                    target.qualified_name(),
                    format!("column {} does not exist", column.name),
                ));
            }
        }

        debug!("Validated table target {}", target.qualified_name());
        Ok(())
    }

    async fn execute(&self, target: &TableTarget, rows: &[Vec<SqlValue>]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ImportError::pool(e.to_string(), "executing bulk insert"))?;

        let (sql, params) = build_insert_sql(target, rows);
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let written = client.execute(&sql, &param_refs).await?;

        debug!(
            "Wrote {} rows into {}",
            written,
            target.qualified_name()
        );
        Ok(written)
    }

    async fn schema_version(&self) -> Result<u32> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ImportError::pool(e.to_string(), "probing schema version"))?;

        let sql = format!(
            "SELECT schema_version FROM {} LIMIT 1",
            Self::qualify_table(&self.schema, "database_info")
        );
        let row = client.query_one(&sql, &[]).await?;
        let version: i32 = row.get(0);
        Ok(version as u32)
    }

    async fn close(&self) {
        // Pool connections are released when dropped
    }
}

/// Build a multi-row INSERT with positional parameters and per-column casts.
/// All values travel as text and are cast by PostgreSQL, which keeps one
/// bind path for every column type.
fn build_insert_sql(
    target: &TableTarget,
    rows: &[Vec<SqlValue>],
) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
    let col_list: String = target
        .columns
        .iter()
        .map(|c| PgSink::quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();
    let mut idx = 1;

    for row in rows {
        let row_placeholders: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(col_idx, _)| {
                let p = format!("${}{}", idx, target.columns[col_idx].ty.cast());
                idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));

        for value in row {
            params.push(sql_value_to_param(value));
        }
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        PgSink::qualify_table(&target.schema, &target.name),
        col_list,
        placeholders.join(", ")
    );

    (sql, params)
}

/// Convert SqlValue to a boxed ToSql parameter.
fn sql_value_to_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null(_) => Box::new(None::<String>),
        SqlValue::Bool(b) => Box::new(if *b { "t".to_string() } else { "f".to_string() }),
        SqlValue::I32(n) => Box::new(n.to_string()),
        SqlValue::I64(n) => Box::new(n.to_string()),
        SqlValue::F64(n) => Box::new(n.to_string()),
        SqlValue::String(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(format!("\\x{}", hex::encode(b))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording sink shared by the unit tests of this crate.

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// One executed bulk operation, as observed by the mock.
    #[derive(Debug, Clone)]
    pub struct ExecutedBatch {
        pub table: String,
        pub rows: Vec<Vec<SqlValue>>,
    }

    /// In-memory [`BulkSink`] that records every executed batch.
    pub struct RecordingSink {
        pub batches: Mutex<Vec<ExecutedBatch>>,
        pub version: u32,
        pub failing_tables: Mutex<HashSet<String>>,
        pub invalid_tables: Mutex<HashSet<String>>,
    }

    impl RecordingSink {
        pub fn new(version: u32) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                version,
                failing_tables: Mutex::new(HashSet::new()),
                invalid_tables: Mutex::new(HashSet::new()),
            }
        }

        /// Make every execute against `table` fail.
        pub fn fail_table(&self, table: &str) {
            self.failing_tables.lock().unwrap().insert(table.to_string());
        }

        /// Make target validation fail for `table`, as if it were missing
        /// from the active schema.
        pub fn fail_validation(&self, table: &str) {
            self.invalid_tables.lock().unwrap().insert(table.to_string());
        }

        /// Batch sizes executed against `table`, in execution order.
        pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .filter(|b| b.table == table)
                .map(|b| b.rows.len())
                .collect()
        }

        /// All rows executed against `table`, flattened in order.
        pub fn rows_for(&self, table: &str) -> Vec<Vec<SqlValue>> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .filter(|b| b.table == table)
                .flat_map(|b| b.rows.clone())
                .collect()
        }

        pub fn total_executes(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BulkSink for RecordingSink {
        async fn validate_target(&self, target: &TableTarget) -> Result<()> {
            if self
                .invalid_tables
                .lock()
                .unwrap()
                .contains(&target.qualified_name())
            {
                return Err(ImportError::preparation(
                    target.qualified_name(),
                    "table does not exist in the active schema",
                ));
            }
            Ok(())
        }

        async fn execute(&self, target: &TableTarget, rows: &[Vec<SqlValue>]) -> Result<u64> {
            if self
                .failing_tables
                .lock()
                .unwrap()
                .contains(&target.qualified_name())
            {
                return Err(ImportError::BatchExecution {
                    table: target.qualified_name(),
                    rows: rows.len(),
                    message: "injected failure".into(),
                });
            }
            self.batches.lock().unwrap().push(ExecutedBatch {
                table: target.qualified_name(),
                rows: rows.to_vec(),
            });
            Ok(rows.len() as u64)
        }

        async fn schema_version(&self) -> Result<u32> {
            Ok(self.version)
        }

        async fn close(&self) {}
    }

    #[test]
    fn test_build_insert_sql_places_casts() {
        let target = TableTarget::new(
            "citydb",
            "cityobject",
            &[("id", ParamType::I64), ("gmlid", ParamType::Text)],
        );
        let rows = vec![
            vec![SqlValue::I64(1), SqlValue::String("a".into())],
            vec![SqlValue::I64(2), SqlValue::Null(SqlNullType::String)],
        ];
        let (sql, params) = build_insert_sql(&target, &rows);
        assert!(sql.starts_with("INSERT INTO \"citydb\".\"cityobject\""));
        assert!(sql.contains("($1::bigint, $2::text)"));
        assert!(sql.contains("($3::bigint, $4::text)"));
        assert_eq!(params.len(), 4);
    }
}
