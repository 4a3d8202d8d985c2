// Catalog - table and column introspection for target databases

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::executor::ExecutionError;
use crate::database::manager::DatabaseManager;

/// One column of one table, in ordinal order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub table: String,
    pub column: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
}

/// Summary of one target database for operators
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub database: String,
    pub tables: Vec<String>,
    pub table_stats: BTreeMap<String, i64>,
    pub schema: BTreeMap<String, Vec<TableColumn>>,
    pub total_tables: usize,
    pub total_records: i64,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Columns of every user table in `target`, grouped by table
    async fn columns(&self, target: &str) -> Result<Vec<ColumnInfo>, ExecutionError>;

    async fn row_count(&self, target: &str, table: &str) -> Result<i64, ExecutionError>;

    async fn describe(&self, target: &str) -> Result<DatabaseInfo, ExecutionError> {
        let columns = self.columns(target).await?;

        let mut tables: Vec<String> = Vec::new();
        let mut schema: BTreeMap<String, Vec<TableColumn>> = BTreeMap::new();
        for col in columns {
            if !tables.contains(&col.table) {
                tables.push(col.table.clone());
            }
            schema.entry(col.table).or_default().push(TableColumn {
                name: col.column,
                data_type: col.data_type,
            });
        }

        let mut table_stats = BTreeMap::new();
        for table in &tables {
            table_stats.insert(table.clone(), self.row_count(target, table).await?);
        }

        Ok(DatabaseInfo {
            database: target.to_string(),
            total_tables: tables.len(),
            total_records: table_stats.values().sum(),
            tables,
            table_stats,
            schema,
        })
    }
}

/// Catalog reading `information_schema` through the target pools
pub struct PgCatalog {
    databases: Arc<DatabaseManager>,
}

impl PgCatalog {
    pub fn new(databases: Arc<DatabaseManager>) -> Self {
        Self { databases }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn columns(&self, target: &str) -> Result<Vec<ColumnInfo>, ExecutionError> {
        let pool = self.databases.target_pool(target).await?;

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"SELECT c.table_name::text, c.column_name::text, c.data_type::text
               FROM information_schema.columns c
               JOIN information_schema.tables t
                 ON t.table_schema = c.table_schema AND t.table_name = c.table_name
               WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
               ORDER BY c.table_name, c.ordinal_position"#,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| ExecutionError::Statement(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(table, column, data_type)| ColumnInfo {
                table,
                column,
                data_type,
            })
            .collect())
    }

    async fn row_count(&self, target: &str, table: &str) -> Result<i64, ExecutionError> {
        let pool = self.databases.target_pool(target).await?;
        let sql = format!("SELECT count(*) FROM public.{}", quote_ident(table));
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&pool)
            .await
            .map_err(|e| ExecutionError::Statement(e.to_string()))
    }
}

/// Double-quoted identifier with embedded quotes doubled
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
