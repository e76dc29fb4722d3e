use crate::database::{
    column_list, effective_order, table_not_found_if_empty, PageQuery, Snapshot, TableRows,
    TableStore,
};
use crate::errors::{DbError, DbResult, TableWriteError};
use crate::types::{ExportRecord, FieldValue};
use crate::validation::quote_identifier;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction, TypeInfo, ValueRef};
use std::str::FromStr;

/// SQLite store, used for local copies and tests
pub struct SqliteTableStore {
    pool: SqlitePool,
}

impl SqliteTableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file, e.g. `sqlite:local.db`
    pub async fn connect(url: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| DbError::Connection {
                target: url.to_string(),
                source,
            })?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|source| DbError::Connection {
                target: url.to_string(),
                source,
            })?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database. One connection that never expires, since
    /// every new in-memory connection would start empty.
    pub async fn in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|source| DbError::Connection {
                target: "sqlite::memory:".to_string(),
                source,
            })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode_value(row: &SqliteRow, index: usize, column: &str) -> DbResult<FieldValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    match type_name.as_str() {
        "INTEGER" => Ok(FieldValue::Integer(row.try_get::<i64, _>(index)?)),
        "REAL" => Ok(FieldValue::Float(row.try_get::<f64, _>(index)?)),
        "TEXT" => Ok(FieldValue::Text(row.try_get::<String, _>(index)?)),
        _ => Err(DbError::UnsupportedValue {
            column: column.to_string(),
            type_name,
        }),
    }
}

fn select_page_sql(query: &PageQuery) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT ? OFFSET ?",
        column_list(&query.columns),
        quote_identifier(&query.table),
        column_list(effective_order(query))
    )
}

/// Deferred transaction: the first read takes a shared lock that is held
/// until the snapshot is dropped
struct SqliteSnapshot {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl Snapshot for SqliteSnapshot {
    async fn fetch_page(&mut self, query: &PageQuery) -> DbResult<Vec<ExportRecord>> {
        let sql = select_page_sql(query);
        let rows = sqlx::query(&sql)
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<ExportRecord> {
                let values = query
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| decode_value(row, i, column))
                    .collect::<DbResult<Vec<_>>>()?;
                Ok(ExportRecord::new(values))
            })
            .collect()
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn table_columns(&self, table: &str) -> DbResult<Vec<String>> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        table_not_found_if_empty(table, columns)
    }

    async fn primary_key(&self, table: &str) -> DbResult<Vec<String>> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }

    async fn snapshot(&self) -> DbResult<Box<dyn Snapshot>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteSnapshot { tx }))
    }

    async fn replace_tables(&self, batch: &[TableRows]) -> Result<Vec<u64>, TableWriteError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(TableWriteError::outside_table)?;

        for table in batch.iter().rev() {
            sqlx::query(&format!("DELETE FROM {}", quote_identifier(&table.table)))
                .execute(&mut *tx)
                .await
                .map_err(|e| TableWriteError::in_table(&table.table, e))?;
        }

        let mut counts = Vec::with_capacity(batch.len());
        for table in batch {
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_identifier(&table.table),
                column_list(&table.columns),
                vec!["?"; table.columns.len()].join(", ")
            );

            let mut inserted = 0;
            for row in &table.rows {
                let mut insert = sqlx::query(&sql);
                for value in row {
                    insert = insert.bind(value.as_deref());
                }
                inserted += insert
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| TableWriteError::in_table(&table.table, e))?
                    .rows_affected();
            }
            counts.push(inserted);
        }

        tx.commit().await.map_err(TableWriteError::outside_table)?;
        Ok(counts)
    }
}
