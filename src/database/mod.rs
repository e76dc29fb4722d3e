pub mod postgres;
pub mod sqlite;

pub use postgres::PgTableStore;
pub use sqlite::SqliteTableStore;

use crate::errors::{DbError, DbResult, TableWriteError};
use crate::types::{ExportRecord, ImportRow};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One page of a table read in a stable order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub table: String,
    pub columns: Vec<String>,
    /// Empty orders by every selected column
    pub order_by: Vec<String>,
    pub offset: u64,
    pub limit: u64,
}

/// Replacement contents for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRows {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<ImportRow>,
}

/// A consistent read view of the source. Every page fetched through the same
/// snapshot sees the same data.
#[async_trait]
pub trait Snapshot: Send {
    /// Read one page of rows, values aligned with `query.columns`
    async fn fetch_page(&mut self, query: &PageQuery) -> DbResult<Vec<ExportRecord>>;
}

/// Database access needed by pull and push, independent of the engine
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Short engine name for log lines
    fn backend_name(&self) -> &'static str;

    /// Column names in declaration order. Fails with `TableNotFound` when the
    /// table does not exist.
    async fn table_columns(&self, table: &str) -> DbResult<Vec<String>>;

    /// Primary key columns in key order, empty when the table has none
    async fn primary_key(&self, table: &str) -> DbResult<Vec<String>>;

    /// Open a read-only snapshot for paging through one table
    async fn snapshot(&self) -> DbResult<Box<dyn Snapshot>>;

    /// Replace the contents of every table in `batch` in one transaction.
    ///
    /// Tables are emptied in reverse order and loaded in order, so a batch in
    /// parent-first order never strands a foreign key. Returns the rows
    /// inserted per table. On error nothing is committed.
    async fn replace_tables(&self, batch: &[TableRows]) -> Result<Vec<u64>, TableWriteError>;
}

pub type RecordStream = Pin<Box<dyn Stream<Item = DbResult<ExportRecord>> + Send>>;

/// Stream every row matched by `query`, paging through `snapshot` on a
/// background task.
///
/// The bounded channel keeps at most a couple of pages in memory. The stream
/// ends after the first error it yields. The snapshot is released when the
/// task finishes.
pub fn stream_table(
    mut snapshot: Box<dyn Snapshot>,
    table: &str,
    columns: Vec<String>,
    order_by: Vec<String>,
    batch_size: usize,
) -> RecordStream {
    let batch_size = batch_size.max(1);
    let (tx, rx) = mpsc::channel(batch_size * 2);
    let mut query = PageQuery {
        table: table.to_string(),
        columns,
        order_by,
        offset: 0,
        limit: batch_size as u64,
    };

    tokio::spawn(async move {
        loop {
            let page = match snapshot.fetch_page(&query).await {
                Ok(page) => page,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let fetched = page.len() as u64;
            log::debug!(
                "Fetched {} rows from {} at offset {}",
                fetched,
                query.table,
                query.offset
            );

            for record in page {
                if tx.send(Ok(record)).await.is_err() {
                    // Receiver dropped, the export was abandoned
                    return;
                }
            }

            if fetched < query.limit {
                return;
            }
            query.offset += fetched;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Columns a page is ordered by: the explicit list, or every selected column
pub(crate) fn effective_order(query: &PageQuery) -> &[String] {
    if query.order_by.is_empty() {
        &query.columns
    } else {
        &query.order_by
    }
}

/// Comma-separated list of quoted identifiers
pub(crate) fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| crate::validation::quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn table_not_found_if_empty(table: &str, columns: Vec<String>) -> DbResult<Vec<String>> {
    if columns.is_empty() {
        Err(DbError::TableNotFound(table.to_string()))
    } else {
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    struct FakeSnapshot {
        rows: Vec<ExportRecord>,
        fail_at_offset: Option<u64>,
        queries: Arc<Mutex<Vec<PageQuery>>>,
    }

    #[async_trait]
    impl Snapshot for FakeSnapshot {
        async fn fetch_page(&mut self, query: &PageQuery) -> DbResult<Vec<ExportRecord>> {
            self.queries.lock().unwrap().push(query.clone());
            if self.fail_at_offset == Some(query.offset) {
                return Err(DbError::TableNotFound(query.table.clone()));
            }
            Ok(self
                .rows
                .iter()
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .cloned()
                .collect())
        }
    }

    fn snapshot(n: i64, fail_at_offset: Option<u64>) -> (Box<dyn Snapshot>, Arc<Mutex<Vec<PageQuery>>>) {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let rows = (1..=n)
            .map(|i| ExportRecord::new(vec![FieldValue::Integer(i)]))
            .collect();
        let snapshot = FakeSnapshot {
            rows,
            fail_at_offset,
            queries: queries.clone(),
        };
        (Box::new(snapshot), queries)
    }

    #[tokio::test]
    async fn test_stream_table_pages_through_all_rows() {
        let (snapshot, queries) = snapshot(7, None);
        let stream = stream_table(snapshot, "users", vec!["id".into()], vec!["id".into()], 3);
        let rows: Vec<_> = stream.collect().await;

        assert_eq!(rows.len(), 7);
        assert_eq!(
            rows.last().unwrap().as_ref().unwrap().values,
            vec![FieldValue::Integer(7)]
        );
        let offsets: Vec<u64> = queries.lock().unwrap().iter().map(|q| q.offset).collect();
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn test_stream_table_ends_after_error() {
        let (snapshot, _) = snapshot(5, Some(2));
        let stream = stream_table(snapshot, "users", vec!["id".into()], vec!["id".into()], 2);
        let rows: Vec<_> = stream.collect().await;

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok() && rows[1].is_ok());
        assert!(matches!(rows[2], Err(DbError::TableNotFound(_))));
    }

    #[test]
    fn test_column_list_quotes_names() {
        let columns = vec!["id".to_string(), "canvas_api_domain".to_string()];
        assert_eq!(column_list(&columns), "\"id\", \"canvas_api_domain\"");
    }

    #[test]
    fn test_effective_order_falls_back_to_every_column() {
        let mut query = PageQuery {
            table: "asset_users".to_string(),
            columns: vec!["asset_id".to_string(), "user_id".to_string()],
            order_by: vec![],
            offset: 0,
            limit: 10,
        };
        assert_eq!(effective_order(&query), ["asset_id", "user_id"]);
        query.order_by = vec!["user_id".to_string()];
        assert_eq!(effective_order(&query), ["user_id"]);
    }
}
