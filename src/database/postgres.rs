use crate::database::{
    column_list, table_not_found_if_empty, PageQuery, Snapshot, TableRows, TableStore,
};
use crate::domains::connection::ConnectionDescriptor;
use crate::errors::{DbError, DbResult, TableWriteError};
use crate::types::{ExportRecord, FieldValue, ImportRow};
use crate::validation::quote_identifier;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;

/// Rows per INSERT statement during import
const INSERT_CHUNK_SIZE: usize = 500;

/// PostgreSQL store.
///
/// Values are read as text so any column type survives the trip through CSV.
/// Writes ship each chunk as a JSON array of strings and cast every value to
/// the destination column's declared type on the server.
pub struct PgTableStore {
    pool: PgPool,
}

impl PgTableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        password: Option<&str>,
        acquire_timeout: Duration,
    ) -> DbResult<Self> {
        log::info!("Connecting to PostgreSQL at {}", descriptor);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(acquire_timeout)
            .connect_with(descriptor.connect_options(password))
            .await
            .map_err(|source| DbError::Connection {
                target: descriptor.to_string(),
                source,
            })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn select_page_sql(query: &PageQuery) -> String {
    let as_text = |columns: &[String]| {
        columns
            .iter()
            .map(|c| format!("{}::text", quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    // json has no ordering operator, so the all-column fallback sorts on text
    let order = if query.order_by.is_empty() {
        as_text(&query.columns)
    } else {
        column_list(&query.order_by)
    };
    format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT $1 OFFSET $2",
        as_text(&query.columns),
        quote_identifier(&query.table),
        order
    )
}

/// INSERT that reads text values from a JSON array and casts each one to
/// `(column, type)`'s declared type
fn insert_sql(table: &str, typed_columns: &[(String, String)]) -> String {
    let names: Vec<String> = typed_columns.iter().map(|(c, _)| c.clone()).collect();
    let casts = typed_columns
        .iter()
        .map(|(c, type_name)| format!("r.{}::{}", quote_identifier(c), type_name))
        .collect::<Vec<_>>()
        .join(", ");
    let record = typed_columns
        .iter()
        .map(|(c, _)| format!("{} text", quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM json_to_recordset($1::json) AS r({})",
        quote_identifier(table),
        column_list(&names),
        casts,
        record
    )
}

fn rows_to_json(columns: &[String], rows: &[ImportRow]) -> String {
    let records = rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = columns
                .iter()
                .zip(row)
                .map(|(column, value)| {
                    let value = value.clone().map(Value::String).unwrap_or(Value::Null);
                    (column.clone(), value)
                })
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(records).to_string()
}

async fn column_types(
    conn: &mut PgConnection,
    table: &str,
    columns: &[String],
) -> DbResult<Vec<(String, String)>> {
    let rows = sqlx::query(
        "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
         FROM pg_attribute a
         WHERE a.attrelid = $1::regclass AND a.attnum > 0 AND NOT a.attisdropped",
    )
    .bind(quote_identifier(table))
    .fetch_all(&mut *conn)
    .await?;

    let mut types = HashMap::with_capacity(rows.len());
    for row in rows {
        types.insert(row.try_get::<String, _>(0)?, row.try_get::<String, _>(1)?);
    }

    columns
        .iter()
        .map(|column| match types.remove(column) {
            Some(type_name) => Ok((column.clone(), type_name)),
            None => Err(DbError::UnknownColumn {
                table: table.to_string(),
                column: column.clone(),
            }),
        })
        .collect()
}

/// Move every sequence owned by `table` past the largest imported value
async fn reset_sequences(conn: &mut PgConnection, table: &str) -> DbResult<()> {
    let quoted = quote_identifier(table);
    let owned = sqlx::query(
        "SELECT a.attname::text, pg_get_serial_sequence($1, a.attname)
         FROM pg_attribute a
         WHERE a.attrelid = $1::regclass AND a.attnum > 0 AND NOT a.attisdropped
           AND pg_get_serial_sequence($1, a.attname) IS NOT NULL",
    )
    .bind(&quoted)
    .fetch_all(&mut *conn)
    .await?;

    for row in owned {
        let column: String = row.try_get(0)?;
        let sequence: String = row.try_get(1)?;
        log::debug!("Resetting sequence {} for {}.{}", sequence, table, column);
        sqlx::query(&format!(
            "SELECT setval($1::regclass, COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
            quote_identifier(&column),
            quoted
        ))
        .bind(&sequence)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_table(conn: &mut PgConnection, table: &TableRows) -> DbResult<u64> {
    let typed_columns = column_types(conn, &table.table, &table.columns).await?;
    let sql = insert_sql(&table.table, &typed_columns);

    let mut inserted = 0;
    for chunk in table.rows.chunks(INSERT_CHUNK_SIZE) {
        let result = sqlx::query(&sql)
            .bind(rows_to_json(&table.columns, chunk))
            .execute(&mut *conn)
            .await?;
        inserted += result.rows_affected();
    }

    reset_sequences(conn, &table.table).await?;
    Ok(inserted)
}

/// Repeatable-read, read-only transaction
struct PgSnapshot {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Snapshot for PgSnapshot {
    async fn fetch_page(&mut self, query: &PageQuery) -> DbResult<Vec<ExportRecord>> {
        let sql = select_page_sql(query);
        let rows = sqlx::query(&sql)
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<ExportRecord> {
                let values = (0..query.columns.len())
                    .map(|i| row.try_get::<Option<String>, _>(i).map(FieldValue::from))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ExportRecord::new(values))
            })
            .collect()
    }
}

#[async_trait]
impl TableStore for PgTableStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn table_columns(&self, table: &str) -> DbResult<Vec<String>> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT column_name::text FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name = $1
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        table_not_found_if_empty(table, columns)
    }

    async fn primary_key(&self, table: &str) -> DbResult<Vec<String>> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT a.attname::text
             FROM pg_index i
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
             WHERE i.indrelid = $1::regclass AND i.indisprimary
             ORDER BY array_position(i.indkey::int2[], a.attnum)",
        )
        .bind(quote_identifier(table))
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }

    async fn snapshot(&self) -> DbResult<Box<dyn Snapshot>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgSnapshot { tx }))
    }

    async fn replace_tables(&self, batch: &[TableRows]) -> Result<Vec<u64>, TableWriteError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(TableWriteError::outside_table)?;

        // Children first, and no CASCADE: a table referenced from outside the
        // batch makes its DELETE fail instead of emptying the referencing table
        for table in batch.iter().rev() {
            sqlx::query(&format!("DELETE FROM {}", quote_identifier(&table.table)))
                .execute(&mut *tx)
                .await
                .map_err(|e| TableWriteError::in_table(&table.table, e))?;
        }

        let mut counts = Vec::with_capacity(batch.len());
        for table in batch {
            let inserted = load_table(&mut *tx, table)
                .await
                .map_err(|e| TableWriteError::in_table(&table.table, e))?;
            counts.push(inserted);
        }

        tx.commit().await.map_err(TableWriteError::outside_table)?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgConnectOptions;
    use std::str::FromStr;

    #[test]
    fn test_select_page_sql() {
        let query = PageQuery {
            table: "courses".to_string(),
            columns: vec!["id".to_string(), "active".to_string()],
            order_by: vec!["id".to_string()],
            offset: 0,
            limit: 1000,
        };
        assert_eq!(
            select_page_sql(&query),
            "SELECT \"id\"::text, \"active\"::text FROM \"courses\" ORDER BY \"id\" LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn test_select_page_sql_without_key_sorts_on_text() {
        let query = PageQuery {
            table: "asset_users".to_string(),
            columns: vec!["asset_id".to_string(), "user_id".to_string()],
            order_by: vec![],
            offset: 0,
            limit: 10,
        };
        assert_eq!(
            select_page_sql(&query),
            "SELECT \"asset_id\"::text, \"user_id\"::text FROM \"asset_users\" \
             ORDER BY \"asset_id\"::text, \"user_id\"::text LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn test_insert_sql_casts_to_column_types() {
        let columns = vec![
            ("id".to_string(), "integer".to_string()),
            ("canvas_apps".to_string(), "json".to_string()),
        ];
        assert_eq!(
            insert_sql("canvas", &columns),
            "INSERT INTO \"canvas\" (\"id\", \"canvas_apps\") \
             SELECT r.\"id\"::integer, r.\"canvas_apps\"::json \
             FROM json_to_recordset($1::json) AS r(\"id\" text, \"canvas_apps\" text)"
        );
    }

    #[test]
    fn test_rows_to_json_keeps_null_apart_from_empty() {
        let columns = vec!["id".to_string(), "name".to_string(), "body".to_string()];
        let rows = vec![
            vec![Some("1".to_string()), Some("Ada".to_string()), Some(String::new())],
            vec![Some("2".to_string()), None, Some("{\"a\":1}".to_string())],
        ];
        let json: Value = serde_json::from_str(&rows_to_json(&columns, &rows)).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"id": "1", "name": "Ada", "body": ""},
                {"id": "2", "name": null, "body": "{\"a\":1}"}
            ])
        );
    }

    // The tests below need a server. They run when SUITEC_TEST_DATABASE_URL
    // is set and each one works inside its own throwaway schema.

    const TEST_DATABASE_URL: &str = "SUITEC_TEST_DATABASE_URL";

    struct TestSchema {
        admin: PgPool,
        name: String,
        store: PgTableStore,
    }

    impl TestSchema {
        async fn create() -> Option<Self> {
            let url = match std::env::var(TEST_DATABASE_URL) {
                Ok(url) => url,
                Err(_) => {
                    eprintln!("{} is not set, skipping PostgreSQL test", TEST_DATABASE_URL);
                    return None;
                }
            };

            let admin = PgPool::connect(&url).await.unwrap();
            let name = format!("suitec_test_{}", uuid::Uuid::new_v4().simple());
            sqlx::query(&format!("CREATE SCHEMA {}", quote_identifier(&name)))
                .execute(&admin)
                .await
                .unwrap();

            let options = PgConnectOptions::from_str(&url)
                .unwrap()
                .options([("search_path", name.as_str())]);
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await
                .unwrap();

            Some(Self {
                admin,
                name,
                store: PgTableStore::new(pool),
            })
        }

        async fn execute(&self, sql: &str) {
            sqlx::query(sql).execute(self.store.pool()).await.unwrap();
        }

        async fn drop_schema(self) {
            self.store.pool().close().await;
            sqlx::query(&format!("DROP SCHEMA {} CASCADE", quote_identifier(&self.name)))
                .execute(&self.admin)
                .await
                .unwrap();
        }
    }

    fn rows(table: &str, columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> TableRows {
        TableRows {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_replace_tables_stores_typed_values() {
        let Some(schema) = TestSchema::create().await else {
            return;
        };
        schema
            .execute(
                "CREATE TABLE canvas (
                    id serial PRIMARY KEY,
                    canvas_apps json,
                    settings jsonb,
                    use_https boolean NOT NULL,
                    created_at timestamptz,
                    logo_url text NOT NULL,
                    api_key text
                )",
            )
            .await;

        schema
            .store
            .replace_tables(&[rows(
                "canvas",
                &["id", "canvas_apps", "settings", "use_https", "created_at", "logo_url", "api_key"],
                vec![vec![
                    Some("1"),
                    Some("{\"apps\": [1, 2]}"),
                    Some("{\"theme\": \"dark\"}"),
                    Some("true"),
                    Some("2024-05-01 10:00:00+00"),
                    Some(""),
                    None,
                ]],
            )])
            .await
            .unwrap();

        let stored: (String, String, String, bool, i64, String, bool) = sqlx::query_as(
            "SELECT json_typeof(canvas_apps), jsonb_typeof(settings), settings->>'theme',
                    use_https, EXTRACT(EPOCH FROM created_at)::bigint, logo_url, api_key IS NULL
             FROM canvas",
        )
        .fetch_one(schema.store.pool())
        .await
        .unwrap();
        assert_eq!(
            stored,
            (
                "object".to_string(),
                "object".to_string(),
                "dark".to_string(),
                true,
                1_714_557_600,
                String::new(),
                true
            )
        );

        let columns = schema.store.table_columns("canvas").await.unwrap();
        let mut snapshot = schema.store.snapshot().await.unwrap();
        let page = snapshot
            .fetch_page(&PageQuery {
                table: "canvas".to_string(),
                columns,
                order_by: vec!["id".to_string()],
                offset: 0,
                limit: 10,
            })
            .await
            .unwrap();
        drop(snapshot);
        assert_eq!(page[0].values[1], FieldValue::from("{\"apps\": [1, 2]}"));
        assert_eq!(page[0].values[5], FieldValue::from(""));
        assert_eq!(page[0].values[6], FieldValue::Null);

        schema.drop_schema().await;
    }

    #[tokio::test]
    async fn test_failed_child_leaves_parent_and_child_unchanged() {
        let Some(schema) = TestSchema::create().await else {
            return;
        };
        schema
            .execute("CREATE TABLE courses (id integer PRIMARY KEY, name text)")
            .await;
        schema
            .execute(
                "CREATE TABLE assets (id integer PRIMARY KEY,
                    course_id integer REFERENCES courses (id), title text NOT NULL)",
            )
            .await;
        schema.execute("INSERT INTO courses VALUES (1, 'Kept')").await;
        schema.execute("INSERT INTO assets VALUES (10, 1, 'Kept asset')").await;

        let courses = rows("courses", &["id", "name"], vec![vec![Some("2"), Some("New")]]);
        let bad_assets = rows(
            "assets",
            &["id", "course_id", "title"],
            vec![vec![Some("20"), Some("2"), None]],
        );

        let err = schema
            .store
            .replace_tables(&[courses.clone(), bad_assets])
            .await
            .unwrap_err();
        assert_eq!(err.table.as_deref(), Some("assets"));

        // Retrying without the failed child: the parent DELETE is refused
        // instead of cascading into assets
        let err = schema.store.replace_tables(&[courses]).await.unwrap_err();
        assert_eq!(err.table.as_deref(), Some("courses"));

        let courses: Vec<String> = sqlx::query_scalar("SELECT name FROM courses")
            .fetch_all(schema.store.pool())
            .await
            .unwrap();
        let assets: Vec<String> = sqlx::query_scalar("SELECT title FROM assets")
            .fetch_all(schema.store.pool())
            .await
            .unwrap();
        assert_eq!(courses, vec!["Kept"]);
        assert_eq!(assets, vec!["Kept asset"]);

        schema.drop_schema().await;
    }

    #[tokio::test]
    async fn test_sequence_continues_after_imported_ids() {
        let Some(schema) = TestSchema::create().await else {
            return;
        };
        schema
            .execute("CREATE TABLE categories (id serial PRIMARY KEY, title text)")
            .await;

        schema
            .store
            .replace_tables(&[rows(
                "categories",
                &["id", "title"],
                vec![vec![Some("7"), Some("a")], vec![Some("42"), Some("b")]],
            )])
            .await
            .unwrap();

        let next: i32 = sqlx::query_scalar("INSERT INTO categories (title) VALUES ('c') RETURNING id")
            .fetch_one(schema.store.pool())
            .await
            .unwrap();
        assert_eq!(next, 43);

        schema.drop_schema().await;
    }

    #[tokio::test]
    async fn test_snapshot_pages_ignore_later_writes() {
        let Some(schema) = TestSchema::create().await else {
            return;
        };
        schema
            .execute("CREATE TABLE users (id integer PRIMARY KEY, name text)")
            .await;
        schema
            .execute("INSERT INTO users VALUES (2, 'b'), (3, 'c')")
            .await;

        let page = |offset| PageQuery {
            table: "users".to_string(),
            columns: vec!["id".to_string(), "name".to_string()],
            order_by: vec!["id".to_string()],
            offset,
            limit: 1,
        };
        let mut snapshot = schema.store.snapshot().await.unwrap();
        let first = snapshot.fetch_page(&page(0)).await.unwrap();
        schema.execute("INSERT INTO users VALUES (1, 'a')").await;
        let second = snapshot.fetch_page(&page(1)).await.unwrap();
        drop(snapshot);

        assert_eq!(first[0].values[0], FieldValue::from("2"));
        assert_eq!(second[0].values[0], FieldValue::from("3"));

        schema.drop_schema().await;
    }
}
