use crate::database::{stream_table, TableStore};
use crate::domains::catalog::{TableSelection, TableSpec};
use crate::domains::export::csv_record::matches_hostname;
use crate::domains::export::manifest::{HostnameRewriteEntry, Manifest};
use crate::domains::export::scope::HostnameScope;
use crate::domains::export::types::{ExportOptions, ExportSummary, TableExportSummary};
use crate::domains::export::writer::TableCsvWriter;
use crate::errors::{DbError, ExportError, ExportResult, SyncError, SyncResult};
use crate::types::{ExportRecord, FailurePolicy, FieldValue};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Which rows of a table a pull keeps
enum RowFilter<'a> {
    All,
    Hostname { index: usize, hostname: &'a str },
    Parent { index: usize, keys: &'a HashSet<String> },
}

impl RowFilter<'_> {
    fn keeps(&self, record: &ExportRecord) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Hostname { index, hostname } => matches_hostname(record, *index, hostname),
            // NULL references no parent
            RowFilter::Parent { index, keys } => record
                .get(*index)
                .and_then(FieldValue::as_key)
                .map_or(false, |key| keys.contains(&key)),
        }
    }
}

fn column_index(table: &TableSpec, columns: &[String], column: &str) -> ExportResult<usize> {
    columns
        .iter()
        .position(|c| c == column)
        .ok_or_else(|| ExportError::MissingColumn {
            table: table.name.clone(),
            column: column.to_string(),
        })
}

fn row_filter<'a>(
    table: &TableSpec,
    columns: &[String],
    scope: Option<&'a HostnameScope>,
) -> ExportResult<RowFilter<'a>> {
    let Some(scope) = scope else {
        return Ok(RowFilter::All);
    };

    if let Some(column) = &table.hostname_column {
        return Ok(RowFilter::Hostname {
            index: column_index(table, columns, column)?,
            hostname: scope.hostname(),
        });
    }

    if let Some(parent) = &table.parent {
        let keys = scope
            .parent_keys(parent)
            .ok_or_else(|| ExportError::ParentNotExported {
                table: table.name.clone(),
                parent: parent.table.clone(),
            })?;
        return Ok(RowFilter::Parent {
            index: column_index(table, columns, &parent.column)?,
            keys,
        });
    }

    Ok(RowFilter::All)
}

/// Pulls selected tables out of a source database into CSV files
pub struct Exporter {
    store: Arc<dyn TableStore>,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(store: Arc<dyn TableStore>, options: ExportOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export every selected table in order, then write the manifest.
    ///
    /// A manifest left by an earlier run is removed first, and a manifest for
    /// this run is written even when a table failed, listing only the files
    /// this run produced.
    pub async fn export_all(&self, selection: &TableSelection) -> SyncResult<ExportSummary> {
        let start = Instant::now();
        let output_dir = &self.options.output_dir;
        std::fs::create_dir_all(output_dir).map_err(|source| SyncError::FileIo {
            path: output_dir.clone(),
            source,
        })?;
        Manifest::remove_from(output_dir).map_err(|source| SyncError::FileIo {
            path: Manifest::path_in(output_dir),
            source,
        })?;

        log::info!(
            "Exporting {} tables from {} into {}",
            selection.len(),
            self.store.backend_name(),
            output_dir.display()
        );
        let mut scope = selection.canvas_hostname_filter.as_deref().map(|hostname| {
            log::info!("Only keeping Canvas rows for {}", hostname);
            HostnameScope::new(hostname, &selection.tables)
        });

        let mut summary = ExportSummary::default();
        let mut aborted = None;
        for table in &selection.tables {
            match self.export_table(table, scope.as_mut()).await {
                Ok(table_summary) => summary.tables.push(table_summary),
                Err(e) => {
                    summary.failures.push((table.name.clone(), e.to_string()));
                    match self.options.failure_policy {
                        FailurePolicy::FailFast => {
                            aborted = Some(e);
                            break;
                        }
                        FailurePolicy::KeepGoing => log::error!("{} (continuing)", e),
                    }
                }
            }
        }

        let manifest = Manifest::new(
            self.options.source.clone(),
            selection.canvas_hostname_filter.clone(),
            self.options.rewrite.as_ref().map(|rule| HostnameRewriteEntry {
                from: rule.match_host().to_string(),
                to: rule.replacement_host().to_string(),
            }),
            summary.tables.clone(),
        )
        .with_failed(summary.failures.iter().map(|(t, _)| t.clone()).collect());
        let manifest_path = manifest.write_to(output_dir)?;
        log::debug!("Wrote manifest {}", manifest_path.display());

        if let Some(e) = aborted {
            return Err(e.into());
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;

        if !summary.failures.is_empty() {
            return Err(SyncError::TablesFailed {
                failed: summary.failures.len(),
                total: selection.len(),
                tables: summary.failures.iter().map(|(t, _)| t.clone()).collect(),
            });
        }

        log::info!(
            "Exported {} rows across {} tables in {} ms",
            summary.total_rows(),
            summary.tables.len(),
            summary.duration_ms
        );
        Ok(summary)
    }

    /// Export one table. On error no new `<table>.csv` is left behind.
    ///
    /// With a `scope`, only rows belonging to its hostname are kept, and the
    /// key values children need are recorded once the table is written.
    pub async fn export_table(
        &self,
        table: &TableSpec,
        scope: Option<&mut HostnameScope>,
    ) -> ExportResult<TableExportSummary> {
        let table_error = |source: DbError| ExportError::TableExport {
            table: table.name.clone(),
            source,
        };

        // Metadata first: the snapshot may hold the only connection
        let columns = self
            .store
            .table_columns(&table.name)
            .await
            .map_err(table_error)?;
        let order_by = if table.order_by.is_empty() {
            self.store
                .primary_key(&table.name)
                .await
                .map_err(table_error)?
        } else {
            table.order_by.clone()
        };

        let filter = row_filter(table, &columns, scope.as_deref())?;
        let key_columns = match scope.as_deref() {
            Some(scope) => scope
                .key_columns(&table.name)
                .iter()
                .map(|column| -> ExportResult<(String, usize)> {
                    Ok((column.clone(), column_index(table, &columns, column)?))
                })
                .collect::<ExportResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        let mut keys: Vec<HashSet<String>> = vec![HashSet::new(); key_columns.len()];

        let mut writer = TableCsvWriter::create(
            &self.options.output_dir,
            &table.name,
            &table.csv_file_name(),
            &columns,
            self.options.csv,
        )?;

        let snapshot = self.store.snapshot().await.map_err(table_error)?;
        let mut rows = stream_table(
            snapshot,
            &table.name,
            columns,
            order_by,
            self.options.batch_size,
        );

        let mut rows_filtered = 0;
        while let Some(record) = rows.next().await {
            let record = record.map_err(table_error)?;

            if !filter.keeps(&record) {
                rows_filtered += 1;
                continue;
            }
            for ((_, index), seen) in key_columns.iter().zip(keys.iter_mut()) {
                if let Some(key) = record.get(*index).and_then(FieldValue::as_key) {
                    seen.insert(key);
                }
            }

            let record = match &self.options.rewrite {
                Some(rule) => ExportRecord::new(
                    record
                        .values
                        .into_iter()
                        .map(|value| rule.rewrite_field(value))
                        .collect(),
                ),
                None => record,
            };
            writer.write_record(&record)?;
        }

        let written = writer.finish()?;
        log::info!(
            "Exported {} rows from {} to {}{}",
            written.rows,
            table.name,
            written.path.display(),
            if rows_filtered > 0 {
                format!(" ({} rows filtered out)", rows_filtered)
            } else {
                String::new()
            }
        );

        if let Some(scope) = scope {
            for ((column, _), seen) in key_columns.into_iter().zip(keys) {
                scope.record(&table.name, &column, seen);
            }
        }

        Ok(TableExportSummary {
            table: table.name.clone(),
            file: table.csv_file_name(),
            rows: written.rows,
            rows_filtered,
            bytes: written.bytes,
            sha256: written.sha256,
        })
    }
}
