use crate::database::{TableRows, TableStore};
use crate::domains::catalog::{TableSelection, TableSpec};
use crate::domains::export::manifest::Manifest;
use crate::domains::export::writer::file_sha256;
use crate::domains::import::reader::{read_table_csv, CsvTable};
use crate::domains::import::types::{ImportOptions, ImportSummary, TableImportSummary};
use crate::errors::{ImportError, ImportResult, SyncError, SyncResult, TableWriteError};
use crate::types::{decode_csv_field, FailurePolicy, ImportRow};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Where a prepared table came from, for logs and the summary
struct SourceFile {
    path: PathBuf,
    marked_inactive: bool,
}

fn write_error(e: TableWriteError) -> ImportError {
    match e {
        TableWriteError {
            table: Some(table),
            source,
        } => ImportError::Database { table, source },
        other => ImportError::Transaction(other),
    }
}

/// Loads CSV files into a destination database, replacing table contents
pub struct Importer {
    store: Arc<dyn TableStore>,
    options: ImportOptions,
}

impl Importer {
    pub fn new(store: Arc<dyn TableStore>, options: ImportOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Import every selected table.
    ///
    /// All files are read and checked before the destination is touched, then
    /// every table is replaced in one transaction. Under `KeepGoing` a table
    /// the database rejects is dropped from the batch and the rest retried.
    pub async fn import_all(&self, selection: &TableSelection) -> SyncResult<ImportSummary> {
        let start = Instant::now();
        let input_dir = &self.options.input_dir;
        if !input_dir.is_dir() {
            return Err(SyncError::FileIo {
                path: input_dir.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "CSV directory does not exist",
                ),
            });
        }

        let manifest = if self.options.verify_checksums {
            Manifest::read_from(input_dir).map_err(|reason| ImportError::Manifest {
                path: Manifest::path_in(input_dir),
                reason,
            })?
        } else {
            None
        };
        match &manifest {
            Some(m) => log::info!(
                "Found manifest for run {} exported at {}",
                m.run_id,
                m.exported_at
            ),
            None if self.options.verify_checksums => {
                log::warn!("No manifest in {}, checksums not verified", input_dir.display())
            }
            None => {}
        }

        log::info!(
            "Importing {} tables from {} into {}",
            selection.len(),
            input_dir.display(),
            self.store.backend_name()
        );

        let mut summary = ImportSummary::default();
        let mut batch = Vec::new();
        let mut sources = Vec::new();
        for table in &selection.tables {
            let path = input_dir.join(table.csv_file_name());
            if !path.is_file() {
                log::warn!("Skipping {}: {} not found", table.name, path.display());
                summary.skipped.push(table.name.clone());
                continue;
            }

            match self.prepare_table(table, manifest.as_ref()).await {
                Ok((rows, source)) => {
                    batch.push(rows);
                    sources.push(source);
                }
                Err(e) => match self.options.failure_policy {
                    FailurePolicy::FailFast => return Err(e.into()),
                    FailurePolicy::KeepGoing => {
                        log::error!("{} (continuing)", e);
                        summary.failures.push((table.name.clone(), e.to_string()));
                    }
                },
            }
        }

        while !batch.is_empty() {
            match self.write(&batch, &sources).await {
                Ok(tables) => {
                    summary.tables = tables;
                    break;
                }
                Err(e) => {
                    let index = match (self.options.failure_policy, &e.table) {
                        (FailurePolicy::KeepGoing, Some(failed)) => {
                            batch.iter().position(|rows| &rows.table == failed)
                        }
                        _ => None,
                    };
                    let Some(index) = index else {
                        return Err(write_error(e).into());
                    };
                    let e = write_error(e);
                    log::error!("{} (retrying without it)", e);
                    let failed = batch.remove(index);
                    sources.remove(index);
                    summary.failures.push((failed.table, e.to_string()));
                }
            }
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
            "Imported {} rows across {} tables in {} ms ({} skipped)",
            summary.total_rows(),
            summary.tables.len(),
            summary.duration_ms,
            summary.skipped.len()
        );
        Ok(summary)
    }

    /// Import one table. Its destination contents are only replaced when every
    /// row is accepted.
    pub async fn import_table(
        &self,
        table: &TableSpec,
        manifest: Option<&Manifest>,
    ) -> ImportResult<TableImportSummary> {
        let (rows, source) = self.prepare_table(table, manifest).await?;
        let mut written = self.write(&[rows], &[source]).await.map_err(write_error)?;
        Ok(written.remove(0))
    }

    async fn write(
        &self,
        batch: &[TableRows],
        sources: &[SourceFile],
    ) -> Result<Vec<TableImportSummary>, TableWriteError> {
        let counts = self.store.replace_tables(batch).await?;

        Ok(batch
            .iter()
            .zip(sources)
            .zip(counts)
            .map(|((rows, source), imported)| {
                log::info!(
                    "Imported {} rows into {} from {}{}",
                    imported,
                    rows.table,
                    source.path.display(),
                    if source.marked_inactive { " (marked inactive)" } else { "" }
                );
                TableImportSummary {
                    table: rows.table.clone(),
                    rows: imported,
                    marked_inactive: source.marked_inactive,
                }
            })
            .collect())
    }

    /// Verify, read and convert one CSV file without touching the destination
    async fn prepare_table(
        &self,
        table: &TableSpec,
        manifest: Option<&Manifest>,
    ) -> ImportResult<(TableRows, SourceFile)> {
        let path = self.options.input_dir.join(table.csv_file_name());

        if let Some(manifest) = manifest {
            let Some(entry) = manifest.entry(&table.name) else {
                let reason = if manifest.failed.contains(&table.name) {
                    format!("export failed in run {}, the file is older", manifest.run_id)
                } else {
                    format!("not listed in manifest.json of run {}", manifest.run_id)
                };
                return Err(ImportError::table_import(&table.name, &path, reason));
            };
            let actual = file_sha256(&path).map_err(|source| ImportError::Io {
                path: path.clone(),
                source,
            })?;
            if !actual.eq_ignore_ascii_case(&entry.sha256) {
                return Err(ImportError::ChecksumMismatch {
                    path,
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            log::debug!("Checksum ok for {}", path.display());
        }

        let CsvTable { mut columns, rows } = read_table_csv(&path, &table.name, self.options.csv)?;

        let destination = self
            .store
            .table_columns(&table.name)
            .await
            .map_err(|source| ImportError::Database {
                table: table.name.clone(),
                source,
            })?;
        check_header(&table.name, &path, &columns, &destination)?;

        let mut rows: Vec<ImportRow> = rows
            .into_iter()
            .map(|row| self.convert_row(row))
            .collect();

        let marked_inactive = self.options.mark_inactive
            && self.mark_inactive(table, &destination, &mut columns, &mut rows);

        Ok((
            TableRows {
                table: table.name.clone(),
                columns,
                rows,
            },
            SourceFile {
                path,
                marked_inactive,
            },
        ))
    }

    /// `\N` fields become NULL; the rest go through the rewrite rule
    fn convert_row(&self, row: Vec<String>) -> ImportRow {
        row.into_iter()
            .map(|field| {
                let value = decode_csv_field(&field)?;
                match &self.options.rewrite {
                    Some(rule) => Some(rule.rewrite(&value).into_owned()),
                    None => Some(value),
                }
            })
            .collect()
    }

    /// Force the table's status column to its inactive value. Returns false when
    /// the table has no status column to set.
    fn mark_inactive(
        &self,
        table: &TableSpec,
        destination: &[String],
        columns: &mut Vec<String>,
        rows: &mut [ImportRow],
    ) -> bool {
        let Some(status) = &table.status_column else {
            return false;
        };
        let inactive = Some(status.inactive_value.clone());

        match columns.iter().position(|c| c == &status.column) {
            Some(index) => {
                for row in rows.iter_mut() {
                    row[index] = inactive.clone();
                }
                true
            }
            None if destination.contains(&status.column) => {
                columns.push(status.column.clone());
                for row in rows.iter_mut() {
                    row.push(inactive.clone());
                }
                true
            }
            None => {
                log::warn!(
                    "Cannot mark {} inactive: no column '{}'",
                    table.name,
                    status.column
                );
                false
            }
        }
    }
}

fn check_header(
    table: &str,
    path: &Path,
    columns: &[String],
    destination: &[String],
) -> ImportResult<()> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(ImportError::table_import(
                table,
                path,
                format!("duplicate column '{}' in header", column),
            ));
        }
        if !destination.contains(column) {
            return Err(ImportError::table_import(
                table,
                path,
                format!("column '{}' does not exist in the destination table", column),
            ));
        }
    }
    Ok(())
}
