use crate::domains::export::types::TableExportSummary;
use crate::errors::{ExportError, ExportResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostnameRewriteEntry {
    pub from: String,
    pub to: String,
}

/// Describes the CSV files written by one pull run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub source: Option<String>,
    pub canvas_hostname_filter: Option<String>,
    pub hostname_rewrite: Option<HostnameRewriteEntry>,
    pub tables: Vec<TableExportSummary>,
    /// Tables the run tried and failed to export
    #[serde(default)]
    pub failed: Vec<String>,
}

impl Manifest {
    pub fn new(
        source: Option<String>,
        canvas_hostname_filter: Option<String>,
        hostname_rewrite: Option<HostnameRewriteEntry>,
        tables: Vec<TableExportSummary>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            exported_at: Utc::now(),
            source,
            canvas_hostname_filter,
            hostname_rewrite,
            tables,
            failed: Vec::new(),
        }
    }

    pub fn with_failed(mut self, failed: Vec<String>) -> Self {
        self.failed = failed;
        self
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn entry(&self, table: &str) -> Option<&TableExportSummary> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Atomically replace the manifest in `dir`
    pub fn write_to(&self, dir: &Path) -> ExportResult<PathBuf> {
        let path = Self::path_in(dir);
        let json = serde_json::to_vec_pretty(self).map_err(|e| ExportError::Manifest {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let io_error = |source: std::io::Error| ExportError::Io {
            path: path.clone(),
            source,
        };
        let mut file = tempfile::Builder::new()
            .prefix("manifest.")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(io_error)?;
        file.write_all(&json).map_err(io_error)?;
        file.write_all(b"\n").map_err(io_error)?;
        file.as_file().sync_all().map_err(io_error)?;
        file.persist(&path).map_err(|e| io_error(e.error))?;
        Ok(path)
    }

    /// Delete the manifest in `dir` if there is one
    pub fn remove_from(dir: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(Self::path_in(dir)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Read the manifest in `dir`, `None` when there is none
    pub fn read_from(dir: &Path) -> Result<Option<Self>, String> {
        let path = Self::path_in(dir);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("{}: {}", path.display(), e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| format!("{}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(table: &str) -> TableExportSummary {
        TableExportSummary {
            table: table.to_string(),
            file: format!("{}.csv", table),
            rows: 3,
            rows_filtered: 1,
            bytes: 42,
            sha256: "ab".repeat(32),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(
            Some("svc@db.internal:5432/prod".to_string()),
            Some("canvas.old.edu".to_string()),
            Some(HostnameRewriteEntry {
                from: "canvas.old.edu".to_string(),
                to: "canvas.new.edu".to_string(),
            }),
            vec![summary("courses"), summary("users")],
        );

        let path = manifest.write_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("manifest.json"));

        let read = Manifest::read_from(dir.path()).unwrap().unwrap();
        assert_eq!(read, manifest);
        assert_eq!(read.entry("users").unwrap().rows, 3);
        assert!(read.entry("canvas").is_none());

        // No temporary files left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_and_corrupt_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::read_from(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(MANIFEST_FILE), "{ not json").unwrap();
        assert!(Manifest::read_from(dir.path()).is_err());

        Manifest::remove_from(dir.path()).unwrap();
        assert!(!dir.path().join(MANIFEST_FILE).exists());
        Manifest::remove_from(dir.path()).unwrap();
    }

    #[test]
    fn test_manifest_without_failed_list_still_reads() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(None, None, None, vec![summary("courses")])
            .with_failed(vec!["users".to_string()]);
        manifest.write_to(dir.path()).unwrap();
        assert_eq!(Manifest::read_from(dir.path()).unwrap().unwrap().failed, vec!["users"]);

        let mut json: serde_json::Value = serde_json::to_value(&manifest).unwrap();
        json.as_object_mut().unwrap().remove("failed");
        std::fs::write(dir.path().join(MANIFEST_FILE), json.to_string()).unwrap();
        let read = Manifest::read_from(dir.path()).unwrap().unwrap();
        assert!(read.failed.is_empty());
        assert_eq!(read.tables.len(), 1);
    }
}
