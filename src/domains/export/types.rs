use crate::domains::rewrite::HostnameRewriteRule;
use crate::types::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CSV dialect shared by the writer and the importer's reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote_char: u8,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
        }
    }
}

/// Options for one pull run
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub rewrite: Option<HostnameRewriteRule>,
    pub batch_size: usize,
    pub failure_policy: FailurePolicy,
    pub csv: CsvConfig,
    /// Human readable source, recorded in the manifest
    pub source: Option<String>,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            rewrite: None,
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            failure_policy: FailurePolicy::FailFast,
            csv: CsvConfig::default(),
            source: None,
        }
    }
}

/// Result of exporting one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableExportSummary {
    pub table: String,
    pub file: String,
    pub rows: u64,
    /// Rows dropped by the hostname filter
    #[serde(default)]
    pub rows_filtered: u64,
    pub bytes: u64,
    pub sha256: String,
}

/// Result of a whole pull run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub tables: Vec<TableExportSummary>,
    /// Tables that failed under `FailurePolicy::KeepGoing`, with the reason
    pub failures: Vec<(String, String)>,
    pub duration_ms: u64,
}

impl ExportSummary {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}
