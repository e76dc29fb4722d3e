use crate::domains::export::types::CsvConfig;
use crate::domains::rewrite::HostnameRewriteRule;
use crate::types::FailurePolicy;
use std::path::PathBuf;

/// Options for one push run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub input_dir: PathBuf,
    pub rewrite: Option<HostnameRewriteRule>,
    /// Force course rows inactive (`-i`)
    pub mark_inactive: bool,
    pub failure_policy: FailurePolicy,
    pub csv: CsvConfig,
    /// Check files against the manifest's checksums when one is present
    pub verify_checksums: bool,
}

impl ImportOptions {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            rewrite: None,
            mark_inactive: false,
            failure_policy: FailurePolicy::FailFast,
            csv: CsvConfig::default(),
            verify_checksums: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableImportSummary {
    pub table: String,
    pub rows: u64,
    pub marked_inactive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub tables: Vec<TableImportSummary>,
    /// Selected tables with no CSV file in the input directory
    pub skipped: Vec<String>,
    pub failures: Vec<(String, String)>,
    pub duration_ms: u64,
}

impl ImportSummary {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}
