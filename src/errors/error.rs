use std::path::PathBuf;
use thiserror::Error;

/// Configuration and command line errors, raised before any database access
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid connection string '{input}': {reason} (expected host:port:database:username)")]
    ConnectionStringFormat {
        input: String,
        reason: String,
    },

    #[error("Flag {flag} requires {requires}")]
    FlagCombination {
        flag: String,
        requires: String,
    },

    #[error("Invalid hostname for {flag}: '{value}'")]
    InvalidHostname {
        flag: String,
        value: String,
    },

    #[error("Table catalog error: {0}")]
    Catalog(String),

    #[error("Invalid setting {key}: {reason}")]
    Setting {
        key: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn connection_string(input: &str, reason: &str) -> Self {
        Self::ConnectionStringFormat {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn flag_combination(flag: &str, requires: &str) -> Self {
        Self::FlagCombination {
            flag: flag.to_string(),
            requires: requires.to_string(),
        }
    }

    pub fn invalid_hostname(flag: &str, value: &str) -> Self {
        Self::InvalidHostname {
            flag: flag.to_string(),
            value: value.to_string(),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }
}

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Could not connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table '{table}' has no column '{column}'")]
    UnknownColumn {
        table: String,
        column: String,
    },

    #[error("Unsupported value in column '{column}': {type_name}")]
    UnsupportedValue {
        column: String,
        type_name: String,
    },
}

/// A multi-table replacement that was rolled back, with the table whose step failed
#[derive(Debug, Error)]
#[error("{}: {source}", .table.as_deref().unwrap_or("transaction"))]
pub struct TableWriteError {
    /// `None` when the failure is not tied to one table, e.g. at commit
    pub table: Option<String>,
    #[source]
    pub source: DbError,
}

impl TableWriteError {
    pub fn in_table(table: &str, source: impl Into<DbError>) -> Self {
        Self {
            table: Some(table.to_string()),
            source: source.into(),
        }
    }

    pub fn outside_table(source: impl Into<DbError>) -> Self {
        Self {
            table: None,
            source: source.into(),
        }
    }
}

/// Errors raised while exporting tables to CSV
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export of table '{table}' failed: {source}")]
    TableExport {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Table '{table}' has no column '{column}'")]
    MissingColumn {
        table: String,
        column: String,
    },

    #[error("Could not serialize table '{table}' to {path}: {source}")]
    Serialization {
        table: String,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write manifest {path}: {reason}")]
    Manifest {
        path: PathBuf,
        reason: String,
    },

    #[error("Table '{table}' is filtered through '{parent}', which was not exported in this run")]
    ParentNotExported {
        table: String,
        parent: String,
    },
}

impl ExportError {
    pub fn table_name(&self) -> Option<&str> {
        match self {
            ExportError::TableExport { table, .. }
            | ExportError::MissingColumn { table, .. }
            | ExportError::Serialization { table, .. }
            | ExportError::ParentNotExported { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Errors raised while importing CSV files into the destination
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import of table '{table}' from {path} failed: {reason}")]
    TableImport {
        table: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Import of table '{table}' failed writing to the database: {source}")]
    Database {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Import rolled back: {0}")]
    Transaction(#[source] TableWriteError),

    #[error("Could not read manifest {path}: {reason}")]
    Manifest {
        path: PathBuf,
        reason: String,
    },

    #[error("Checksum mismatch for {path}: manifest has {expected}, file has {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImportError {
    pub fn table_import(table: &str, path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::TableImport {
            table: table.to_string(),
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        match self {
            ImportError::TableImport { table, .. } | ImportError::Database { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }
}

/// Top-level errors surfaced to the operator by the binaries
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("File error on {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} of {total} tables failed: {}", .tables.join(", "))]
    TablesFailed {
        failed: usize,
        total: usize,
        tables: Vec<String>,
    },
}

impl SyncError {
    /// Process exit code: 2 for problems detected before touching a database, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Config(_) => 2,
            _ => 1,
        }
    }
}
