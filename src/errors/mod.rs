mod error;

pub use error::{ConfigError, DbError, ExportError, ImportError, SyncError, TableWriteError};

/// Result type for configuration and validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for whole pull/push runs
pub type SyncResult<T> = Result<T, SyncError>;
