//! Copy SuiteC course data between databases through CSV files.
//!
//! `pull-data` exports tables from a source database into a directory of CSV
//! files, optionally restricted to one Canvas hostname and rewriting that
//! hostname to another. `push-data` loads the files into a destination
//! database, replacing each table's contents, and can mark the imported
//! courses inactive.

// Public modules
pub mod cli;
pub mod config;
pub mod database;
pub mod domains;
pub mod errors;
pub mod types;
pub mod validation;

pub use config::Settings;
pub use database::{PgTableStore, SqliteTableStore, TableStore};
pub use errors::{SyncError, SyncResult};
