pub mod reader;
pub mod service;
pub mod types;

pub use reader::{read_table_csv, CsvTable};
pub use service::Importer;
pub use types::{ImportOptions, ImportSummary, TableImportSummary};
