pub mod csv_record;
pub mod manifest;
pub mod scope;
pub mod service;
pub mod types;
pub mod writer;

pub use csv_record::CsvRecord;
pub use manifest::{Manifest, MANIFEST_FILE};
pub use scope::HostnameScope;
pub use service::Exporter;
pub use types::{CsvConfig, ExportOptions, ExportSummary, TableExportSummary};
pub use writer::TableCsvWriter;
