pub mod catalog;
pub mod connection;
pub mod export;
pub mod import;
pub mod rewrite;

pub use catalog::{select_tables, TableCatalog, TableSelection, TableSpec};
pub use connection::ConnectionDescriptor;
pub use export::Exporter;
pub use import::Importer;
pub use rewrite::HostnameRewriteRule;
