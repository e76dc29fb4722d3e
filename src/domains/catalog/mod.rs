pub mod selector;
pub mod types;

pub use selector::{select_tables, TableSelection};
pub use types::{ParentKey, StatusColumn, TableCatalog, TableSpec};
