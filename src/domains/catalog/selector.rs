use crate::domains::catalog::types::{TableCatalog, TableSpec};

/// Tables chosen for one run, in catalog order.
///
/// The hostname filter is not applied here: it restricts rows, not tables, and
/// is carried unchanged for the exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelection {
    pub tables: Vec<TableSpec>,
    pub canvas_hostname_filter: Option<String>,
}

impl TableSelection {
    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

pub fn select_tables(
    catalog: &TableCatalog,
    include_canvas_tables: bool,
    canvas_hostname_filter: Option<&str>,
) -> TableSelection {
    let tables = catalog
        .tables
        .iter()
        .filter(|t| include_canvas_tables || !t.is_canvas_table)
        .cloned()
        .collect();

    TableSelection {
        tables,
        canvas_hostname_filter: canvas_hostname_filter.map(str::to_string),
    }
}
