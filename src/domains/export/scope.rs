use crate::domains::catalog::{ParentKey, TableSpec};
use std::collections::{HashMap, HashSet};

/// Rows kept by a hostname-filtered pull.
///
/// Tables with a hostname column are matched directly. Child tables keep the
/// rows whose parent column points at a parent row exported earlier in the
/// same run, so the key values of every exported parent are remembered here.
#[derive(Debug, Clone)]
pub struct HostnameScope {
    hostname: String,
    /// Parent table -> key columns its children refer to
    wanted: HashMap<String, Vec<String>>,
    exported: HashMap<(String, String), HashSet<String>>,
}

impl HostnameScope {
    pub fn new(hostname: &str, tables: &[TableSpec]) -> Self {
        let mut wanted: HashMap<String, Vec<String>> = HashMap::new();
        for parent in tables.iter().filter_map(|t| t.parent.as_ref()) {
            let keys = wanted.entry(parent.table.clone()).or_default();
            if !keys.contains(&parent.key) {
                keys.push(parent.key.clone());
            }
        }

        Self {
            hostname: hostname.to_string(),
            wanted,
            exported: HashMap::new(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Columns of `table` whose exported values children will look up
    pub fn key_columns(&self, table: &str) -> &[String] {
        self.wanted.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Key values exported for `parent`, `None` when the parent was not
    /// exported in this run
    pub fn parent_keys(&self, parent: &ParentKey) -> Option<&HashSet<String>> {
        self.exported
            .get(&(parent.table.clone(), parent.key.clone()))
    }

    pub fn record(&mut self, table: &str, column: &str, keys: HashSet<String>) {
        self.exported
            .insert((table.to_string(), column.to_string()), keys);
    }
}
