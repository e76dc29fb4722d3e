use crate::errors::{ConfigError, ConfigResult};
use crate::validation::{is_sql_identifier, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Column that marks a row active or inactive, and the value meaning "inactive"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusColumn {
    pub column: String,
    pub inactive_value: String,
}

/// Reference from a child table to the parent rows it belongs to.
///
/// With a hostname filter, a child row is exported only when its `column`
/// holds a `key` value of a parent row that was exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentKey {
    pub column: String,
    pub table: String,
    pub key: String,
}

/// One table known to the sync tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    /// Canvas tables are only processed with `-a`
    #[serde(default)]
    pub is_canvas_table: bool,
    /// Column holding the Canvas hostname a row belongs to
    #[serde(default)]
    pub hostname_column: Option<String>,
    /// Present on course records, which `-i` marks inactive
    #[serde(default)]
    pub status_column: Option<StatusColumn>,
    /// Tables without a hostname column are filtered through their parent
    #[serde(default)]
    pub parent: Option<ParentKey>,
    /// Columns giving a stable export order. When empty the primary key is
    /// used, then every column.
    #[serde(default)]
    pub order_by: Vec<String>,
}

impl TableSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_canvas_table: false,
            hostname_column: None,
            status_column: None,
            parent: None,
            order_by: Vec::new(),
        }
    }

    pub fn canvas(mut self) -> Self {
        self.is_canvas_table = true;
        self
    }

    pub fn with_hostname_column(mut self, column: &str) -> Self {
        self.hostname_column = Some(column.to_string());
        self
    }

    pub fn with_status_column(mut self, column: &str, inactive_value: &str) -> Self {
        self.status_column = Some(StatusColumn {
            column: column.to_string(),
            inactive_value: inactive_value.to_string(),
        });
        self
    }

    pub fn with_parent(mut self, column: &str, table: &str, key: &str) -> Self {
        self.parent = Some(ParentKey {
            column: column.to_string(),
            table: table.to_string(),
            key: key.to_string(),
        });
        self
    }

    pub fn ordered_by(mut self, columns: &[&str]) -> Self {
        self.order_by = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn csv_file_name(&self) -> String {
        format!("{}.csv", self.name)
    }
}

impl Validate for TableSpec {
    fn validate(&self) -> ConfigResult<()> {
        if !is_sql_identifier(&self.name) {
            return Err(ConfigError::catalog(format!(
                "'{}' is not a valid table name",
                self.name
            )));
        }

        let mut columns: Vec<&str> = self.order_by.iter().map(String::as_str).collect();
        if let Some(column) = &self.hostname_column {
            columns.push(column);
        }
        if let Some(status) = &self.status_column {
            columns.push(&status.column);
        }
        if let Some(parent) = &self.parent {
            columns.push(&parent.column);
            columns.push(&parent.key);
            if !is_sql_identifier(&parent.table) {
                return Err(ConfigError::catalog(format!(
                    "'{}' is not a valid parent table of '{}'",
                    parent.table, self.name
                )));
            }
        }
        for column in columns {
            if !is_sql_identifier(column) {
                return Err(ConfigError::catalog(format!(
                    "'{}' is not a valid column name in table '{}'",
                    column, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Ordered list of the tables the tools know about.
///
/// Order matters: imports run parents before children so foreign keys hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCatalog {
    pub tables: Vec<TableSpec>,
}

impl TableCatalog {
    pub fn new(tables: Vec<TableSpec>) -> ConfigResult<Self> {
        let catalog = Self { tables };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The SuiteC schema
    pub fn suitec() -> Self {
        Self {
            tables: vec![
                TableSpec::new("canvas")
                    .canvas()
                    .with_hostname_column("canvas_api_domain")
                    .ordered_by(&["canvas_api_domain"]),
                TableSpec::new("courses")
                    .with_hostname_column("canvas_api_domain")
                    .with_status_column("active", "false")
                    .ordered_by(&["id"]),
                TableSpec::new("users")
                    .with_parent("course_id", "courses", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("categories")
                    .with_parent("course_id", "courses", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("assets")
                    .with_parent("course_id", "courses", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("asset_categories")
                    .with_parent("asset_id", "assets", "id")
                    .ordered_by(&["asset_id", "category_id"]),
                TableSpec::new("asset_users")
                    .with_parent("asset_id", "assets", "id")
                    .ordered_by(&["asset_id", "user_id"]),
                TableSpec::new("comments")
                    .with_parent("asset_id", "assets", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("activity_types")
                    .with_parent("course_id", "courses", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("activities")
                    .with_parent("course_id", "courses", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("whiteboards")
                    .with_parent("course_id", "courses", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("whiteboard_users")
                    .with_parent("whiteboard_id", "whiteboards", "id")
                    .ordered_by(&["whiteboard_id", "user_id"]),
                TableSpec::new("whiteboard_elements")
                    .with_parent("whiteboard_id", "whiteboards", "id")
                    .ordered_by(&["id"]),
                TableSpec::new("asset_whiteboard_elements")
                    .with_parent("asset_id", "assets", "id")
                    .ordered_by(&["asset_id", "element_id"]),
            ],
        }
    }

    /// Load a catalog from a JSON file of the form `{"tables": [...]}`
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::catalog(format!("could not read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
            .map_err(|e| ConfigError::catalog(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json_str(contents: &str) -> ConfigResult<Self> {
        let catalog: TableCatalog = serde_json::from_str(contents)
            .map_err(|e| ConfigError::catalog(format!("invalid catalog JSON: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self::suitec()
    }
}

impl Validate for TableCatalog {
    fn validate(&self) -> ConfigResult<()> {
        if self.tables.is_empty() {
            return Err(ConfigError::catalog("catalog has no tables"));
        }
        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if let Some(parent) = &table.parent {
                if !seen.contains(parent.table.as_str()) {
                    return Err(ConfigError::catalog(format!(
                        "parent '{}' of table '{}' must be listed before it",
                        parent.table, table.name
                    )));
                }
            }
            if !seen.insert(table.name.as_str()) {
                return Err(ConfigError::catalog(format!(
                    "table '{}' is listed twice",
                    table.name
                )));
            }
        }
        Ok(())
    }
}
