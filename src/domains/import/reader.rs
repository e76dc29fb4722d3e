use crate::domains::export::types::CsvConfig;
use crate::errors::{ImportError, ImportResult};
use std::path::Path;

/// A table file read fully into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn describe(error: &csv::Error) -> String {
    match error.kind() {
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => {
            let line = pos
                .as_ref()
                .map(|p| format!("line {}", p.line()))
                .unwrap_or_else(|| "a row".to_string());
            format!(
                "{} has {} fields but the header has {}",
                line, len, expected_len
            )
        }
        _ => error.to_string(),
    }
}

/// Read `<table>.csv` strictly: a header row, then rows of the same width
pub fn read_table_csv(path: &Path, table: &str, config: CsvConfig) -> ImportResult<CsvTable> {
    let file = std::fs::File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .quote(config.quote_char)
        .has_headers(true)
        .flexible(false)
        .from_reader(file);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::table_import(table, path, describe(&e)))?
        .iter()
        .map(|c| c.trim_start_matches('\u{feff}').to_string())
        .collect();

    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(ImportError::table_import(table, path, "missing header row"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportError::table_import(table, path, describe(&e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(CsvTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("courses.csv");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_reads_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "id,name,active\n1,\"Physics, Intro\",true\n2,,false\n",
        );

        let table = read_table_csv(&path, "courses", CsvConfig::default()).unwrap();
        assert_eq!(table.columns, vec!["id", "name", "active"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["1".to_string(), "Physics, Intro".to_string(), "true".to_string()],
                vec!["2".to_string(), String::new(), "false".to_string()],
            ]
        );
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "id,name\n");
        let table = read_table_csv(&path, "courses", CsvConfig::default()).unwrap();
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_wrong_column_count_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "id,name\n1,Physics\n2\n");

        let err = read_table_csv(&path, "courses", CsvConfig::default()).unwrap_err();
        match err {
            ImportError::TableImport { table, reason, .. } => {
                assert_eq!(table, "courses");
                assert!(reason.contains("has 1 fields but the header has 2"), "{}", reason);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "");
        assert!(read_table_csv(&path, "courses", CsvConfig::default()).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table_csv(&dir.path().join("nope.csv"), "nope", CsvConfig::default())
            .unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}
