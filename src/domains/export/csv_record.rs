use crate::types::{ExportRecord, FieldValue};

/// Trait for rows that can be written as one CSV record
pub trait CsvRecord {
    /// Convert to CSV row
    fn to_csv(&self) -> Vec<String>;
}

impl CsvRecord for ExportRecord {
    fn to_csv(&self) -> Vec<String> {
        self.values.iter().map(FieldValue::to_csv_field).collect()
    }
}

/// Keep a record only if its hostname column holds exactly `hostname`.
/// NULL and non-text values never match.
pub fn matches_hostname(record: &ExportRecord, column_index: usize, hostname: &str) -> bool {
    record
        .get(column_index)
        .and_then(FieldValue::as_text)
        .map_or(false, |value| value == hostname)
}
