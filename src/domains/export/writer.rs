use crate::domains::export::csv_record::CsvRecord;
use crate::domains::export::types::CsvConfig;
use crate::errors::{ExportError, ExportResult};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write adapter that hashes and counts everything passing through
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Returns the inner writer and the hex SHA-256 of what was written
    pub fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// SHA-256 of a file on disk, hex encoded
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// What a finished table file looks like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub rows: u64,
    pub bytes: u64,
    pub sha256: String,
}

/// Writes one table to `<dir>/<table>.csv`.
///
/// Rows go to a temporary file next to the target, renamed into place by
/// `finish`. Dropping the writer without finishing removes the temporary file
/// and leaves any previous `<table>.csv` untouched.
pub struct TableCsvWriter {
    table: String,
    path: PathBuf,
    writer: csv::Writer<HashingWriter<NamedTempFile>>,
    rows: u64,
}

impl TableCsvWriter {
    pub fn create(
        dir: &Path,
        table: &str,
        file_name: &str,
        columns: &[String],
        config: CsvConfig,
    ) -> ExportResult<Self> {
        let path = dir.join(file_name);
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|source| ExportError::Io {
                path: path.clone(),
                source,
            })?;

        let writer = csv::WriterBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote_char)
            .has_headers(false)
            .from_writer(HashingWriter::new(temp));

        let mut table_writer = Self {
            table: table.to_string(),
            path,
            writer,
            rows: 0,
        };
        table_writer
            .writer
            .write_record(columns)
            .map_err(|e| table_writer.serialization_error(e))?;
        Ok(table_writer)
    }

    fn serialization_error(&self, source: csv::Error) -> ExportError {
        ExportError::Serialization {
            table: self.table.clone(),
            path: self.path.clone(),
            source,
        }
    }

    pub fn write_record<R: CsvRecord>(&mut self, record: &R) -> ExportResult<()> {
        let row = record.to_csv();
        self.writer
            .write_record(&row)
            .map_err(|e| self.serialization_error(e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> ExportResult<WrittenFile> {
        let io_error = |path: &Path, source: io::Error| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };

        self.writer
            .flush()
            .map_err(|e| io_error(&self.path, e))?;
        let hashing = self
            .writer
            .into_inner()
            .map_err(|e| io_error(&self.path, e.into_error()))?;
        let bytes = hashing.bytes_written();
        let (temp, sha256) = hashing.finish();

        temp.as_file()
            .sync_all()
            .map_err(|e| io_error(&self.path, e))?;
        temp.persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;

        Ok(WrittenFile {
            path: self.path,
            rows: self.rows,
            bytes,
            sha256,
        })
    }
}
