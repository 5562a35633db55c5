//! Batch output seam and the CSV directory sink.
//!
//! The extractor hands each page's rows to a [`BatchSink`] exactly once and
//! never looks back, which is what bounds memory to a single page. The
//! production sink writes one CSV file per batch into a dedicated directory,
//! deleting any files left over from a previous run with the same prefix so
//! stale output can't be mistaken for current output.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use tracing::{debug, info};

/// Receives one batch of string rows per page.
pub trait BatchSink {
    /// Called once before the first batch; clears leftovers from prior runs.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] if the output location cannot be prepared.
    fn prepare(&mut self) -> io::Result<()>;

    /// Write one complete batch. `file_index` is 1-based and sequential.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] if the batch cannot be written.
    fn write_batch(
        &mut self,
        file_index: u32,
        header: &[String],
        rows: &[Vec<String>],
    ) -> io::Result<()>;
}

/// Writes each batch as `<dir>/<prefix><file_index>.csv`.
#[derive(Debug, Clone)]
pub struct CsvDir {
    dir: PathBuf,
    prefix: String,
}

impl CsvDir {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    fn batch_path(&self, file_index: u32) -> PathBuf {
        self.dir.join(format!("{}{file_index}.csv", self.prefix))
    }
}

impl BatchSink for CsvDir {
    fn prepare(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.starts_with(self.prefix.as_str()) && name.ends_with(".csv") {
                debug!(file = name, "removing stale extract file");
                fs::remove_file(entry.path())?;
            }
        }

        Ok(())
    }

    fn write_batch(
        &mut self,
        file_index: u32,
        header: &[String],
        rows: &[Vec<String>],
    ) -> io::Result<()> {
        let path = self.batch_path(file_index);
        let mut out = BufWriter::new(File::create(&path)?);

        write_record(&mut out, header)?;
        for row in rows {
            write_record(&mut out, row)?;
        }
        out.flush()?;

        info!(file = %path.display(), rows = rows.len(), "saved batch");
        Ok(())
    }
}

/// Write one CSV record. Fields containing a comma, quote, or line break are
/// quoted with embedded quotes doubled; records terminate with CRLF per
/// RFC 4180.
fn write_record<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> io::Result<()> {
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.write_all(b",")?;
        }
        write_field(out, field.as_ref())?;
    }
    out.write_all(b"\r\n")
}

fn write_field<W: Write>(out: &mut W, field: &str) -> io::Result<()> {
    if field.contains(['"', ',', '\n', '\r']) {
        out.write_all(b"\"")?;
        out.write_all(field.replace('"', "\"\"").as_bytes())?;
        out.write_all(b"\"")
    } else {
        out.write_all(field.as_bytes())
    }
}
