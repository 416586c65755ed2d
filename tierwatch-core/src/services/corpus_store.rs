//! Local corpus store
//!
//! Append-only CSV file (`text,label`). Rows are only ever added at the end;
//! existing bytes are never rewritten. All methods are blocking and are called
//! through `spawn_blocking` from async code.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::models::{CorpusRow, Tier};
use crate::services::sanitizer::dedup_key;

const HEADER: [&str; 2] = ["text", "label"];

/// Flat-file training corpus
#[derive(Debug, Clone)]
pub struct LocalCorpusStore {
    path: PathBuf,
}

impl LocalCorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row; a missing file is an empty corpus
    ///
    /// Rows with an unknown label or an empty text are skipped with a warning
    /// rather than failing the whole load.
    pub fn load_rows(&self) -> Result<Vec<CorpusRow>, PipelineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(corpus_err)?;

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(corpus_err)?;
            let text = record.get(0).unwrap_or_default();
            let label = record.get(1).unwrap_or_default();

            match Tier::from_label(label) {
                Some(tier) if !text.trim().is_empty() => rows.push(CorpusRow::new(text, tier)),
                _ => warn!(
                    path = %self.path.display(),
                    row = line + 1,
                    label,
                    "Skipping unusable corpus row"
                ),
            }
        }

        debug!(path = %self.path.display(), rows = rows.len(), "Loaded corpus");
        Ok(rows)
    }

    /// Dedup keys of every existing row
    pub fn load_keys(&self) -> Result<HashSet<String>, PipelineError> {
        Ok(self
            .load_rows()?
            .iter()
            .map(|row| dedup_key(&row.text))
            .collect())
    }

    pub fn len(&self) -> Result<usize, PipelineError> {
        Ok(self.load_rows()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PipelineError> {
        Ok(self.len()? == 0)
    }

    /// Append rows at the end of the file and fsync
    ///
    /// Writes the header when the file is new or empty. A file whose last line
    /// lacks a terminator gets one first, so a previously interrupted append
    /// cannot glue onto the new row.
    pub fn append(&self, rows: &[CorpusRow]) -> Result<(), PipelineError> {
        if rows.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(corpus_err)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(corpus_err)?;

        let len = file.metadata().map_err(corpus_err)?.len();
        if len > 0 && !ends_with_newline(&mut file, len)? {
            file.write_all(b"\n").map_err(corpus_err)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if len == 0 {
            writer.write_record(HEADER).map_err(corpus_err)?;
        }
        for row in rows {
            writer
                .write_record([row.text.as_str(), row.label.as_str()])
                .map_err(corpus_err)?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| PipelineError::Corpus(e.to_string()))?;
        file.sync_all().map_err(corpus_err)?;

        debug!(path = %self.path.display(), appended = rows.len(), "Appended corpus rows");
        Ok(())
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> Result<bool, PipelineError> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1)).map_err(corpus_err)?;
    file.read_exact(&mut last).map_err(corpus_err)?;
    Ok(last[0] == b'\n')
}

fn corpus_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Corpus(e.to_string())
}
