//! Synchronizer: remote record source → local corpus
//!
//! Pulls untrained records, sanitizes them, drops everything whose dedup key
//! is already in the corpus (or earlier in the same batch) and appends the
//! rest. A source outage degrades to "nothing new".

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::{CorpusRow, RecordId, Tier};
use crate::services::corpus_store::LocalCorpusStore;
use crate::services::record_source::RecordSource;
use crate::services::sanitizer::{dedup_key, sanitize_text};

/// Detailed outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Ids whose rows were appended to the corpus
    pub appended: Vec<RecordId>,
    /// Ids whose text was already in the corpus or earlier in the batch
    pub reconciled: Vec<RecordId>,
    /// Ids with an unknown label or no text left after sanitizing
    pub rejected: Vec<RecordId>,
    pub fetched: usize,
    pub source_available: bool,
}

impl SyncReport {
    /// Ids safe to flag as trained once a generation built from the corpus is published
    pub fn consumed(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self
            .appended
            .iter()
            .chain(self.reconciled.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

pub struct Synchronizer {
    source: Arc<dyn RecordSource>,
    corpus: LocalCorpusStore,
}

impl Synchronizer {
    pub fn new(source: Arc<dyn RecordSource>, corpus: LocalCorpusStore) -> Self {
        Self { source, corpus }
    }

    pub fn corpus(&self) -> &LocalCorpusStore {
        &self.corpus
    }

    /// Merge new records into the corpus; returns the ids actually appended
    pub async fn sync(&self) -> Result<Vec<RecordId>, PipelineError> {
        Ok(self.sync_report().await?.appended)
    }

    pub async fn sync_report(&self) -> Result<SyncReport, PipelineError> {
        let records = match self.source.fetch_untrained().await {
            Ok(records) => records,
            Err(e) => {
                let degraded = PipelineError::SourceUnavailable(e.to_string());
                warn!(error = %degraded, "Record source unavailable, continuing with local corpus");
                return Ok(SyncReport::default());
            }
        };

        let mut report = SyncReport {
            fetched: records.len(),
            source_available: true,
            ..SyncReport::default()
        };

        let corpus = self.corpus.clone();
        let mut seen: HashSet<String> = tokio::task::spawn_blocking(move || corpus.load_keys())
            .await
            .map_err(|e| PipelineError::Corpus(e.to_string()))??;

        let mut new_rows = Vec::new();
        for record in records {
            let label = match Tier::from_label(&record.label) {
                Some(label) if record.is_eligible() => label,
                _ => {
                    report.rejected.push(record.id);
                    continue;
                }
            };

            let text = sanitize_text(&record.text);
            if text.is_empty() {
                debug!(id = %record.id, "Record empty after sanitizing");
                report.rejected.push(record.id);
                continue;
            }

            if seen.insert(dedup_key(&text)) {
                new_rows.push(CorpusRow::new(text, label));
                report.appended.push(record.id);
            } else {
                report.reconciled.push(record.id);
            }
        }

        if !new_rows.is_empty() {
            let corpus = self.corpus.clone();
            tokio::task::spawn_blocking(move || corpus.append(&new_rows))
                .await
                .map_err(|e| PipelineError::Corpus(e.to_string()))??;
        }

        info!(
            fetched = report.fetched,
            appended = report.appended.len(),
            reconciled = report.reconciled.len(),
            rejected = report.rejected.len(),
            "Corpus sync complete"
        );

        Ok(report)
    }
}
