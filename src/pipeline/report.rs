use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::ErrorKind;

use super::RunMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Every chunk loaded and every record stored.
    Completed,
    /// Finished, but some chunks or records were skipped.
    Partial,
    /// All chunks failed, or a credential error stopped the run.
    Failed,
    TimedOut,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Completed => "completed",
            SourceStatus::Partial => "partial",
            SourceStatus::Failed => "failed",
            SourceStatus::TimedOut => "timed out",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SourceStatus::Failed | SourceStatus::TimedOut)
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error counts per kind, plus the first few messages of each.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    sample_limit: usize,
    counts: BTreeMap<ErrorKind, usize>,
    samples: BTreeMap<ErrorKind, Vec<String>>,
}

impl ErrorLog {
    pub fn new(sample_limit: usize) -> Self {
        Self { sample_limit, ..Default::default() }
    }

    pub fn record(&mut self, kind: ErrorKind, message: impl Into<String>) {
        *self.counts.entry(kind).or_default() += 1;
        let samples = self.samples.entry(kind).or_default();
        if samples.len() < self.sample_limit {
            samples.push(message.into());
        }
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn samples(&self, kind: ErrorKind) -> &[String] {
        self.samples.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(kind, count, first messages)` in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (ErrorKind, usize, &[String])> + '_ {
        self.counts.iter().map(|(kind, count)| (*kind, *count, self.samples(*kind)))
    }
}

/// Outcome of one source run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    /// Records handed to the resolver and store.
    pub attempted: usize,
    pub added: usize,
    pub updated: usize,
    /// Attempted records that were not stored.
    pub skipped: usize,
    /// Records dropped before resolution by the incremental date filter.
    pub filtered: usize,
    pub chunks_ok: usize,
    pub chunks_failed: usize,
    pub status: SourceStatus,
    pub errors: ErrorLog,
    pub elapsed: Duration,
}

impl SourceReport {
    pub fn new(source: &str, sample_limit: usize) -> Self {
        Self {
            source: source.to_string(),
            attempted: 0,
            added: 0,
            updated: 0,
            skipped: 0,
            filtered: 0,
            chunks_ok: 0,
            chunks_failed: 0,
            status: SourceStatus::Completed,
            errors: ErrorLog::new(sample_limit),
            elapsed: Duration::ZERO,
        }
    }

    /// Status for a run that reached the end of its chunks.
    pub(crate) fn settle(&mut self) {
        self.status = if self.chunks_ok == 0 && self.chunks_failed > 0 {
            SourceStatus::Failed
        } else if !self.errors.is_empty() {
            SourceStatus::Partial
        } else {
            SourceStatus::Completed
        };
    }
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (attempted {}, added {}, updated {}, skipped {}, chunks {}/{})",
            self.source,
            self.status,
            self.attempted,
            self.added,
            self.updated,
            self.skipped,
            self.chunks_ok,
            self.chunks_ok + self.chunks_failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    /// Ordered by source name.
    pub sources: Vec<SourceReport>,
    /// Requested names with no registered adapter.
    pub unknown_sources: Vec<String>,
}

impl RunReport {
    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|r| r.source == name)
    }

    pub fn has_failures(&self) -> bool {
        self.sources.iter().any(|r| r.status.is_failure())
    }

    pub fn total_added(&self) -> usize {
        self.sources.iter().map(|r| r.added).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.sources.iter().map(|r| r.updated).sum()
    }
}
