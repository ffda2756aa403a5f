use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Report bucket for an error. Every error the pipeline can observe maps to
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    Credential,
    TransientNetwork,
    FetchExhausted,
    MalformedRecord,
    PartialSourceUnavailable,
    StoreWrite,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Credential => "credential",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::FetchExhausted => "fetch_exhausted",
            ErrorKind::MalformedRecord => "malformed_record",
            ErrorKind::PartialSourceUnavailable => "partial_source_unavailable",
            ErrorKind::StoreWrite => "store_write",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Fetch layer ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{source_name}: credential rejected (HTTP {status})")]
    Credential { source_name: String, status: u16 },

    #[error("{source_name}: {variable} is not configured")]
    MissingCredential { source_name: String, variable: String },

    #[error("{source_name}: transient failure: {reason}")]
    Transient { source_name: String, reason: String },

    #[error("{source_name}: gave up after {attempts} attempts: {last}")]
    Exhausted {
        source_name: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error("{source_name}: not found: {url}")]
    NotFound { source_name: String, url: String },

    #[error("{source_name}: request rejected (HTTP {status}): {body}")]
    Rejected { source_name: String, status: u16, body: String },

    #[error("{source_name}: could not decode payload: {reason}")]
    Decode { source_name: String, reason: String },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Credential { .. } | FetchError::MissingCredential { .. } => ErrorKind::Credential,
            FetchError::Transient { .. } => ErrorKind::TransientNetwork,
            FetchError::Exhausted { .. } => ErrorKind::FetchExhausted,
            FetchError::NotFound { .. } | FetchError::Rejected { .. } | FetchError::Decode { .. } => {
                ErrorKind::PartialSourceUnavailable
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn is_credential(&self) -> bool {
        self.kind() == ErrorKind::Credential
    }
}

// ── Source adapters ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("chunk {chunk} unavailable: {reason}")]
    PartialUnavailable { chunk: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse chunk {chunk}: {reason}")]
    Parse { chunk: String, reason: String },
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Fetch(e) => e.kind(),
            SourceError::PartialUnavailable { .. } | SourceError::Io { .. } | SourceError::Parse { .. } => {
                ErrorKind::PartialSourceUnavailable
            }
        }
    }

    /// A credential problem will not go away for the next chunk either.
    pub fn aborts_source(&self) -> bool {
        matches!(self, SourceError::Fetch(e) if e.is_credential())
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write to {table} failed: {source}")]
    Write {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("read from {table} failed: {source}")]
    Read {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl StoreError {
    pub fn write(table: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |source| StoreError::Write { table, source }
    }

    pub fn read(table: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |source| StoreError::Read { table, source }
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        RecordError::Malformed(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordError::Malformed(_) => ErrorKind::MalformedRecord,
            RecordError::Store(_) => ErrorKind::StoreWrite,
        }
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

/// Fatal for a whole run; everything else is folded into the report.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no known source selected (requested: {requested})")]
    NoSourcesSelected { requested: String },
}
