//! Request log persistence.
//!
//! # Responsibilities
//! - Persist one row per intercepted request, created as `Pending`
//! - Move a row from `Pending` to its terminal status exactly once
//! - Search, count, page and truncate rows for the query service
//!
//! # Design Decisions
//! - Ids are assigned by the store and only ever grow
//! - The status update is conditional on the row still being `Pending`;
//!   a second finalize of the same row is a no-op that returns `false`
//! - Both backends sort ties by id in the requested direction so pages are stable

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};
use crate::http::response::ResponseOutcome;

pub use memory::MemoryLogStore;
pub use sqlite::SqliteLogStore;

/// Store-assigned row identifier.
pub type LogId = i64;

/// Literal stored while a request waits for its response.
pub const PENDING: &str = "Pending";
/// Literal stored when a request completed without a status.
pub const UNKNOWN: &str = "Unknown";

/// Status column of a log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Pending,
    Code(u16),
    Error(String),
    Unknown,
}

impl ResponseStatus {
    /// Parse the stored text form.
    pub fn from_db(raw: &str) -> Self {
        match raw {
            PENDING => ResponseStatus::Pending,
            UNKNOWN => ResponseStatus::Unknown,
            other => match other.parse::<u16>() {
                Ok(code) => ResponseStatus::Code(code),
                Err(_) => ResponseStatus::Error(other.to_string()),
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ResponseStatus::Pending)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Pending => f.write_str(PENDING),
            ResponseStatus::Code(code) => write!(f, "{code}"),
            ResponseStatus::Error(code) => f.write_str(code),
            ResponseStatus::Unknown => f.write_str(UNKNOWN),
        }
    }
}

impl Serialize for ResponseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&ResponseOutcome> for ResponseStatus {
    fn from(outcome: &ResponseOutcome) -> Self {
        match outcome {
            ResponseOutcome::Status(code) => ResponseStatus::Code(*code),
            ResponseOutcome::Error(code) => ResponseStatus::Error(code.clone()),
            ResponseOutcome::Unknown => ResponseStatus::Unknown,
        }
    }
}

/// A persisted request log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: LogId,
    pub time: DateTime<Utc>,
    pub url: String,
    pub user_agent: String,
    pub request_headers: String,
    pub request_body: String,
    pub response_code: ResponseStatus,
}

/// A row about to be inserted; always starts `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub time: DateTime<Utc>,
    pub url: String,
    pub user_agent: String,
    pub request_headers: String,
    pub request_body: String,
}

impl NewLogEntry {
    pub(crate) fn into_entry(self, id: LogId) -> LogEntry {
        LogEntry {
            id,
            time: self.time,
            url: self.url,
            user_agent: self.user_agent,
            request_headers: self.request_headers,
            request_body: self.request_body,
            response_code: ResponseStatus::Pending,
        }
    }
}

/// Row filter for search and count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Case-insensitive substring of the URL or the user-agent.
    pub search: Option<String>,
}

impl LogFilter {
    pub fn search(text: impl Into<String>) -> Self {
        let text = text.into();
        let search = if text.trim().is_empty() { None } else { Some(text) };
        Self { search }
    }

    /// The search text as both backends compare it.
    pub(crate) fn needle(&self) -> Option<String> {
        self.search.as_deref().map(fold_case)
    }

    pub(crate) fn matches(&self, entry: &LogEntry) -> bool {
        match self.needle() {
            None => true,
            Some(needle) => fold_case(&entry.url).contains(&needle) || fold_case(&entry.user_agent).contains(&needle),
        }
    }
}

/// Case folding shared by every backend; full Unicode lowercase.
pub(crate) fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    Time,
    Url,
    UserAgent,
    ResponseCode,
}

impl SortColumn {
    pub(crate) fn sql_name(&self) -> &'static str {
        match self {
            SortColumn::Time => "time",
            SortColumn::Url => "url",
            SortColumn::UserAgent => "user_agent",
            SortColumn::ResponseCode => "response_code",
        }
    }
}

/// Sort column and direction; defaults to newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: SortColumn,
    pub ascending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            column: SortColumn::Time,
            ascending: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("corrupt log row: {0}")]
    CorruptRow(String),

    #[error("failed to prepare store directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage backend for request log rows.
pub trait LogStore: Send + Sync + fmt::Debug {
    /// Insert a `Pending` row and return its id.
    fn insert(&self, entry: NewLogEntry) -> Result<LogId, StoreError>;

    fn get(&self, id: LogId) -> Result<Option<LogEntry>, StoreError>;

    /// Most recent `Pending` row for `url` (time, then id, descending).
    fn latest_pending(&self, url: &str) -> Result<Option<LogEntry>, StoreError>;

    /// Set the terminal status of row `id` if it is still `Pending`.
    /// Returns whether the row transitioned.
    fn finalize(&self, id: LogId, status: &ResponseStatus) -> Result<bool, StoreError>;

    fn search(
        &self,
        filter: &LogFilter,
        order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogEntry>, StoreError>;

    fn count(&self, filter: &LogFilter) -> Result<u64, StoreError>;

    /// Delete every row. Returns how many were removed.
    fn truncate(&self) -> Result<u64, StoreError>;

    /// Remove the storage itself.
    fn teardown(&self) -> Result<(), StoreError>;
}

/// Open the backend selected in configuration.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn LogStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryLogStore::new())),
        StoreBackend::Sqlite => {
            let path = Path::new(&config.path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Arc::new(SqliteLogStore::open(path)?))
        }
    }
}
