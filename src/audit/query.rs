//! Read access to the request log.

use std::sync::Arc;

use serde::Serialize;

use crate::audit::AuditError;
use crate::config::StoreConfig;
use crate::store::{LogEntry, LogFilter, LogStore, SortOrder};

/// One page request against the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub search: Option<String>,
    /// 1-based; values below 1 read the first page.
    pub page: u32,
    pub page_size: u32,
    pub sort: SortOrder,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            page_size: StoreConfig::default().logs_per_page,
            sort: SortOrder::default(),
        }
    }
}

impl LogQuery {
    /// First page with the configured page size.
    pub fn for_config(config: &StoreConfig) -> Self {
        Self {
            page_size: config.logs_per_page,
            ..Self::default()
        }
    }

    fn filter(&self) -> LogFilter {
        self.search.as_deref().map(LogFilter::search).unwrap_or_default()
    }
}

/// A page of rows plus what a caller needs for pagination.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub rows: Vec<LogEntry>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

#[derive(Debug, Clone)]
pub struct LogQueryService {
    store: Arc<dyn LogStore>,
}

impl LogQueryService {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub fn query(&self, query: &LogQuery) -> Result<LogPage, AuditError> {
        let page = query.page.max(1);
        let page_size = query.page_size.max(1);
        let filter = query.filter();

        let total = self.store.count(&filter)?;
        let offset = (page as usize - 1) * page_size as usize;
        let rows = self
            .store
            .search(&filter, query.sort, page_size as usize, offset)?;

        Ok(LogPage {
            rows,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(u64::from(page_size)),
        })
    }

    /// Delete every row. Returns how many were removed.
    pub fn clear_all(&self) -> Result<u64, AuditError> {
        Ok(self.store.truncate()?)
    }

    /// Remove the log storage entirely.
    pub fn teardown(&self) -> Result<(), AuditError> {
        Ok(self.store.teardown()?)
    }
}
