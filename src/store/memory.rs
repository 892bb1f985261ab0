//! In-process log store.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

use super::{LogEntry, LogFilter, LogId, LogStore, NewLogEntry, ResponseStatus, SortColumn, SortOrder, StoreError};

/// Rows kept in a concurrent map. Ids keep growing across truncates.
#[derive(Debug)]
pub struct MemoryLogStore {
    rows: DashMap<LogId, LogEntry>,
    next_id: AtomicI64,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn snapshot(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.rows
            .iter()
            .filter(|row| filter.matches(row.value()))
            .map(|row| row.value().clone())
            .collect()
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &LogEntry, b: &LogEntry, column: SortColumn) -> CmpOrdering {
    let primary = match column {
        SortColumn::Time => a.time.cmp(&b.time),
        SortColumn::Url => a.url.cmp(&b.url),
        SortColumn::UserAgent => a.user_agent.cmp(&b.user_agent),
        SortColumn::ResponseCode => a.response_code.to_string().cmp(&b.response_code.to_string()),
    };
    primary.then(a.id.cmp(&b.id))
}

impl LogStore for MemoryLogStore {
    fn insert(&self, entry: NewLogEntry) -> Result<LogId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rows.insert(id, entry.into_entry(id));
        Ok(id)
    }

    fn get(&self, id: LogId) -> Result<Option<LogEntry>, StoreError> {
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }

    fn latest_pending(&self, url: &str) -> Result<Option<LogEntry>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.url == url && row.response_code.is_pending())
            .max_by(|a, b| a.time.cmp(&b.time).then(a.id.cmp(&b.id)))
            .map(|row| row.value().clone()))
    }

    fn finalize(&self, id: LogId, status: &ResponseStatus) -> Result<bool, StoreError> {
        if status.is_pending() {
            return Ok(false);
        }
        // the shard write lock makes check-and-set atomic for this row
        match self.rows.get_mut(&id) {
            Some(mut row) if row.response_code.is_pending() => {
                row.response_code = status.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn search(
        &self,
        filter: &LogFilter,
        order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let mut rows = self.snapshot(filter);
        rows.sort_by(|a, b| {
            let ord = compare(a, b, order.column);
            if order.ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn count(&self, filter: &LogFilter) -> Result<u64, StoreError> {
        Ok(self.rows.iter().filter(|row| filter.matches(row.value())).count() as u64)
    }

    fn truncate(&self) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        self.rows.retain(|_, _| {
            removed += 1;
            false
        });
        Ok(removed)
    }

    fn teardown(&self) -> Result<(), StoreError> {
        self.rows.clear();
        Ok(())
    }
}
