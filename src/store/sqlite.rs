//! SQLite-backed log store.
//!
//! # Design Decisions
//! - One connection behind a mutex; every operation is a single statement
//! - WAL journal so the CLI can read while a host process writes
//! - Time is stored as epoch milliseconds
//! - Search goes through a registered `fold_case` SQL function so it folds
//!   case exactly like the memory store; the needle is matched with `instr`,
//!   which has no wildcards

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{
    fold_case, LogEntry, LogFilter, LogId, LogStore, NewLogEntry, ResponseStatus, SortOrder, StoreError, PENDING,
};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS update_request_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    time INTEGER NOT NULL,
    url TEXT NOT NULL,
    user_agent TEXT NOT NULL DEFAULT '',
    request_headers TEXT NOT NULL DEFAULT '',
    request_body TEXT NOT NULL DEFAULT '',
    response_code TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS update_request_logs_pending
    ON update_request_logs (url, response_code);";

const COLUMNS: &str = "id, time, url, user_agent, request_headers, request_body, response_code";

/// Raw column values before time and status are decoded.
type RawRow = (i64, i64, String, String, String, String, String);

#[derive(Debug)]
pub struct SqliteLogStore {
    conn: Mutex<Connection>,
}

impl SqliteLogStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: String = ctx.get(0)?;
                Ok(fold_case(&text))
            },
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_row(raw: RawRow) -> Result<LogEntry, StoreError> {
    let (id, millis, url, user_agent, request_headers, request_body, response_code) = raw;
    let time: DateTime<Utc> = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::CorruptRow(format!("row {id} has invalid time {millis}")))?;

    Ok(LogEntry {
        id,
        time,
        url,
        user_agent,
        request_headers,
        request_body,
        response_code: ResponseStatus::from_db(&response_code),
    })
}

/// WHERE clause and bound values for a filter.
fn where_clause(filter: &LogFilter) -> (&'static str, Vec<SqlValue>) {
    match filter.needle() {
        Some(needle) => (
            " WHERE instr(fold_case(url), ?1) > 0 OR instr(fold_case(user_agent), ?1) > 0",
            vec![SqlValue::Text(needle)],
        ),
        None => ("", Vec::new()),
    }
}

impl LogStore for SqliteLogStore {
    fn insert(&self, entry: NewLogEntry) -> Result<LogId, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO update_request_logs
                (time, url, user_agent, request_headers, request_body, response_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.time.timestamp_millis(),
                entry.url,
                entry.user_agent,
                entry.request_headers,
                entry.request_body,
                PENDING,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get(&self, id: LogId) -> Result<Option<LogEntry>, StoreError> {
        let raw = self
            .conn()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM update_request_logs WHERE id = ?1"),
                params![id],
                read_row,
            )
            .optional()?;
        raw.map(decode_row).transpose()
    }

    fn latest_pending(&self, url: &str) -> Result<Option<LogEntry>, StoreError> {
        let raw = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM update_request_logs
                     WHERE url = ?1 AND response_code = ?2
                     ORDER BY time DESC, id DESC LIMIT 1"
                ),
                params![url, PENDING],
                read_row,
            )
            .optional()?;
        raw.map(decode_row).transpose()
    }

    fn finalize(&self, id: LogId, status: &ResponseStatus) -> Result<bool, StoreError> {
        if status.is_pending() {
            return Ok(false);
        }
        let changed = self.conn()?.execute(
            "UPDATE update_request_logs SET response_code = ?1
             WHERE id = ?2 AND response_code = ?3",
            params![status.to_string(), id, PENDING],
        )?;
        Ok(changed == 1)
    }

    fn search(
        &self,
        filter: &LogFilter,
        order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let (clause, mut values) = where_clause(filter);
        let direction = if order.ascending { "ASC" } else { "DESC" };
        let first = values.len() + 1;
        let sql = format!(
            "SELECT {COLUMNS} FROM update_request_logs{clause}
             ORDER BY {column} {direction}, id {direction}
             LIMIT ?{first} OFFSET ?{second}",
            column = order.column.sql_name(),
            second = first + 1,
        );
        values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        values.push(SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params_from_iter(values), read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(decode_row).collect()
    }

    fn count(&self, filter: &LogFilter) -> Result<u64, StoreError> {
        let (clause, values) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM update_request_logs{clause}");
        let count: i64 = self
            .conn()?
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn truncate(&self) -> Result<u64, StoreError> {
        let removed = self.conn()?.execute("DELETE FROM update_request_logs", [])?;
        Ok(removed as u64)
    }

    fn teardown(&self) -> Result<(), StoreError> {
        self.conn()?
            .execute_batch("DROP TABLE IF EXISTS update_request_logs;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{entry_at, exercise_store};

    #[test]
    fn test_shared_behaviour() {
        exercise_store(&SqliteLogStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let store = SqliteLogStore::open_in_memory().unwrap();
        store.insert(entry_at(1, "https://a.example/100%25", "ua")).unwrap();
        store.insert(entry_at(2, "https://a.example/x_y", "ua")).unwrap();
        store.insert(entry_at(3, "https://a.example/xzy", "ua")).unwrap();

        assert_eq!(store.count(&LogFilter::search("x_y")).unwrap(), 1);
        assert_eq!(store.count(&LogFilter::search("%")).unwrap(), 1);
    }

    #[test]
    fn test_rows_persist_across_reopen() {
        let path = std::env::temp_dir().join(format!("update-logs-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let id = {
            let store = SqliteLogStore::open(&path).unwrap();
            let id = store.insert(entry_at(1_700_000_000, "https://a.example/", "ua")).unwrap();
            store.finalize(id, &ResponseStatus::Error("timeout".into())).unwrap();
            id
        };

        let store = SqliteLogStore::open(&path).unwrap();
        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.response_code, ResponseStatus::Error("timeout".into()));
        assert_eq!(row.time.timestamp(), 1_700_000_000);

        store.teardown().unwrap();
        assert!(store.count(&LogFilter::default()).is_err());
        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
