//! Database layer for medicore.

mod appointments;
mod audit;
mod bills;
mod doctors;
mod ids;
mod patients;
mod schema;

pub use audit::{chain_hash, hash_data, AuditChainReport, GENESIS_HASH};
pub use schema::*;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{InvalidValue, Page, PageRequest};

/// Busy timeout applied when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(#[from] InvalidValue),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, msg) if err.code == ErrorCode::ConstraintViolation => {
                DbError::Constraint(msg.unwrap_or_else(|| err.to_string()))
            }
            other => DbError::Sqlite(other),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open database at path with an explicit busy timeout.
    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction that takes the database write lock up front.
    ///
    /// Statements issued through `self` while the returned guard is alive
    /// run inside the transaction. Dropping the guard without committing
    /// rolls back.
    pub fn immediate_transaction(&self) -> DbResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Count rows of `table` whose `column` equals `value`.
    pub(crate) fn count_where(&self, table: &str, column: &str, value: &str) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?");
        let count: i64 = self.conn.query_row(&sql, [value], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Run a filtered, ordered, paginated listing.
    ///
    /// `from` may include joins; `columns` must select what `map_row` reads.
    pub(crate) fn fetch_page<R, T>(
        &self,
        columns: &str,
        from: &str,
        filter: &QueryFilter,
        order_by: &str,
        request: PageRequest,
        map_row: fn(&Row<'_>) -> rusqlite::Result<R>,
    ) -> DbResult<Page<T>>
    where
        T: TryFrom<R, Error = DbError>,
    {
        let where_sql = filter.where_sql();

        let count_sql = format!("SELECT COUNT(*) FROM {from}{where_sql}");
        let total: i64 = self
            .conn
            .query_row(&count_sql, params_from_iter(filter.values.iter()), |row| {
                row.get(0)
            })?;

        let select_sql =
            format!("SELECT {columns} FROM {from}{where_sql} ORDER BY {order_by} LIMIT ? OFFSET ?");
        let mut values = filter.values.clone();
        values.push(Value::Integer(i64::from(request.per_page)));
        values.push(Value::Integer(request.offset() as i64));

        let mut stmt = self.conn.prepare(&select_sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), map_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(Page::new(items, request, total as u64))
    }

    /// Run an unpaginated query and convert every row.
    pub(crate) fn fetch_all<R, T>(
        &self,
        sql: &str,
        values: &[Value],
        map_row: fn(&Row<'_>) -> rusqlite::Result<R>,
    ) -> DbResult<Vec<T>>
    where
        T: TryFrom<R, Error = DbError>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), map_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }
}

/// WHERE clauses and their bound values for a filtered listing.
#[derive(Debug, Default, Clone)]
pub(crate) struct QueryFilter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl QueryFilter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a clause with a single `?` placeholder.
    pub(crate) fn push(&mut self, clause: &str, value: impl Into<Value>) {
        self.clauses.push(clause.to_string());
        self.values.push(value.into());
    }

    /// Case-insensitive substring match over any of `columns`.
    pub(crate) fn push_search(&mut self, columns: &[&str], term: &str) {
        let term = term.trim();
        if term.is_empty() || columns.is_empty() {
            return;
        }
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let clause = columns
            .iter()
            .map(|c| format!("LOWER({c}) LIKE ? ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.clauses.push(format!("({clause})"));
        for _ in columns {
            self.values.push(Value::Text(pattern.clone()));
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Parse a stored money column.
pub(crate) fn parse_money(field: &'static str, s: &str) -> DbResult<Decimal> {
    Decimal::from_str(s).map_err(|_| DbError::InvalidValue(InvalidValue::new(field, s)))
}

/// Parse an optional stored enum column.
pub(crate) fn parse_opt<T>(s: Option<String>) -> DbResult<Option<T>>
where
    T: FromStr<Err = InvalidValue>,
{
    s.map(|s| s.parse::<T>()).transpose().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        // Check that tables exist
        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in ["patients", "doctors", "appointments", "bills", "bill_items", "audit_log"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_query_filter_where_sql() {
        let mut filter = QueryFilter::new();
        assert_eq!(filter.where_sql(), "");

        filter.push("status = ?", "pending".to_string());
        filter.push_search(&["name", "id"], "Max");
        assert_eq!(
            filter.where_sql(),
            " WHERE status = ? AND (LOWER(name) LIKE ? ESCAPE '\\' OR LOWER(id) LIKE ? ESCAPE '\\')"
        );
        assert_eq!(filter.values.len(), 3);

        // Blank search terms add nothing
        filter.push_search(&["name"], "   ");
        assert_eq!(filter.values.len(), 3);
    }

    #[test]
    fn test_reopen_file_database_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medicore.db");
        Database::open(&path).unwrap();
        let db = Database::open(&path).unwrap();
        assert!(db.count_where("patients", "id", "P0001").is_ok());
    }
}
