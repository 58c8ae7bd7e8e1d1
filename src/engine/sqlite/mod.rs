//! `SQLite` Connection Context
//!
//! Runs enumerator statements through `rusqlite`.
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver, no async needed)
//! - BLOB data is Base64-encoded for JSON safety
//! - String literals carry no prefix by default (`'x'`, not `N'x'`)
//! - A missing table maps to `OBJECT_NOT_FOUND`, a file that cannot be opened
//!   to `CONNECTION_LOST`
//! - [`DEMO_CATALOG`] creates the server catalog the bundled levels enumerate

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params_from_iter, Connection, OpenFlags, Row};

use crate::engine::{ConnectionContext, DataTable, ServerInformation};
use crate::error::{EnumError, Result};

/// Schema and seed rows of the demo server catalog
pub const DEMO_CATALOG: &str = include_str!("../../../resources/catalog.sql");

const MEMORY: &str = ":memory:";

pub struct SqliteContext {
    path: String,
    read_only: bool,
    conn: Mutex<Connection>,
    server: Option<ServerInformation>,
    parameterized: bool,
    string_prefix: String,
}

impl SqliteContext {
    /// Open (or create) a database file
    pub fn open(path: impl Into<String>) -> Result<Self> {
        Self::open_with(path.into(), false)
    }

    pub fn open_read_only(path: impl Into<String>) -> Result<Self> {
        Self::open_with(path.into(), true)
    }

    pub fn in_memory() -> Result<Self> {
        Self::open_with(MEMORY.to_string(), false)
    }

    /// In-memory database loaded with [`DEMO_CATALOG`]
    pub fn demo() -> Result<Self> {
        let ctx = Self::in_memory()?;
        ctx.execute_batch(DEMO_CATALOG)?;
        Ok(ctx)
    }

    fn open_with(path: String, read_only: bool) -> Result<Self> {
        let conn = open_connection(&path, read_only)?;
        Ok(Self {
            path,
            read_only,
            conn: Mutex::new(conn),
            server: None,
            parameterized: false,
            string_prefix: String::new(),
        })
    }

    /// Report fixed server information instead of asking the top level for it
    #[must_use]
    pub const fn with_server_information(mut self, server: ServerInformation) -> Self {
        self.server = Some(server);
        self
    }

    /// Bind filter constants as parameters instead of inlining them
    #[must_use]
    pub const fn with_parameterization(mut self, enabled: bool) -> Self {
        self.parameterized = enabled;
        self
    }

    /// Prefix written before string literals (none by default)
    #[must_use]
    pub fn with_string_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.string_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run a batch of statements without collecting results
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql).map_err(map_error)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EnumError::internal("sqlite connection lock poisoned"))
    }
}

impl ConnectionContext for SqliteContext {
    fn engine_name(&self) -> &'static str {
        "sqlite"
    }

    fn server_information(&self) -> Option<ServerInformation> {
        self.server
    }

    fn string_prefix(&self) -> &str {
        &self.string_prefix
    }

    fn supports_parameterization(&self) -> bool {
        self.parameterized
    }

    fn execute(&self, sql: &str, params: &[String]) -> Result<DataTable> {
        let conn = self.lock()?;
        execute_query(&conn, sql, params)
    }

    fn reconnect(&self) -> Result<()> {
        // Reopening an in-memory database would hand back an empty one
        if self.path == MEMORY {
            return Ok(());
        }
        let fresh = open_connection(&self.path, self.read_only)?;
        *self.lock()? = fresh;
        Ok(())
    }
}

/// Open `SQLite` connection with appropriate flags
fn open_connection(path: &str, read_only: bool) -> Result<Connection> {
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
    };

    Connection::open_with_flags(path, flags)
        .map_err(|e| EnumError::connection_lost(format!("Failed to open SQLite database: {e}")))
}

fn map_error(e: rusqlite::Error) -> EnumError {
    let detail = e.to_string();
    if detail.contains("no such table") {
        return EnumError::object_not_found(detail);
    }
    if let rusqlite::Error::SqliteFailure(code, _) = &e {
        if code.code == rusqlite::ErrorCode::CannotOpen {
            return EnumError::connection_lost(detail);
        }
    }
    EnumError::execution_failed("sqlite", detail)
}

fn execute_query(conn: &Connection, sql: &str, params: &[String]) -> Result<DataTable> {
    let mut stmt = conn.prepare(sql).map_err(map_error)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    let mut rows = stmt.query(params_from_iter(params.iter())).map_err(map_error)?;
    let mut table = DataTable::with_columns(columns);
    while let Some(row) = rows.next().map_err(map_error)? {
        table.rows.push(row_to_json(table.columns.len(), row).map_err(map_error)?);
    }
    Ok(table)
}

/// Convert a `SQLite` row to a JSON-safe `Vec`
fn row_to_json(
    width: usize,
    row: &Row,
) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    (0..width).map(|idx| sqlite_value_to_json(row, idx)).collect()
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}
