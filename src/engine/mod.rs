//! Statement Execution
//!
//! The enumerator never talks to a driver directly. Generated statements are
//! handed to a [`ConnectionContext`], which also describes the server it is
//! connected to.
//!
//! # Parameter Markers
//! When a context supports parameterization, filter constants reach this layer
//! wrapped as `<msparam>value</msparam>`. [`extract_parameters`] rewrites each
//! marker into a positional `?` placeholder and collects the values in order.
//!
//! # Reconnect
//! [`execute_sql`] retries a statement exactly once after the context reports
//! `CONNECTION_LOST`, calling [`ConnectionContext::reconnect`] in between.
//! Every other failure propagates unchanged.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EnumError, Result};

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Opening marker of a parameterized constant in generated SQL
pub const PARAM_OPEN: &str = "<msparam>";
/// Closing marker of a parameterized constant in generated SQL
pub const PARAM_CLOSE: &str = "</msparam>";

/// Largest accepted component of a parsed [`ServerVersion`]
pub const MAX_VERSION_PART: i32 = 99_999;

/// Server version as `major.minor.build`
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct ServerVersion {
    pub major: i32,
    pub minor: i32,
    pub build: i32,
}

impl ServerVersion {
    #[must_use]
    pub const fn new(major: i32, minor: i32, build: i32) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }

    /// Parse a dotted version string; missing parts default to zero
    ///
    /// Each part must lie in `0..=MAX_VERSION_PART`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = [0i32; 3];
        for (slot, part) in parts.iter_mut().zip(text.trim().split('.')) {
            *slot = part
                .parse()
                .ok()
                .filter(|n| (0..=MAX_VERSION_PART).contains(n))
                .ok_or_else(|| {
                    EnumError::invalid_input(format!("invalid server version '{text}'"))
                })?;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    /// Single number folding major and minor, as used in cache keys
    #[must_use]
    pub const fn cache_number(&self) -> i32 {
        self.major.saturating_mul(100).saturating_add(self.minor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Deployment flavor of the database engine
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseEngineType {
    Unknown,
    #[default]
    Standalone,
    SqlAzureDatabase,
}

impl DatabaseEngineType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Standalone => "standalone",
            Self::SqlAzureDatabase => "sql_azure_database",
        }
    }

    /// Inverse of [`Self::as_str`]; unrecognized names map to `Unknown`
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "standalone" => Self::Standalone,
            "sql_azure_database" => Self::SqlAzureDatabase,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DatabaseEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product edition of the database engine
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseEngineEdition {
    #[default]
    Unknown,
    Personal,
    Standard,
    Enterprise,
    Express,
    SqlDatabase,
    SqlDataWarehouse,
    SqlManagedInstance,
}

impl DatabaseEngineEdition {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Personal => "personal",
            Self::Standard => "standard",
            Self::Enterprise => "enterprise",
            Self::Express => "express",
            Self::SqlDatabase => "sql_database",
            Self::SqlDataWarehouse => "sql_data_warehouse",
            Self::SqlManagedInstance => "sql_managed_instance",
        }
    }

    /// Inverse of [`Self::as_str`]; unrecognized names map to `Unknown`
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "personal" => Self::Personal,
            "standard" => Self::Standard,
            "enterprise" => Self::Enterprise,
            "express" => Self::Express,
            "sql_database" => Self::SqlDatabase,
            "sql_data_warehouse" => Self::SqlDataWarehouse,
            "sql_managed_instance" => Self::SqlManagedInstance,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DatabaseEngineEdition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the enumerator needs to know about a server to pick level objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServerInformation {
    pub version: ServerVersion,
    pub engine_type: DatabaseEngineType,
    pub edition: DatabaseEngineEdition,
}

/// Materialized tabular result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataTable {
    /// Column names in result order
    pub columns: Vec<String>,

    /// Rows, each with one value per column
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl DataTable {
    /// Empty table with the given columns
    #[must_use]
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in row `row`
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// All values of one column
    #[must_use]
    pub fn column_values(&self, column: &str) -> Vec<&serde_json::Value> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().filter_map(|r| r.get(idx)).collect(),
            None => Vec::new(),
        }
    }

    /// Rows as column-name keyed objects
    #[must_use]
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Connection the enumerator runs statements against
///
/// Implementations decide the literal dialect (string prefix), whether bound
/// parameters are available, and how engine failures map onto
/// `OBJECT_NOT_FOUND` and `CONNECTION_LOST`.
pub trait ConnectionContext: Send + Sync {
    /// Short engine name used in error messages
    fn engine_name(&self) -> &'static str;

    /// Server description when the context knows it up front
    fn server_information(&self) -> Option<ServerInformation> {
        None
    }

    /// Prefix written before string literals
    fn string_prefix(&self) -> &str {
        "N"
    }

    fn supports_parameterization(&self) -> bool {
        false
    }

    /// Run one statement with positional parameters
    fn execute(&self, sql: &str, params: &[String]) -> Result<DataTable>;

    fn reconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Context for statement-only requests; describes a server but runs nothing
#[derive(Debug, Clone)]
pub struct OfflineContext {
    server: ServerInformation,
    string_prefix: String,
    parameterized: bool,
}

impl OfflineContext {
    #[must_use]
    pub fn new(server: ServerInformation) -> Self {
        Self {
            server,
            string_prefix: "N".to_string(),
            parameterized: false,
        }
    }

    #[must_use]
    pub fn with_string_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.string_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn with_parameterization(mut self, enabled: bool) -> Self {
        self.parameterized = enabled;
        self
    }
}

impl ConnectionContext for OfflineContext {
    fn engine_name(&self) -> &'static str {
        "offline"
    }

    fn server_information(&self) -> Option<ServerInformation> {
        Some(self.server)
    }

    fn string_prefix(&self) -> &str {
        &self.string_prefix
    }

    fn supports_parameterization(&self) -> bool {
        self.parameterized
    }

    fn execute(&self, _sql: &str, _params: &[String]) -> Result<DataTable> {
        Err(EnumError::query_not_supported("offline context cannot execute statements"))
    }
}

/// Escape a constant so it can sit between parameter markers
///
/// `&` and `<` are entity-encoded, so the value can never contain
/// [`PARAM_CLOSE`].
#[must_use]
pub fn encode_parameter(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;")
}

fn decode_parameter(value: &str) -> String {
    value.replace("&lt;", "<").replace("&amp;", "&")
}

/// Replace `<msparam>` markers with `?` and collect their decoded values
///
/// Markers inside string literals and `[...]` identifiers are plain text.
pub fn extract_parameters(sql: &str) -> Result<(String, Vec<String>)> {
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut in_literal = false;
    let mut in_identifier = false;
    let mut rest = sql;
    while let Some(c) = rest.chars().next() {
        if !in_literal && !in_identifier && rest.starts_with(PARAM_OPEN) {
            let after = &rest[PARAM_OPEN.len()..];
            let end = after
                .find(PARAM_CLOSE)
                .ok_or_else(|| EnumError::internal("unterminated parameter marker in statement"))?;
            params.push(decode_parameter(&after[..end]));
            out.push('?');
            rest = &after[end + PARAM_CLOSE.len()..];
            continue;
        }
        match c {
            '\'' if !in_identifier => in_literal = !in_literal,
            '[' if !in_literal => in_identifier = true,
            ']' if !in_literal => in_identifier = false,
            _ => {}
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Ok((out, params))
}

/// Run statements in order and return the result of the last one
pub fn execute_sql(ctx: &dyn ConnectionContext, statements: &[String]) -> Result<DataTable> {
    let mut last = DataTable::default();
    for statement in statements {
        let (sql, params) = extract_parameters(statement)?;
        debug!(
            engine = ctx.engine_name(),
            params = params.len(),
            sql = %sql,
            "executing statement"
        );
        last = match ctx.execute(&sql, &params) {
            Err(EnumError::ConnectionLost(reason)) => {
                warn!(engine = ctx.engine_name(), %reason, "connection lost, reconnecting once");
                ctx.reconnect()?;
                ctx.execute(&sql, &params)?
            }
            other => other?,
        };
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyContext {
        failures: Mutex<u32>,
        reconnects: Mutex<u32>,
        seen: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FlakyContext {
        fn new(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                reconnects: Mutex::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ConnectionContext for FlakyContext {
        fn engine_name(&self) -> &'static str {
            "test"
        }

        fn execute(&self, sql: &str, params: &[String]) -> Result<DataTable> {
            self.seen.lock().unwrap().push((sql.to_string(), params.to_vec()));
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(EnumError::connection_lost("socket closed"));
            }
            Ok(DataTable {
                columns: vec!["sql".into()],
                rows: vec![vec![sql.into()]],
            })
        }

        fn reconnect(&self) -> Result<()> {
            *self.reconnects.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_server_version_parse() {
        assert_eq!(
            ServerVersion::parse("3.45.1").unwrap(),
            ServerVersion::new(3, 45, 1)
        );
        assert_eq!(
            ServerVersion::parse("16").unwrap(),
            ServerVersion::new(16, 0, 0)
        );
        assert!(ServerVersion::parse("x.1").is_err());
        assert_eq!(ServerVersion::new(15, 2, 7).cache_number(), 1502);
        assert_eq!(ServerVersion::new(15, 2, 7).to_string(), "15.2.7");
    }

    #[test]
    fn test_server_version_out_of_range() {
        let err = ServerVersion::parse("30000000.0").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(ServerVersion::parse("-1.0").is_err());
        assert_eq!(
            ServerVersion::parse("99999.99999").unwrap().cache_number(),
            10_099_899
        );
        assert_eq!(ServerVersion::new(i32::MAX, 5, 0).cache_number(), i32::MAX);
    }

    #[test]
    fn test_server_information_defaults() {
        let info = ServerInformation::default();
        assert_eq!(info.engine_type, DatabaseEngineType::Standalone);
        assert_eq!(info.edition, DatabaseEngineEdition::Unknown);
        assert_eq!(
            serde_json::to_string(&info.engine_type).unwrap(),
            r#""standalone""#
        );
    }

    #[test]
    fn test_extract_parameters() {
        let (sql, params) =
            extract_parameters("a=<msparam>x</msparam> and b=<msparam>it's</msparam>").unwrap();
        assert_eq!(sql, "a=? and b=?");
        assert_eq!(params, vec!["x".to_string(), "it's".to_string()]);

        let (sql, params) = extract_parameters("select 1").unwrap();
        assert_eq!(sql, "select 1");
        assert!(params.is_empty());

        assert!(extract_parameters("a=<msparam>x").is_err());
    }

    #[test]
    fn test_parameter_cannot_close_its_marker() {
        let value = "x</msparam> OR 1=1 --";
        let sql = format!("a=<msparam>{}</msparam>", encode_parameter(value));
        let (sql, params) = extract_parameters(&sql).unwrap();
        assert_eq!(sql, "a=?");
        assert_eq!(params, vec![value.to_string()]);

        let encoded = format!("a=<msparam>{}</msparam>", encode_parameter("&lt; & <"));
        let (_, params) = extract_parameters(&encoded).unwrap();
        assert_eq!(params, vec!["&lt; & <".to_string()]);
    }

    #[test]
    fn test_markers_in_literals_stay_text() {
        let sql =
            "SELECT 1 AS [<msparam>] WHERE a=N'<msparam>x</msparam>' AND b=<msparam>y</msparam>";
        let (sql, params) = extract_parameters(sql).unwrap();
        assert_eq!(
            sql,
            "SELECT 1 AS [<msparam>] WHERE a=N'<msparam>x</msparam>' AND b=?"
        );
        assert_eq!(params, vec!["y".to_string()]);
    }

    #[test]
    fn test_execute_retries_once() {
        let ctx = FlakyContext::new(1);
        let table = execute_sql(&ctx, &["select 1".to_string()]).unwrap();
        assert_eq!(table.value(0, "sql"), Some(&serde_json::json!("select 1")));
        assert_eq!(*ctx.reconnects.lock().unwrap(), 1);
        assert_eq!(ctx.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_execute_gives_up_after_second_failure() {
        let ctx = FlakyContext::new(2);
        let err = execute_sql(&ctx, &["select 1".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_LOST");
        assert_eq!(*ctx.reconnects.lock().unwrap(), 1);
    }

    #[test]
    fn test_execute_returns_last_result() {
        let ctx = FlakyContext::new(0);
        let statements = ["a".to_string(), "b=<msparam>1</msparam>".to_string()];
        let table = execute_sql(&ctx, &statements).unwrap();
        assert_eq!(table.value(0, "sql"), Some(&serde_json::json!("b=?")));
        assert_eq!(ctx.seen.lock().unwrap()[1].1, vec!["1".to_string()]);
        assert!(execute_sql(&ctx, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_offline_context() {
        let ctx = OfflineContext::new(ServerInformation::default()).with_parameterization(true);
        assert_eq!(ctx.string_prefix(), "N");
        assert!(ctx.supports_parameterization());
        assert_eq!(ctx.server_information(), Some(ServerInformation::default()));
        let err = execute_sql(&ctx, &["select 1".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "QUERY_NOT_SUPPORTED");
    }

    #[test]
    fn test_data_table_records() {
        let table = DataTable {
            columns: vec!["Name".into(), "ID".into()],
            rows: vec![vec!["a".into(), 1.into()], vec!["b".into(), 2.into()]],
        };
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.column_values("ID"),
            vec![&serde_json::json!(1), &serde_json::json!(2)]
        );
        assert_eq!(table.to_records()[1]["Name"], serde_json::json!("b"));
        assert_eq!(table.value(5, "Name"), None);
    }
}
