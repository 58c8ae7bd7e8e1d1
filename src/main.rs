//! urnquery CLI Entry Point
//!
//! Subcommands:
//! - `parse` - Print the AST of a urn or query expression
//! - `filter` - Print the filter tree of every level of a urn
//! - `sql` - Print the statement a request would run, without a database
//! - `enumerate` - Run a request against a SQLite catalog
//! - `info` - Describe the level a urn points at
//! - `schema` - Print the JSON schema of request documents
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use urnquery::engine::sqlite::SqliteContext;
use urnquery::enumerator::{Direction, OrderBy};
use urnquery::{
    load_settings, ConnectionContext, EnumData, EnumError, Enumerator, EnumeratorSettings,
    ErrorEnvelope, Metadata, ObjectInfoFlags, OfflineContext, Request, RequestFieldsKind,
    RequestObjectInfo, ServerInformation, ServerVersion, SuccessEnvelope, XPathExpression,
};

/// urnquery - enumerate database catalog objects by urn
#[derive(Parser)]
#[command(name = "urnquery")]
#[command(about = "Urn-addressed catalog enumeration compiled to SQL")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to .urnquery/config.json, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a urn or query expression and print its AST
    Parse {
        query: String,
    },

    /// Print the filter tree of every level of a urn
    Filter {
        urn: String,
    },

    /// Print the SQL a request would run
    Sql {
        #[command(flatten)]
        request: RequestArgs,

        /// Server version the statement is built for
        #[arg(long, default_value = "16.0.0")]
        server_version: String,

        /// Literal prefix for string constants
        #[arg(long)]
        string_prefix: Option<String>,
    },

    /// Run a request against a SQLite catalog
    Enumerate {
        #[command(flatten)]
        request: RequestArgs,

        #[command(flatten)]
        database: DatabaseArgs,
    },

    /// Describe the level a urn points at
    Info {
        urn: String,

        #[command(flatten)]
        database: DatabaseArgs,
    },

    /// Print the JSON schema of request documents
    Schema,
}

#[derive(Args)]
struct RequestArgs {
    /// Urn to enumerate
    #[arg(required_unless_present = "request")]
    urn: Option<String>,

    /// Request document (JSON) instead of a urn and flags
    #[arg(long, conflicts_with_all = ["urn", "fields", "order_by"])]
    request: Option<PathBuf>,

    /// Comma-separated property names
    #[arg(long, value_delimiter = ',')]
    fields: Option<Vec<String>>,

    /// Treat --fields as the properties to leave out
    #[arg(long, requires = "fields")]
    reject: bool,

    /// Include expensive properties when --fields is not given
    #[arg(long)]
    expensive: bool,

    /// Sort order, `Name` or `Name:desc`, comma-separated
    #[arg(long, value_delimiter = ',')]
    order_by: Vec<String>,
}

#[derive(Args)]
struct DatabaseArgs {
    /// SQLite catalog file (the bundled demo catalog when omitted)
    #[arg(long)]
    db: Option<PathBuf>,
}

/// Command output: data plus rows returned, when meaningful
type Output = (Value, Option<usize>);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("urnquery=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let started = Instant::now();
    let (command, engine) = describe(&cli.command);
    let result = run(&cli);
    let execution_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok((data, rows)) => {
            let meta = rows.map_or(Metadata::new(execution_ms), |rows| {
                Metadata::with_rows(execution_ms, rows)
            });
            let envelope = SuccessEnvelope::new(engine, command, data, meta);
            println!("{}", serde_json::to_string(&envelope)?);
            Ok(())
        }
        Err(err) => {
            let envelope = ErrorEnvelope::from_error(engine, command, &err);
            println!("{}", serde_json::to_string(&envelope)?);
            std::process::exit(1);
        }
    }
}

const fn describe(command: &Commands) -> (&'static str, &'static str) {
    match command {
        Commands::Parse { .. } => ("parse", ""),
        Commands::Filter { .. } => ("filter", ""),
        Commands::Sql { .. } => ("sql", "offline"),
        Commands::Enumerate { .. } => ("enumerate", "sqlite"),
        Commands::Info { .. } => ("info", "sqlite"),
        Commands::Schema => ("schema", ""),
    }
}

fn run(cli: &Cli) -> Result<Output, EnumError> {
    match &cli.command {
        Commands::Parse { query } => Ok((to_value(&urnquery::xpath::parse(query)?)?, None)),
        Commands::Filter { urn } => filter(urn),
        Commands::Sql {
            request,
            server_version,
            string_prefix,
        } => {
            let settings = load_settings(cli.config.as_deref())?;
            let server = ServerInformation {
                version: ServerVersion::parse(server_version)?,
                ..Default::default()
            };
            let prefix = string_prefix
                .clone()
                .or_else(|| settings.string_prefix.clone());
            let mut ctx =
                OfflineContext::new(server).with_parameterization(settings.parameterize);
            if let Some(prefix) = prefix {
                ctx = ctx.with_string_prefix(prefix);
            }
            let request = request.build()?;
            let sql = Enumerator::with_settings(settings).statement(&request, &ctx)?;
            Ok((json!({ "urn": request.urn.value(), "sql": sql }), None))
        }
        Commands::Enumerate { request, database } => {
            let settings = load_settings(cli.config.as_deref())?;
            let ctx = database.open(&settings)?;
            let request = request.build()?;
            enumerate(&Enumerator::with_settings(settings), &request, &ctx)
        }
        Commands::Info { urn, database } => {
            let settings = load_settings(cli.config.as_deref())?;
            let ctx = database.open(&settings)?;
            let enumerator = Enumerator::with_settings(settings);
            let request = RequestObjectInfo::new(urn.as_str(), ObjectInfoFlags::ALL);
            let info = enumerator.get_object_info(&request, &ctx)?;
            Ok((to_value(&info)?, None))
        }
        Commands::Schema => Ok((to_value(&schemars::schema_for!(Request))?, None)),
    }
}

fn filter(urn: &str) -> Result<Output, EnumError> {
    let expression = XPathExpression::compile(urn)?;
    let levels: Vec<Value> = expression
        .blocks()
        .iter()
        .map(|block| {
            json!({
                "level": block.name(),
                "filter": block.filter().map(ToString::to_string),
                "fixed_properties": block
                    .fixed_properties()
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(value.to_string())))
                    .collect::<serde_json::Map<_, _>>(),
            })
        })
        .collect();
    Ok((Value::Array(levels), None))
}

fn enumerate(
    enumerator: &Enumerator,
    request: &Request,
    ctx: &dyn ConnectionContext,
) -> Result<Output, EnumError> {
    let result = enumerator.get_data(request, ctx)?;
    let tables = match result.data {
        EnumData::Table(table) => vec![table],
        EnumData::DataSet(tables) => tables,
        EnumData::Reader(reader) => vec![reader.into_table()],
        EnumData::Statement(statement) => {
            return Ok((json!({ "sql": statement.statement.sql_statement() }), None));
        }
    };
    let rows = tables.iter().map(|t| t.len()).sum();
    let data = json!({
        "result_type": result.result_type,
        "tables": tables
            .iter()
            .map(|t| json!({ "columns": t.columns, "rows": t.to_records() }))
            .collect::<Vec<_>>(),
    });
    Ok((data, Some(rows)))
}

impl RequestArgs {
    fn build(&self) -> Result<Request, EnumError> {
        if let Some(path) = &self.request {
            return read_request(path);
        }
        let urn = self
            .urn
            .clone()
            .ok_or_else(|| EnumError::invalid_input("a urn or --request is required"))?;
        let mut request = Request::new(urn);

        let mut kind = if self.reject {
            RequestFieldsKind::REJECT
        } else {
            RequestFieldsKind::REQUEST
        };
        if self.expensive {
            kind = kind | RequestFieldsKind::INCLUDE_EXPENSIVE;
        }
        request.properties.fields.clone_from(&self.fields);
        request.properties.fields_kind = kind;
        request.properties.order_by = self
            .order_by
            .iter()
            .map(|o| parse_order_by(o))
            .collect::<Result<_, _>>()?;
        Ok(request)
    }
}

fn read_request(path: &Path) -> Result<Request, EnumError> {
    let text = fs::read_to_string(path).map_err(|e| {
        EnumError::invalid_input(format!("Could not read request {}: {e}", path.display()))
    })?;
    let request: Request = serde_json::from_str(&text).map_err(|e| {
        EnumError::invalid_input(format!(
            "Invalid request document {}: {e}",
            path.display()
        ))
    })?;
    debug!(urn = %request.urn, "loaded request document");
    Ok(request)
}

fn parse_order_by(text: &str) -> Result<OrderBy, EnumError> {
    let (field, direction) = text.split_once(':').unwrap_or((text, "asc"));
    match direction.to_ascii_lowercase().as_str() {
        "asc" => Ok(OrderBy::new(field.trim(), Direction::Asc)),
        "desc" => Ok(OrderBy::new(field.trim(), Direction::Desc)),
        other => Err(EnumError::invalid_input(format!(
            "Unknown sort direction '{other}' for {field}"
        ))),
    }
}

impl DatabaseArgs {
    fn open(&self, settings: &EnumeratorSettings) -> Result<SqliteContext, EnumError> {
        let ctx = match &self.db {
            Some(path) => SqliteContext::open_read_only(path.to_string_lossy())?,
            None => SqliteContext::demo()?,
        };
        let ctx = ctx.with_parameterization(settings.parameterize);
        Ok(match &settings.string_prefix {
            Some(prefix) => ctx.with_string_prefix(prefix.clone()),
            None => ctx,
        })
    }
}

fn to_value(value: &impl Serialize) -> Result<Value, EnumError> {
    serde_json::to_value(value)
        .map_err(|e| EnumError::internal(format!("Could not serialize output: {e}")))
}

