//! urnquery - Urn-Addressed Catalog Enumeration
//!
//! urnquery answers questions about a database server's object hierarchy.
//! Objects are addressed by urns, path expressions such as
//! `Server/Database[@Name='Foo']/Table[@Schema='dbo']`, and every segment of
//! a urn is served by one level object that knows how to turn its filter and
//! its requested properties into SQL.
//!
//! # Pipeline
//! 1. [`xpath`] scans and parses the urn into an AST
//! 2. [`filter`] lowers each predicate into a [`FilterNode`] tree and decodes it to SQL
//! 3. [`urn`] splits the urn into per-level [`XPathExpressionBlock`]s
//! 4. [`metadata`] maps level names onto level implementations
//! 5. [`cache`] pools initialized level objects between requests
//! 6. [`enumerator`] chains the levels and produces an [`EnumResult`]
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`output`] - JSON output envelope types used by the CLI
//! - [`engine`] - Connection contexts and server description types
//! - [`config`] - Settings files and metadata resources

pub mod cache;
pub mod config;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod output;
pub mod urn;
pub mod xpath;

pub use cache::ObjectCache;
pub use config::{
    load_settings, BundledResources, DirectoryResources, EnumeratorSettings, ResourceLoader,
};
pub use engine::{
    ConnectionContext, DataTable, DatabaseEngineEdition, DatabaseEngineType, OfflineContext,
    ServerInformation, ServerVersion,
};
pub use enumerator::{
    EnumData, EnumObject, EnumResult, Enumerator, ObjectInfo, ObjectInfoFlags, ObjectProperty,
    PropertiesRequest, PropertyUsage, Request, RequestFieldsKind, RequestObjectInfo, ResultType,
};
pub use error::{EnumError, Result, XPathErrorCode};
pub use filter::FilterNode;
pub use metadata::{ObjectLoadInfo, ObjectLoadInfoManager};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use urn::{Urn, XPathExpression, XPathExpressionBlock};

#[cfg(feature = "sqlite")]
pub use engine::sqlite::SqliteContext;
