//! Level objects
//!
//! Every segment of an urn (`Server`, `Database`, `Table`, ...) is served by a
//! level object implementing [`EnumObject`]. Level objects are pooled by the
//! object cache, so everything tied to one request lives in [`LevelState`]
//! and is cleared again in [`EnumObject::post_process`].
//!
//! # Capabilities
//! A level that can tell the server version, engine type or edition exposes
//! that through [`SupportsVersions`], [`SupportsEngineTypes`] and
//! [`SupportsEngineEditions`]. The environment asks the top-most level when
//! the connection context does not describe the server itself.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use schemars::JsonSchema;
use serde::{Serialize, Serializer};

use super::request::{AliasKind, Request, ResultType};
use super::result::EnumResult;
use crate::config::ResourceLoader;
use crate::engine::{
    ConnectionContext, DatabaseEngineEdition, DatabaseEngineType, ServerInformation, ServerVersion,
};
use crate::error::{EnumError, Result};
use crate::filter::{ConstantKind, FilterNode};
use crate::urn::{Urn, XPathExpressionBlock};

/// Ways a property may be used in a request (bit flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropertyUsage(u8);

impl PropertyUsage {
    pub const NONE: Self = Self(0);
    pub const REQUEST: Self = Self(1);
    pub const FILTER: Self = Self(2);
    pub const ORDER: Self = Self(4);
    /// Internal usage: link fields requested by a child level
    pub const RESERVED1: Self = Self(8);
    pub const ALL: Self = Self(7);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::REQUEST, "request"),
        (Self::FILTER, "filter"),
        (Self::ORDER, "order"),
        (Self::RESERVED1, "reserved1"),
    ];

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Parse a space or comma separated list such as `"request filter order"`
    pub fn parse(text: &str) -> Result<Self> {
        let mut usage = Self::NONE;
        let words = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|w| !w.is_empty());
        for word in words {
            let flag = Self::NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(word))
                .map(|(flag, _)| *flag)
                .ok_or_else(|| {
                    EnumError::config_error(format!("unknown property usage '{word}'"))
                })?;
            usage = usage.union(flag);
        }
        Ok(usage)
    }

    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect()
    }
}

impl std::ops::BitOr for PropertyUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for PropertyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" "))
    }
}

impl Serialize for PropertyUsage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

/// Client-side type of a property, derived from its SQL type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Int16,
    Int32,
    Int64,
    Byte,
    Boolean,
    Double,
    Decimal,
    DateTime,
    DateTimeOffset,
    TimeSpan,
    Guid,
    Bytes,
    Object,
}

impl PropertyType {
    /// Map a SQL type name; unknown names are a metadata error
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(match db_type {
            "xml" | "json" | "nvarchar" | "varchar" | "sysname" | "nchar" | "char" | "ntext"
            | "text" => Self::String,
            "int" | "long" => Self::Int32,
            "bigint" => Self::Int64,
            "bit" => Self::Boolean,
            "real" | "float" => Self::Double,
            "datetime" | "datetime2" | "date" => Self::DateTime,
            "datetimeoffset" => Self::DateTimeOffset,
            "time" | "timespan" => Self::TimeSpan,
            "tinyint" => Self::Byte,
            "smallint" => Self::Int16,
            "uniqueidentifier" => Self::Guid,
            "numeric" | "decimal" => Self::Decimal,
            "binary" | "image" | "varbinary" => Self::Bytes,
            "sql_variant" => Self::Object,
            other => return Err(EnumError::config_error(format!("unknown type '{other}'"))),
        })
    }
}

/// Property descriptor published by a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ObjectProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    /// SQL type name as declared
    pub db_type: String,
    #[schemars(with = "Vec<String>")]
    pub usage: PropertyUsage,
    pub expensive: bool,
    pub read_only: bool,
}

impl ObjectProperty {
    pub fn new(name: impl Into<String>, db_type: &str, usage: PropertyUsage) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            property_type: PropertyType::from_db_type(db_type)?,
            db_type: db_type.to_string(),
            usage,
            expensive: false,
            read_only: true,
        })
    }

    #[must_use]
    pub const fn expensive(mut self, expensive: bool) -> Self {
        self.expensive = expensive;
        self
    }

    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Per-request state shared by every level implementation
#[derive(Debug, Default)]
pub struct LevelState {
    pub urn: Urn,
    pub block: Option<XPathExpressionBlock>,
    pub request: Option<Request>,
    properties: Vec<ObjectProperty>,
    index: HashMap<String, usize>,
}

impl LevelState {
    /// Register a property; a later declaration with the same name replaces the earlier one
    pub fn add_property(&mut self, property: ObjectProperty) {
        match self.index.get(&property.name) {
            Some(&i) => self.properties[i] = property,
            None => {
                self.index.insert(property.name.clone(), self.properties.len());
                self.properties.push(property);
            }
        }
    }

    #[must_use]
    pub fn all_properties(&self) -> &[ObjectProperty] {
        &self.properties
    }

    fn lookup(&self, name: &str) -> Option<&ObjectProperty> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    /// Forget everything tied to the current request
    pub fn reset(&mut self) {
        self.urn = Urn::default();
        self.block = None;
        self.request = None;
    }
}

/// Usage bits `usage` asks for that `property` does not grant, ignoring `RESERVED1`
const fn unresolved_usage(property: PropertyUsage, usage: PropertyUsage) -> PropertyUsage {
    PropertyUsage((property.0 | usage.0) & !property.0 & !PropertyUsage::RESERVED1.0)
}

pub trait SupportsVersions {
    fn server_version(&self, ctx: &dyn ConnectionContext) -> Result<ServerVersion>;
}

pub trait SupportsEngineTypes {
    fn engine_type(&self, ctx: &dyn ConnectionContext) -> Result<DatabaseEngineType>;
}

pub trait SupportsEngineEditions {
    fn engine_edition(&self, ctx: &dyn ConnectionContext) -> Result<DatabaseEngineEdition>;
}

/// One level of the hierarchy
pub trait EnumObject: Send {
    fn state(&self) -> &LevelState;

    fn state_mut(&mut self) -> &mut LevelState;

    /// Load the level definition named by the metadata `cfg` attribute
    fn load_init_data(
        &mut self,
        cfg: &str,
        _resources: &dyn ResourceLoader,
        _server: &ServerInformation,
    ) -> Result<()> {
        Err(EnumError::config_error(format!("level does not accept init data '{cfg}'")))
    }

    /// Bind the level to its expression block and the urn up to this level
    fn initialize(&mut self, block: XPathExpressionBlock, urn: Urn) {
        let state = self.state_mut();
        state.block = Some(block);
        state.urn = urn;
    }

    /// Level name as written in the urn
    fn name(&self) -> &str {
        self.state().block.as_ref().map_or("", XPathExpressionBlock::name)
    }

    fn request(&self) -> Option<&Request> {
        self.state().request.as_ref()
    }

    fn set_request(&mut self, request: Request) {
        self.state_mut().request = Some(request);
    }

    fn fixed_properties(&self) -> Option<&BTreeMap<String, FilterNode>> {
        self.state().block.as_ref().map(XPathExpressionBlock::fixed_properties)
    }

    /// Fixed value of a string property, if the filter pins one
    fn fixed_string_property(&self, name: &str) -> Option<String> {
        match self.fixed_properties()?.get(name)? {
            FilterNode::Constant {
                value,
                kind: ConstantKind::String,
            } => Some(value.clone()),
            _ => None,
        }
    }

    fn add_property(&mut self, property: ObjectProperty) {
        self.state_mut().add_property(property);
    }

    /// Properties usable for any of the bits in `usage`, in declaration order
    fn properties(&self, usage: PropertyUsage) -> Vec<&ObjectProperty> {
        self.state().all_properties().iter().filter(|p| p.usage.intersects(usage)).collect()
    }

    /// Properties that most likely make up the urn of an object
    ///
    /// Only levels exposing `Urn` have any. `Name` (and `Schema` next to it)
    /// is preferred; otherwise the first requestable property after `Urn`.
    fn urn_properties(&self) -> Vec<&ObjectProperty> {
        if self.try_property("Urn", PropertyUsage::REQUEST).is_none() {
            return Vec::new();
        }
        if let Some(name) = self.try_property("Name", PropertyUsage::REQUEST) {
            let mut found = vec![name];
            found.extend(self.try_property("Schema", PropertyUsage::REQUEST));
            return found;
        }
        self.properties(PropertyUsage::REQUEST).into_iter().nth(1).into_iter().collect()
    }

    /// Property usable for `usage`, or `None`
    fn try_property(&self, name: &str, usage: PropertyUsage) -> Option<&ObjectProperty> {
        self.state()
            .lookup(name)
            .filter(|p| unresolved_usage(p.usage, usage) == PropertyUsage::NONE)
    }

    /// Property usable for `usage`, or an error naming what is wrong
    fn property(&self, name: &str, usage: PropertyUsage) -> Result<&ObjectProperty> {
        let property = self.state().lookup(name).ok_or_else(|| EnumError::unknown_property(name))?;
        let missing = unresolved_usage(property.usage, usage);
        if missing != PropertyUsage::NONE {
            return Err(EnumError::invalid_property_usage(name, missing.to_string()));
        }
        Ok(property)
    }

    /// Result column name for `property` under the request's alias rule
    fn alias_property_name(&self, property: &str) -> Result<String> {
        let Some(request) = self.request() else {
            return Ok(property.to_string());
        };
        let Some(alias) = &request.properties.property_alias else {
            return Ok(property.to_string());
        };
        match alias.kind {
            AliasKind::Prefix => {
                let prefix = alias.prefix.as_deref().ok_or_else(|| {
                    EnumError::internal(format!("prefix alias without a prefix for {property}"))
                })?;
                Ok(format!("{prefix}{property}"))
            }
            AliasKind::NodeName => Ok(format!("{}_{property}", self.name())),
            AliasKind::Each => {
                let position = request
                    .field_names()
                    .iter()
                    .position(|f| f == property)
                    .ok_or_else(|| {
                        EnumError::internal(format!("property {property} cannot have an alias"))
                    })?;
                alias
                    .aliases
                    .get(position)
                    .cloned()
                    .ok_or_else(|| {
                        EnumError::internal(format!("no alias specified for {property}"))
                    })
            }
        }
    }

    /// Request this level needs served by its parent, if any
    fn retrieve_parent_request(&mut self) -> Result<Option<Request>> {
        Ok(None)
    }

    /// Produce this level's result, merging the parent's partial result
    fn get_data(
        &mut self,
        parent: Option<EnumResult>,
        ctx: &dyn ConnectionContext,
    ) -> Result<EnumResult>;

    /// Result shapes this level can produce
    fn result_types(&self) -> Vec<ResultType>;

    /// Drop request-specific state before the level goes back to the cache
    fn post_process(&mut self, _result: Option<&EnumResult>) {
        self.state_mut().reset();
    }

    fn versions(&self) -> Option<&dyn SupportsVersions> {
        None
    }

    fn engine_types(&self) -> Option<&dyn SupportsEngineTypes> {
        None
    }

    fn engine_editions(&self) -> Option<&dyn SupportsEngineEditions> {
        None
    }
}
