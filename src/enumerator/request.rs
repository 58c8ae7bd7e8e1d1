//! Request model
//!
//! A [`Request`] names the objects (by urn), the properties to return and the
//! shape of the result. Properties of ancestor levels can be pulled into the
//! same rows through [`Request::parent_properties_requests`], one entry per
//! ancestor starting with the immediate parent.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::urn::Urn;

/// Shape of the data returned for a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// The leaf level's preferred storage
    #[default]
    Default,
    DataSet,
    DataTable,
    DataReader,
    XmlDocument,
    /// Level-to-level hand-off: the statement built so far
    Reserved1,
    /// Level-to-level hand-off, propagated unchanged to every ancestor
    Reserved2,
}

impl ResultType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::DataSet => "data_set",
            Self::DataTable => "data_table",
            Self::DataReader => "data_reader",
            Self::XmlDocument => "xml_document",
            Self::Reserved1 => "reserved1",
            Self::Reserved2 => "reserved2",
        }
    }

    /// Whether this is one of the level-to-level hand-off types
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved1 | Self::Reserved2)
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Desc)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    /// One alias per requested property, matched by position
    Each,
    /// A fixed prefix in front of every property name
    Prefix,
    /// The level name and `_` in front of every property name
    #[default]
    NodeName,
}

/// How result columns of one level are named
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PropertyAlias {
    #[serde(default)]
    pub kind: AliasKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl PropertyAlias {
    #[must_use]
    pub fn node_name() -> Self {
        Self::default()
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            kind: AliasKind::Prefix,
            prefix: Some(prefix.into()),
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn each(aliases: Vec<String>) -> Self {
        Self {
            kind: AliasKind::Each,
            prefix: None,
            aliases,
        }
    }
}

/// How the `fields` list is interpreted
///
/// Bit flags: [`Self::REQUEST`] returns the listed properties, its absence
/// ([`Self::REJECT`]) returns everything except them. [`Self::INCLUDE_EXPENSIVE`]
/// adds expensive properties when the list is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RequestFieldsKind(u8);

impl RequestFieldsKind {
    pub const REJECT: Self = Self(0);
    pub const REQUEST: Self = Self(1);
    pub const INCLUDE_EXPENSIVE: Self = Self(2);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for RequestFieldsKind {
    fn default() -> Self {
        Self::REQUEST
    }
}

impl std::ops::BitOr for RequestFieldsKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Properties wanted from one level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PropertiesRequest {
    /// Property names; `None` means every requestable property
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,

    #[serde(default)]
    pub fields_kind: RequestFieldsKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_alias: Option<PropertyAlias>,
}

impl PropertiesRequest {
    #[must_use]
    pub fn fields(fields: &[&str]) -> Self {
        Self {
            fields: Some(fields.iter().map(|f| (*f).to_string()).collect()),
            ..Self::default()
        }
    }

    /// Requested property names, empty when unset
    #[must_use]
    pub fn field_names(&self) -> &[String] {
        self.fields.as_deref().unwrap_or_default()
    }
}

/// One enumeration request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Request {
    #[schemars(with = "String")]
    pub urn: Urn,

    #[serde(flatten)]
    pub properties: PropertiesRequest,

    #[serde(default)]
    pub result_type: ResultType,

    /// Requests for ancestor levels, immediate parent first; `null` skips a level
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_properties_requests: Vec<Option<PropertiesRequest>>,

    /// Properties a child level needs from this level to join against it
    #[serde(skip)]
    pub link_fields: Vec<String>,
}

impl Request {
    pub fn new(urn: impl Into<Urn>) -> Self {
        Self {
            urn: urn.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.properties.fields = Some(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    #[must_use]
    pub fn with_fields_kind(mut self, kind: RequestFieldsKind) -> Self {
        self.properties.fields_kind = kind;
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.properties.order_by = order_by;
        self
    }

    #[must_use]
    pub fn with_result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = result_type;
        self
    }

    #[must_use]
    pub fn with_property_alias(mut self, alias: PropertyAlias) -> Self {
        self.properties.property_alias = Some(alias);
        self
    }

    #[must_use]
    pub fn with_parent_properties(mut self, requests: Vec<Option<PropertiesRequest>>) -> Self {
        self.parent_properties_requests = requests;
        self
    }

    /// Copy of the caller-visible parts; link fields are not carried over
    #[must_use]
    pub fn shallow_clone(&self) -> Self {
        Self {
            urn: self.urn.clone(),
            properties: self.properties.clone(),
            result_type: self.result_type,
            parent_properties_requests: self.parent_properties_requests.clone(),
            link_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field_names(&self) -> &[String] {
        self.properties.field_names()
    }
}
