//! Level definition files
//!
//! Each SQL-backed level is described by an XML resource:
//!
//! ```xml
//! <level name="Table" distinct="false">
//!   <from>sys_tables AS tbl</from>
//!   <parent_link><link local="tbl.database_id" parent="ID"/></parent_link>
//!   <property name="Name" type="sysname" sql="tbl.name" usage="request filter order"/>
//!   <property name="DatabaseName" type="sysname" sql="{parent.Name}" usage="request"/>
//! </level>
//! ```
//!
//! `{parent.X}` in a property's SQL stands for the parent level's expression
//! for property `X`; the parent hands those over as link fields.
//! `usage` defaults to `request filter order`. `min_major` hides a property
//! from servers older than that major version.

use std::collections::BTreeMap;

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::enumerator::level::{ObjectProperty, PropertyUsage};
use crate::error::{EnumError, Result};

const PARENT_OPEN: &str = "{parent.";

#[derive(Debug, Deserialize)]
struct XmlLevel {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@distinct")]
    distinct: Option<bool>,
    from: String,
    server_query: Option<String>,
    parent_link: Option<XmlParentLink>,
    #[serde(rename = "property", default)]
    properties: Vec<XmlProperty>,
}

#[derive(Debug, Deserialize)]
struct XmlParentLink {
    #[serde(rename = "link", default)]
    links: Vec<XmlLink>,
}

#[derive(Debug, Deserialize)]
struct XmlLink {
    #[serde(rename = "@local")]
    local: String,
    #[serde(rename = "@parent")]
    parent: String,
}

#[derive(Debug, Deserialize)]
struct XmlProperty {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type")]
    db_type: String,
    #[serde(rename = "@sql")]
    sql: String,
    #[serde(rename = "@usage")]
    usage: Option<String>,
    #[serde(rename = "@expensive")]
    expensive: Option<bool>,
    #[serde(rename = "@read_only")]
    read_only: Option<bool>,
    #[serde(rename = "@min_major")]
    min_major: Option<i32>,
}

/// Join between a level and its parent: `local = <parent's expression for parent>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub local: String,
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub property: ObjectProperty,
    /// SQL expression, possibly with `{parent.X}` references
    pub sql: String,
    pub min_major: Option<i32>,
}

/// Parsed level definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDefinition {
    pub name: String,
    pub from: String,
    pub distinct: bool,
    /// Query answering `version`, `engine_type` and `edition` columns
    pub server_query: Option<String>,
    pub links: Vec<ParentLink>,
    pub properties: Vec<PropertyDefinition>,
}

impl LevelDefinition {
    pub fn parse(xml: &str) -> Result<Self> {
        let level: XmlLevel = from_str(xml)
            .map_err(|e| EnumError::config_error(format!("invalid level definition: {e}")))?;

        let properties = level
            .properties
            .into_iter()
            .map(|p| {
                let usage = match &p.usage {
                    Some(text) => PropertyUsage::parse(text)?,
                    None => PropertyUsage::ALL,
                };
                let property = ObjectProperty::new(p.name, &p.db_type, usage)?
                    .expensive(p.expensive.unwrap_or(false))
                    .read_only(p.read_only.unwrap_or(true));
                Ok(PropertyDefinition {
                    property,
                    sql: p.sql.trim().to_string(),
                    min_major: p.min_major,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: level.name,
            from: level.from.trim().to_string(),
            distinct: level.distinct.unwrap_or(false),
            server_query: level
                .server_query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            links: level
                .parent_link
                .map(|l| {
                    l.links
                        .into_iter()
                        .map(|x| ParentLink {
                            local: x.local,
                            parent: x.parent,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            properties,
        })
    }

    /// SQL expressions by property name, for the properties a server of `major` sees
    #[must_use]
    pub fn columns_for(&self, major: i32) -> BTreeMap<String, String> {
        self.visible_properties(major)
            .map(|p| (p.property.name.clone(), p.sql.clone()))
            .collect()
    }

    /// Properties a server of `major` sees
    pub fn visible_properties(&self, major: i32) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties
            .iter()
            .filter(move |p| p.min_major.map_or(true, |min| major >= min))
    }
}

/// Names referenced as `{parent.X}` in `sql`, in order of appearance
#[must_use]
pub fn parent_references(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = sql;
    while let Some(start) = rest.find(PARENT_OPEN) {
        let after = &rest[start + PARENT_OPEN.len()..];
        let Some(end) = after.find('}') else { break };
        let name = after[..end].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
        rest = &after[end + 1..];
    }
    names
}

/// Substitute `{parent.X}` references with the parent's expressions
pub fn resolve_parent_references(sql: &str, links: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(start) = rest.find(PARENT_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + PARENT_OPEN.len()..];
        let end = after.find('}').ok_or_else(|| {
            EnumError::config_error(format!("unterminated parent reference in '{sql}'"))
        })?;
        let name = &after[..end];
        let expression = links.get(name).ok_or_else(|| {
            EnumError::internal(format!("parent did not provide link field {name}"))
        })?;
        out.push('(');
        out.push_str(expression);
        out.push(')');
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::level::PropertyType;
    use pretty_assertions::assert_eq;

    const TABLE: &str = r#"
        <level name="Table" distinct="true">
          <from>sys_tables AS tbl</from>
          <parent_link><link local="tbl.database_id" parent="ID"/></parent_link>
          <property name="Name" type="sysname" sql="tbl.name"/>
          <property name="RowCount" type="bigint" sql="tbl.row_count" usage="request" expensive="true"/>
          <property name="DatabaseName" type="sysname" sql="{parent.Name}" usage="request filter"/>
          <property name="IsLedger" type="bit" sql="0" min_major="16"/>
        </level>"#;

    #[test]
    fn test_parse_definition() {
        let def = LevelDefinition::parse(TABLE).unwrap();
        assert_eq!(def.name, "Table");
        assert_eq!(def.from, "sys_tables AS tbl");
        assert!(def.distinct);
        assert_eq!(def.server_query, None);
        assert_eq!(
            def.links,
            vec![ParentLink {
                local: "tbl.database_id".into(),
                parent: "ID".into(),
            }]
        );
        assert_eq!(def.properties.len(), 4);

        let row_count = &def.properties[1];
        assert_eq!(row_count.property.property_type, PropertyType::Int64);
        assert_eq!(row_count.property.usage, PropertyUsage::REQUEST);
        assert!(row_count.property.expensive);
        assert_eq!(def.properties[0].property.usage, PropertyUsage::ALL);
    }

    #[test]
    fn test_min_major_visibility() {
        let def = LevelDefinition::parse(TABLE).unwrap();
        assert!(def.columns_for(16).contains_key("IsLedger"));
        assert!(!def.columns_for(15).contains_key("IsLedger"));
        assert_eq!(def.columns_for(15)["DatabaseName"], "{parent.Name}");
    }

    #[test]
    fn test_parse_errors() {
        let bad_type =
            r#"<level name="X"><from>t</from><property name="A" type="geometry" sql="a"/></level>"#;
        assert_eq!(
            LevelDefinition::parse(bad_type).unwrap_err().error_code(),
            "CONFIG_ERROR"
        );

        let missing_from = r#"<level name="X"><property name="A" type="int" sql="a"/></level>"#;
        assert_eq!(
            LevelDefinition::parse(missing_from).unwrap_err().error_code(),
            "CONFIG_ERROR"
        );
    }

    #[test]
    fn test_parent_references() {
        assert_eq!(
            parent_references("{parent.Urn} || '/x' || {parent.Name} || {parent.Urn}"),
            vec!["Urn".to_string(), "Name".to_string()]
        );
        assert!(parent_references("tbl.name").is_empty());
    }

    #[test]
    fn test_resolve_parent_references() {
        let links = BTreeMap::from([("Name".to_string(), "db.name".to_string())]);
        assert_eq!(
            resolve_parent_references("{parent.Name} || 'x'", &links).unwrap(),
            "(db.name) || 'x'"
        );
        assert_eq!(
            resolve_parent_references("tbl.name", &links).unwrap(),
            "tbl.name"
        );
        assert_eq!(
            resolve_parent_references("{parent.ID}", &links).unwrap_err().error_code(),
            "INTERNAL_ERROR"
        );
    }
}
