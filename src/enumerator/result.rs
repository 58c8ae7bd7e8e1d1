//! Enumeration results and object info

use schemars::JsonSchema;
use serde::Serialize;

use super::level::ObjectProperty;
use super::request::ResultType;
use super::sql::SqlEnumResult;
use crate::engine::DataTable;
use crate::error::{EnumError, Result};
use crate::urn::Urn;

/// Forward-only reader over a materialized table
#[derive(Debug)]
pub struct DataReader {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<serde_json::Value>>,
}

impl DataReader {
    #[must_use]
    pub fn new(table: DataTable) -> Self {
        Self {
            columns: table.columns,
            rows: table.rows.into_iter(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Drain the remaining rows back into a table
    #[must_use]
    pub fn into_table(self) -> DataTable {
        DataTable {
            columns: self.columns,
            rows: self.rows.collect(),
        }
    }
}

impl Iterator for DataReader {
    type Item = Vec<serde_json::Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

#[derive(Debug)]
pub enum EnumData {
    Table(DataTable),
    DataSet(Vec<DataTable>),
    Reader(DataReader),
    /// Statement handed from a level to its child
    Statement(SqlEnumResult),
}

#[derive(Debug)]
pub struct EnumResult {
    pub result_type: ResultType,
    pub data: EnumData,
}

impl EnumResult {
    #[must_use]
    pub const fn new(result_type: ResultType, data: EnumData) -> Self {
        Self { result_type, data }
    }

    /// Rows as one table, whatever the shape
    pub fn into_table(self) -> Result<DataTable> {
        match self.data {
            EnumData::Table(table) => Ok(table),
            EnumData::DataSet(tables) => Ok(tables.into_iter().next().unwrap_or_default()),
            EnumData::Reader(reader) => Ok(reader.into_table()),
            EnumData::Statement(_) => {
                Err(EnumError::result_not_supported("statement results carry no rows"))
            }
        }
    }

    #[must_use]
    pub fn as_statement(&self) -> Option<&SqlEnumResult> {
        match &self.data {
            EnumData::Statement(statement) => Some(statement),
            _ => None,
        }
    }

    pub fn into_statement(self) -> Result<SqlEnumResult> {
        match self.data {
            EnumData::Statement(statement) => Ok(statement),
            _ => Err(EnumError::internal(format!(
                "expected a statement result, got {}",
                self.result_type
            ))),
        }
    }
}

/// Which parts of [`ObjectInfo`] to compute (bit flags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectInfoFlags(u8);

impl ObjectInfoFlags {
    pub const CHILDREN: Self = Self(1);
    pub const PROPERTIES: Self = Self(2);
    pub const URN_PROPERTIES: Self = Self(4);
    pub const RESULT_TYPES: Self = Self(8);
    pub const ALL: Self = Self(15);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ObjectInfoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for ObjectInfoFlags {
    fn default() -> Self {
        Self::ALL
    }
}

/// Metadata query for one level
#[derive(Debug, Clone)]
pub struct RequestObjectInfo {
    pub urn: Urn,
    pub flags: ObjectInfoFlags,
}

impl RequestObjectInfo {
    pub fn new(urn: impl Into<Urn>, flags: ObjectInfoFlags) -> Self {
        Self {
            urn: urn.into(),
            flags,
        }
    }
}

/// Metadata about a level, independent of row data
#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
pub struct ObjectInfo {
    /// Names of the child levels
    pub children: Vec<String>,
    pub properties: Vec<ObjectProperty>,
    pub urn_properties: Vec<ObjectProperty>,
    pub result_types: Vec<ResultType>,
}

impl ObjectInfo {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&ObjectProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> DataTable {
        DataTable {
            columns: vec!["Name".into()],
            rows: vec![vec![json!("a")], vec![json!("b")]],
        }
    }

    #[test]
    fn test_reader_iterates_rows() {
        let mut reader = DataReader::new(table());
        assert_eq!(reader.columns(), ["Name".to_string()]);
        assert_eq!(reader.next(), Some(vec![json!("a")]));
        let rest = reader.into_table();
        assert_eq!(rest.rows, vec![vec![json!("b")]]);
    }

    #[test]
    fn test_into_table_for_each_shape() {
        let result = EnumResult::new(ResultType::DataTable, EnumData::Table(table()));
        assert_eq!(result.into_table().unwrap().len(), 2);

        let result = EnumResult::new(ResultType::DataSet, EnumData::DataSet(vec![table()]));
        assert_eq!(result.into_table().unwrap().len(), 2);

        let result = EnumResult::new(
            ResultType::DataReader,
            EnumData::Reader(DataReader::new(table())),
        );
        assert_eq!(result.into_table().unwrap().len(), 2);

        let result = EnumResult::new(
            ResultType::Reserved1,
            EnumData::Statement(SqlEnumResult::default()),
        );
        assert!(result.as_statement().is_some());
        assert_eq!(
            result.into_table().unwrap_err().error_code(),
            "RESULT_NOT_SUPPORTED"
        );
    }

    #[test]
    fn test_object_info_flags() {
        let flags = ObjectInfoFlags::CHILDREN | ObjectInfoFlags::RESULT_TYPES;
        assert!(flags.contains(ObjectInfoFlags::CHILDREN));
        assert!(!flags.contains(ObjectInfoFlags::PROPERTIES));
        assert!(ObjectInfoFlags::default().contains(ObjectInfoFlags::URN_PROPERTIES));
    }
}
