use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::definition::{parent_references, resolve_parent_references, LevelDefinition};
use super::statement::{SqlEnumResult, StatementBuilder};
use crate::config::ResourceLoader;
use crate::engine::{
    execute_sql, ConnectionContext, DataTable, DatabaseEngineEdition, DatabaseEngineType,
    ServerInformation, ServerVersion,
};
use crate::enumerator::level::{
    EnumObject, LevelState, PropertyUsage, SupportsEngineEditions, SupportsEngineTypes,
    SupportsVersions,
};
use crate::enumerator::request::{PropertyAlias, Request, ResultType};
use crate::enumerator::result::{DataReader, EnumData, EnumResult};
use crate::error::{EnumError, Result};
use crate::filter::{FilterDecoder, FilterNode, SqlFilterCallback};

/// Level served by a `SELECT` over the catalog, described by a definition file
#[derive(Debug, Default)]
pub struct SqlLevel {
    state: LevelState,
    definition: Option<Arc<LevelDefinition>>,
    /// Property name to SQL expression, for the properties this server sees
    columns: BTreeMap<String, String>,
}

impl SqlLevel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Level bound to an already parsed definition
    #[must_use]
    pub fn from_definition(definition: LevelDefinition, server: &ServerInformation) -> Self {
        let mut level = Self::default();
        level.apply_definition(Arc::new(definition), server);
        level
    }

    fn apply_definition(&mut self, definition: Arc<LevelDefinition>, server: &ServerInformation) {
        let major = server.version.major;
        for property in definition.visible_properties(major) {
            self.state.add_property(property.property.clone());
        }
        self.columns = definition.columns_for(major);
        self.definition = Some(definition);
    }

    fn definition(&self) -> Result<Arc<LevelDefinition>> {
        self.definition.clone().ok_or_else(|| {
            EnumError::config_error("sql level used before its definition was loaded")
        })
    }

    fn column(&self, name: &str) -> Result<&str> {
        self.columns
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| EnumError::unknown_property(name))
    }

    /// Column expression for `name` after checking `usage`
    fn resolved_column(
        &self,
        name: &str,
        usage: PropertyUsage,
        links: &BTreeMap<String, String>,
    ) -> Result<String> {
        self.property(name, usage)?;
        resolve_parent_references(self.column(name)?, links)
    }

    /// Parent properties this level's request depends on
    fn parent_link_fields(&self, definition: &LevelDefinition, request: &Request) -> Vec<String> {
        let mut wanted: Vec<String> = definition.links.iter().map(|l| l.parent.clone()).collect();
        let mut properties: Vec<&str> = request.field_names().iter().map(String::as_str).collect();
        properties.extend(request.properties.order_by.iter().map(|o| o.field.as_str()));
        properties.extend(request.link_fields.iter().map(String::as_str));

        let mut filter_attributes = Vec::new();
        if let Some(filter) = self.state.block.as_ref().and_then(|b| b.filter()) {
            collect_attributes(filter, &mut filter_attributes);
        }
        properties.extend(filter_attributes.iter().map(String::as_str));

        for name in properties {
            if let Some(sql) = self.columns.get(name) {
                for reference in parent_references(sql) {
                    if !wanted.contains(&reference) {
                        wanted.push(reference);
                    }
                }
            }
        }
        wanted
    }

    fn build_statement(
        &self,
        definition: &LevelDefinition,
        request: &Request,
        parent_links: &BTreeMap<String, String>,
        has_parent: bool,
        ctx: &dyn ConnectionContext,
    ) -> Result<StatementBuilder> {
        let mut statement = StatementBuilder::new();
        statement.add_from(&definition.from);
        statement.set_distinct(definition.distinct);

        if has_parent && !definition.links.is_empty() {
            let conditions = definition
                .links
                .iter()
                .map(|link| {
                    let parent = parent_links.get(&link.parent).ok_or_else(|| {
                        EnumError::internal(format!(
                            "parent did not provide link field {}",
                            link.parent
                        ))
                    })?;
                    Ok(format!("{} = {parent}", link.local))
                })
                .collect::<Result<Vec<_>>>()?;
            statement.set_parent_join(Some(conditions.join(" AND ")));
        }

        for field in request.field_names() {
            let expression = self.resolved_column(field, PropertyUsage::REQUEST, parent_links)?;
            statement.add_field(expression, self.alias_property_name(field)?);
        }

        if let Some(filter) = self.state.block.as_ref().and_then(|b| b.filter()) {
            let mut columns = FilterColumns {
                level: self,
                links: parent_links,
                parameterize: ctx.supports_parameterization(),
            };
            let condition = FilterDecoder::new(&mut columns)
                .with_string_prefix(ctx.string_prefix())
                .sql(filter)?;
            if !condition.is_empty() {
                statement.add_where(condition);
            }
        }

        for order in &request.properties.order_by {
            let expression =
                self.resolved_column(&order.field, PropertyUsage::ORDER, parent_links)?;
            statement.add_order_by(&expression, order.direction);
        }

        Ok(statement)
    }

    fn execute(
        &self,
        statement: &StatementBuilder,
        ctx: &dyn ConnectionContext,
    ) -> Result<DataTable> {
        match execute_sql(ctx, &[statement.sql_statement()]) {
            Err(EnumError::ObjectNotFound(reason)) => {
                warn!(
                    level = self.name(),
                    %reason,
                    "enumeration target not found, returning empty result"
                );
                execute_sql(ctx, &[statement.empty_result_statement()])
            }
            other => other,
        }
    }

    fn query_server(&self, ctx: &dyn ConnectionContext, column: &str) -> Result<String> {
        let query = self
            .definition
            .as_ref()
            .and_then(|d| d.server_query.clone())
            .ok_or_else(|| EnumError::query_not_supported("level cannot describe the server"))?;
        let table = execute_sql(ctx, &[query])?;
        match table.value(0, column) {
            Some(serde_json::Value::String(text)) => Ok(text.clone()),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(EnumError::config_error(format!(
                "server query returned no '{column}' value"
            ))),
        }
    }
}

/// Attribute names used anywhere in a filter
fn collect_attributes(node: &FilterNode, out: &mut Vec<String>) {
    if let FilterNode::Attribute { name } = node {
        out.push(name.as_str().to_string());
    }
    for child in node.children() {
        collect_attributes(child, out);
    }
}

struct FilterColumns<'a> {
    level: &'a SqlLevel,
    links: &'a BTreeMap<String, String>,
    parameterize: bool,
}

impl SqlFilterCallback for FilterColumns<'_> {
    fn add_property_for_filter(&mut self, name: &str) -> Result<String> {
        self.level.resolved_column(name, PropertyUsage::FILTER, self.links)
    }

    fn supports_parameterization(&self) -> bool {
        self.parameterize
    }
}

impl EnumObject for SqlLevel {
    fn state(&self) -> &LevelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut LevelState {
        &mut self.state
    }

    fn load_init_data(
        &mut self,
        cfg: &str,
        resources: &dyn ResourceLoader,
        server: &ServerInformation,
    ) -> Result<()> {
        let definition = LevelDefinition::parse(&resources.load(cfg)?)?;
        debug!(
            level = %definition.name,
            cfg,
            properties = definition.properties.len(),
            "loaded level definition"
        );
        self.apply_definition(Arc::new(definition), server);
        Ok(())
    }

    fn retrieve_parent_request(&mut self) -> Result<Option<Request>> {
        let Some(request) = self.state.request.as_ref() else {
            return Ok(None);
        };
        let Some(parent_urn) = self.state.urn.parent() else {
            return Ok(None);
        };
        let definition = self.definition()?;

        let mut parent = Request::new(parent_urn);
        parent.result_type = if request.result_type == ResultType::Reserved2 {
            ResultType::Reserved2
        } else {
            ResultType::Reserved1
        };

        let mut remaining = request.parent_properties_requests.clone();
        let own = if remaining.is_empty() { None } else { remaining.remove(0) };
        match own {
            Some(mut properties) => {
                if properties.property_alias.is_none() {
                    properties.property_alias = Some(PropertyAlias::node_name());
                }
                parent.properties = properties;
            }
            None => parent.properties.fields = Some(Vec::new()),
        }
        parent.parent_properties_requests = remaining;
        parent.link_fields = self.parent_link_fields(&definition, request);
        Ok(Some(parent))
    }

    fn get_data(
        &mut self,
        parent: Option<EnumResult>,
        ctx: &dyn ConnectionContext,
    ) -> Result<EnumResult> {
        let definition = self.definition()?;
        let request = self
            .state
            .request
            .clone()
            .ok_or_else(|| EnumError::internal("level has no request to serve"))?;

        let parent = parent.map(EnumResult::into_statement).transpose()?;
        let empty = BTreeMap::new();
        let parent_links = parent.as_ref().map_or(&empty, |p| &p.link_sql);

        let mut statement =
            self.build_statement(&definition, &request, parent_links, parent.is_some(), ctx)?;

        let mut link_sql = BTreeMap::new();
        for field in &request.link_fields {
            let expression = self.resolved_column(field, PropertyUsage::RESERVED1, parent_links)?;
            link_sql.insert(field.clone(), expression);
        }

        if let Some(parent) = parent {
            statement.merge_parent(parent.statement);
        }

        let result_type = request.result_type;
        if result_type.is_reserved() {
            return Ok(EnumResult::new(
                result_type,
                EnumData::Statement(SqlEnumResult {
                    statement,
                    link_sql,
                }),
            ));
        }

        if result_type == ResultType::XmlDocument {
            return Err(EnumError::result_not_supported(format!(
                "{} cannot produce {result_type}",
                self.name()
            )));
        }

        debug!(level = self.name(), sql = %statement.sql_statement(), "running level statement");
        let table = self.execute(&statement, ctx)?;
        Ok(match result_type {
            ResultType::DataSet => EnumResult::new(result_type, EnumData::DataSet(vec![table])),
            ResultType::DataReader => {
                EnumResult::new(result_type, EnumData::Reader(DataReader::new(table)))
            }
            _ => EnumResult::new(ResultType::DataTable, EnumData::Table(table)),
        })
    }

    fn result_types(&self) -> Vec<ResultType> {
        vec![ResultType::DataTable, ResultType::DataSet, ResultType::DataReader]
    }

    fn versions(&self) -> Option<&dyn SupportsVersions> {
        self.definition
            .as_ref()?
            .server_query
            .as_ref()
            .map(|_| self as &dyn SupportsVersions)
    }

    fn engine_types(&self) -> Option<&dyn SupportsEngineTypes> {
        self.definition
            .as_ref()?
            .server_query
            .as_ref()
            .map(|_| self as &dyn SupportsEngineTypes)
    }

    fn engine_editions(&self) -> Option<&dyn SupportsEngineEditions> {
        self.definition
            .as_ref()?
            .server_query
            .as_ref()
            .map(|_| self as &dyn SupportsEngineEditions)
    }
}

impl SupportsVersions for SqlLevel {
    fn server_version(&self, ctx: &dyn ConnectionContext) -> Result<ServerVersion> {
        ServerVersion::parse(&self.query_server(ctx, "version")?)
    }
}

impl SupportsEngineTypes for SqlLevel {
    fn engine_type(&self, ctx: &dyn ConnectionContext) -> Result<DatabaseEngineType> {
        Ok(DatabaseEngineType::from_name(&self.query_server(ctx, "engine_type")?))
    }
}

impl SupportsEngineEditions for SqlLevel {
    fn engine_edition(&self, ctx: &dyn ConnectionContext) -> Result<DatabaseEngineEdition> {
        Ok(DatabaseEngineEdition::from_name(&self.query_server(ctx, "edition")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BundledResources;
    use crate::enumerator::request::{OrderBy, PropertiesRequest};
    use crate::urn::{Urn, XPathExpression};
    use pretty_assertions::assert_eq;

    fn level(cfg: &str, urn: &str, server: &ServerInformation) -> SqlLevel {
        let mut level = SqlLevel::new();
        level.load_init_data(cfg, &BundledResources, server).unwrap();
        let urn = Urn::new(urn);
        let block = XPathExpression::compile(urn.value())
            .unwrap()
            .blocks()
            .last()
            .unwrap()
            .clone();
        level.initialize(block, urn);
        level
    }

    fn server16() -> ServerInformation {
        ServerInformation {
            version: ServerVersion::new(16, 0, 0),
            ..Default::default()
        }
    }

    #[test]
    fn test_definition_properties_follow_version() {
        let modern = level("levels/database.xml", "Server/Database", &server16());
        assert!(modern.try_property("IsLedger", PropertyUsage::REQUEST).is_some());

        let old = level(
            "levels/database.xml",
            "Server/Database",
            &ServerInformation::default(),
        );
        assert!(old.try_property("IsLedger", PropertyUsage::REQUEST).is_none());
        assert!(old.try_property("Name", PropertyUsage::ALL).is_some());
    }

    #[test]
    fn test_parent_request_collects_link_fields() {
        let mut table = level(
            "levels/table.xml",
            "Server/Database[@Name='Foo']/Table[@Schema='dbo']",
            &server16(),
        );
        table.set_request(
            Request::new("Server/Database[@Name='Foo']/Table[@Schema='dbo']")
                .with_fields(&["Name", "Urn"])
                .with_parent_properties(vec![Some(PropertiesRequest::fields(&["Name"])), None]),
        );

        let parent = table.retrieve_parent_request().unwrap().unwrap();
        assert_eq!(parent.urn.value(), "Server/Database[@Name='Foo']");
        assert_eq!(parent.result_type, ResultType::Reserved1);
        assert_eq!(
            parent.link_fields,
            vec!["ID".to_string(), "Urn".to_string()]
        );
        assert_eq!(parent.field_names(), ["Name".to_string()]);
        assert_eq!(
            parent.properties.property_alias,
            Some(PropertyAlias::node_name())
        );
        assert_eq!(parent.parent_properties_requests, vec![None]);
    }

    #[test]
    fn test_root_has_no_parent_request() {
        let mut server = level("levels/server.xml", "Server", &server16());
        server.set_request(Request::new("Server").with_fields(&["Name"]));
        assert!(server.retrieve_parent_request().unwrap().is_none());
    }

    #[test]
    #[cfg(feature = "sqlite")]
    fn test_statement_hand_off() {
        let ctx = crate::engine::sqlite::SqliteContext::demo().unwrap();
        let mut database = level(
            "levels/database.xml",
            "Server/Database[@Name='Foo']",
            &server16(),
        );
        let mut request =
            Request::new("Server/Database[@Name='Foo']").with_result_type(ResultType::Reserved1);
        request.properties.fields = Some(Vec::new());
        request.link_fields = vec!["ID".to_string()];
        database.set_request(request);

        let mut server = level("levels/server.xml", "Server", &server16());
        let mut server_request = Request::new("Server").with_result_type(ResultType::Reserved1);
        server_request.properties.fields = Some(Vec::new());
        server.set_request(server_request);

        let from_server = server.get_data(None, &ctx).unwrap();
        let result = database.get_data(Some(from_server), &ctx).unwrap();
        let statement = result.as_statement().unwrap();
        assert_eq!(statement.link_sql["ID"], "db.database_id");
        assert_eq!(
            statement.statement.sql_statement(),
            "SELECT NULL AS [_]\nFROM sys_server AS srv\nCROSS JOIN sys_databases AS db\nWHERE (db.name='Foo')"
        );
    }

    #[test]
    #[cfg(feature = "sqlite")]
    fn test_usage_is_enforced() {
        let ctx = crate::engine::sqlite::SqliteContext::demo().unwrap();
        let mut login = level("levels/login.xml", "Server/Login", &server16());
        login.set_request(
            Request::new("Server/Login")
                .with_fields(&["Name"])
                .with_order_by(vec![OrderBy::asc("Sid")]),
        );
        let err = login.get_data(None, &ctx).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PROPERTY_USAGE");
    }

    #[test]
    #[cfg(feature = "sqlite")]
    fn test_server_capabilities() {
        let ctx = crate::engine::sqlite::SqliteContext::demo().unwrap();
        let server = level("levels/server.xml", "Server", &ServerInformation::default());
        let version = server.versions().unwrap().server_version(&ctx).unwrap();
        assert_eq!(version, ServerVersion::new(16, 0, 1000));
        assert_eq!(
            server.engine_types().unwrap().engine_type(&ctx).unwrap(),
            DatabaseEngineType::Standalone
        );
        assert_eq!(
            server.engine_editions().unwrap().engine_edition(&ctx).unwrap(),
            DatabaseEngineEdition::Enterprise
        );

        let database = level(
            "levels/database.xml",
            "Server/Database",
            &ServerInformation::default(),
        );
        assert!(database.versions().is_none());
    }

    #[test]
    #[cfg(feature = "sqlite")]
    fn test_unloaded_level_is_config_error() {
        let ctx = crate::engine::sqlite::SqliteContext::demo().unwrap();
        let mut bare = SqlLevel::new();
        bare.set_request(Request::new("Server"));
        assert_eq!(
            bare.get_data(None, &ctx).unwrap_err().error_code(),
            "CONFIG_ERROR"
        );
    }
}
