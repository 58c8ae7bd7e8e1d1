//! Level Resolution
//!
//! One request runs through every level of its urn:
//!
//! 1. Describe the server (connection context, else the top level's
//!    capabilities, else defaults)
//! 2. Check out one level object per urn segment from the cache and bind
//!    each to its expression block and the urn up to that segment
//! 3. Leaf to root: hand each level its request and ask it for its parent's
//! 4. Root to leaf: `get_data`, each level receiving its parent's result
//! 5. Leaf to root: `post_process`
//! 6. Return every level to the cache
//!
//! Steps 5 and 6 also run when an earlier step fails.

use tracing::debug;

use super::level::{EnumObject, PropertyUsage};
use super::request::Request;
use super::result::{EnumResult, ObjectInfo, ObjectInfoFlags, RequestObjectInfo};
use crate::cache::{CacheElement, ObjectCache};
use crate::engine::{ConnectionContext, ServerInformation};
use crate::error::{EnumError, Result};
use crate::urn::Urn;

pub struct Environment<'a> {
    cache: &'a ObjectCache,
}

impl<'a> Environment<'a> {
    #[must_use]
    pub const fn new(cache: &'a ObjectCache) -> Self {
        Self { cache }
    }

    /// Server the request runs against
    pub fn server_information(
        &self,
        urn: &Urn,
        ctx: &dyn ConnectionContext,
    ) -> Result<ServerInformation> {
        if let Some(info) = ctx.server_information() {
            return Ok(info);
        }
        let first = self.cache.load_first_element_versionless(urn)?;
        let mut info = ServerInformation::default();
        if let Some(versions) = first.versions() {
            info.version = versions.server_version(ctx)?;
        }
        if let Some(types) = first.engine_types() {
            info.engine_type = types.engine_type(ctx)?;
        }
        if let Some(editions) = first.engine_editions() {
            info.edition = editions.engine_edition(ctx)?;
        }
        debug!(
            version = %info.version,
            engine_type = %info.engine_type,
            edition = %info.edition,
            "described server from its top level"
        );
        Ok(info)
    }

    /// Run `request` through every level of its urn
    pub fn get_data(&self, request: Request, ctx: &dyn ConnectionContext) -> Result<EnumResult> {
        let urn = request.urn.clone();
        let server = self.server_information(&urn, ctx)?;
        let mut elements = self.cache.get_all_elements(&urn, &server)?;

        let result = Self::bind(&mut elements, &urn)
            .and_then(|()| Self::chain_requests(&mut elements, request))
            .and_then(|()| Self::collect(&mut elements, ctx));

        for element in elements.iter_mut().rev() {
            element.level_mut().post_process(result.as_ref().ok());
        }
        self.cache.put_all_elements(elements);
        result
    }

    fn bind(elements: &mut [CacheElement], urn: &Urn) -> Result<()> {
        let blocks = urn.expression()?.blocks().to_vec();
        if blocks.len() != elements.len() {
            return Err(EnumError::internal(format!(
                "urn has {} levels but {} level objects were resolved",
                blocks.len(),
                elements.len()
            )));
        }

        let mut prefix = Some(urn.clone());
        for (element, block) in elements.iter_mut().zip(blocks).rev() {
            let level_urn = prefix
                .take()
                .ok_or_else(|| EnumError::internal("urn ended before its levels"))?;
            prefix = level_urn.parent();
            element.level_mut().initialize(block, level_urn);
        }
        Ok(())
    }

    fn chain_requests(elements: &mut [CacheElement], request: Request) -> Result<()> {
        let mut next = Some(request);
        for (i, element) in elements.iter_mut().enumerate().rev() {
            let level = element.level_mut();
            let request = next.take().ok_or_else(|| {
                EnumError::internal(format!(
                    "level below {} did not request anything from it",
                    level.name()
                ))
            })?;
            level.set_request(request);
            next = level.retrieve_parent_request()?;
            if i == 0 && next.is_some() {
                debug!(
                    level = level.name(),
                    "top level asked for a parent request, ignoring"
                );
            }
        }
        Ok(())
    }

    fn collect(elements: &mut [CacheElement], ctx: &dyn ConnectionContext) -> Result<EnumResult> {
        let mut result = None;
        for element in elements.iter_mut() {
            result = Some(element.level_mut().get_data(result, ctx)?);
        }
        result.ok_or_else(|| EnumError::invalid_input("urn has no levels"))
    }

    /// Metadata about the level at `request.urn`
    pub fn get_object_info(
        &self,
        request: &RequestObjectInfo,
        ctx: &dyn ConnectionContext,
    ) -> Result<ObjectInfo> {
        let server = self.server_information(&request.urn, ctx)?;
        self.object_info_for(&server, request)
    }

    /// Metadata about the level at `request.urn` for a known server
    pub fn object_info_for(
        &self,
        server: &ServerInformation,
        request: &RequestObjectInfo,
    ) -> Result<ObjectInfo> {
        let info = self.cache.metadata().resolve(&request.urn)?;
        let element = self.cache.get_element(&info, server)?;
        let object_info = describe(&element, request.flags);
        self.cache.put_element(element);
        Ok(object_info)
    }
}

fn describe(element: &CacheElement, flags: ObjectInfoFlags) -> ObjectInfo {
    let level: &dyn EnumObject = element.level();
    let mut info = ObjectInfo::default();
    if flags.contains(ObjectInfoFlags::CHILDREN) {
        info.children = element.children().to_vec();
    }
    if flags.contains(ObjectInfoFlags::PROPERTIES) {
        info.properties = level
            .properties(PropertyUsage::ALL)
            .into_iter()
            .cloned()
            .collect();
    }
    if flags.contains(ObjectInfoFlags::URN_PROPERTIES) {
        info.urn_properties = level.urn_properties().into_iter().cloned().collect();
    }
    if flags.contains(ObjectInfoFlags::RESULT_TYPES) {
        info.result_types = level.result_types();
    }
    info
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::BundledResources;
    use crate::engine::sqlite::SqliteContext;
    use crate::engine::{DatabaseEngineEdition, ServerVersion};
    use crate::enumerator::request::ResultType;
    use crate::metadata::ObjectLoadInfoManager;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn cache() -> ObjectCache {
        let metadata = ObjectLoadInfoManager::new(Arc::new(BundledResources));
        ObjectCache::new(Arc::new(metadata))
    }

    #[test]
    fn test_server_described_by_top_level() {
        let cache = cache();
        let ctx = SqliteContext::demo().unwrap();
        let info = Environment::new(&cache)
            .server_information(&Urn::new("Server/Database"), &ctx)
            .unwrap();
        assert_eq!(info.version, ServerVersion::new(16, 0, 1000));
        assert_eq!(info.edition, DatabaseEngineEdition::Enterprise);

        let fixed = ServerInformation {
            version: ServerVersion::new(15, 0, 0),
            ..Default::default()
        };
        let ctx = SqliteContext::demo()
            .unwrap()
            .with_server_information(fixed);
        let info = Environment::new(&cache)
            .server_information(&Urn::new("Server"), &ctx)
            .unwrap();
        assert_eq!(info, fixed);
    }

    #[test]
    fn test_levels_return_to_cache() {
        let cache = cache();
        let ctx = SqliteContext::demo().unwrap();
        let request = Request::new("Server/Database[@Name='Foo']").with_fields(&["Name", "ID"]);
        let result = Environment::new(&cache).get_data(request, &ctx).unwrap();
        let table = result.into_table().unwrap();
        assert_eq!(table.columns, vec!["Name".to_string(), "ID".to_string()]);
        assert_eq!(
            table.rows,
            vec![vec![serde_json::json!("Foo"), serde_json::json!(2)]]
        );
        assert_eq!(cache.len(), 2);

        let failing = Request::new("Server/Database").with_fields(&["Nope"]);
        let err = Environment::new(&cache).get_data(failing, &ctx).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_statement_request() {
        let cache = cache();
        let ctx = SqliteContext::demo().unwrap();
        let request = Request::new("Server/Login[@Name='sa']")
            .with_fields(&["Name"])
            .with_result_type(ResultType::Reserved1);
        let result = Environment::new(&cache).get_data(request, &ctx).unwrap();
        assert_eq!(
            result.as_statement().unwrap().statement.sql_statement(),
            "SELECT lg.name AS [Name]\nFROM sys_server AS srv\nCROSS JOIN sys_logins AS lg\nWHERE (lg.name='sa')"
        );
    }

    #[test]
    fn test_object_info_flags() {
        let cache = cache();
        let env = Environment::new(&cache);
        let server = ServerInformation::default();

        let request = RequestObjectInfo::new("Server/Database/Table", ObjectInfoFlags::ALL);
        let all = env.object_info_for(&server, &request).unwrap();
        assert_eq!(all.children, vec!["Column".to_string()]);
        assert!(all.property("RowCount").unwrap().expensive);
        let urn_names: Vec<&str> = all.urn_properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(urn_names, vec!["Name", "Schema"]);
        assert_eq!(
            all.result_types,
            vec![
                ResultType::DataTable,
                ResultType::DataSet,
                ResultType::DataReader
            ]
        );

        let request = RequestObjectInfo::new("Server", ObjectInfoFlags::CHILDREN);
        let children_only = env.object_info_for(&server, &request).unwrap();
        assert_eq!(
            children_only.children,
            vec!["Database".to_string(), "Login".to_string()]
        );
        assert!(children_only.properties.is_empty());
        assert!(children_only.result_types.is_empty());
    }
}
