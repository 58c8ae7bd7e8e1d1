//! Enumerator
//!
//! Entry point for enumeration requests. An [`Enumerator`] owns the level
//! metadata and the level object cache; requests run through
//! [`Environment`] against a caller-supplied [`ConnectionContext`].
//!
//! # Property Lists
//! Before a request runs, every property list in it is made explicit:
//! - No list: every requestable, non-expensive property of the level
//! - [`RequestFieldsKind::INCLUDE_EXPENSIVE`]: expensive properties too
//! - [`RequestFieldsKind::REJECT`]: every requestable property except the listed ones
//!
//! A request that ends up asking for no property at all is rejected.

pub mod environment;
pub mod level;
pub mod request;
pub mod result;
pub mod sql;

use std::sync::Arc;

use tracing::debug;

pub use crate::engine::DataTable;
pub use environment::Environment;
pub use level::{EnumObject, ObjectProperty, PropertyType, PropertyUsage};
pub use request::{
    AliasKind, Direction, OrderBy, PropertiesRequest, PropertyAlias, Request, RequestFieldsKind,
    ResultType,
};
pub use result::{
    DataReader, EnumData, EnumResult, ObjectInfo, ObjectInfoFlags, RequestObjectInfo,
};

use crate::cache::ObjectCache;
use crate::config::{EnumeratorSettings, ResourceLoader};
use crate::engine::{ConnectionContext, ServerInformation};
use crate::error::{EnumError, Result};
use crate::metadata::{LevelFactory, ObjectLoadInfo, ObjectLoadInfoManager};
use crate::urn::Urn;

#[derive(Debug)]
pub struct Enumerator {
    settings: EnumeratorSettings,
    cache: ObjectCache,
}

impl Default for Enumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Enumerator {
    /// Enumerator over the bundled metadata with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(EnumeratorSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: EnumeratorSettings) -> Self {
        let metadata = Arc::new(ObjectLoadInfoManager::new(settings.resources()));
        let cache = ObjectCache::with_capacity(metadata, settings.cache_capacity);
        Self { settings, cache }
    }

    /// Enumerator reading metadata from `resources`
    #[must_use]
    pub fn with_resources(resources: Arc<dyn ResourceLoader>) -> Self {
        let settings = EnumeratorSettings::default();
        let metadata = Arc::new(ObjectLoadInfoManager::new(resources));
        let cache = ObjectCache::with_capacity(metadata, settings.cache_capacity);
        Self { settings, cache }
    }

    #[must_use]
    pub const fn settings(&self) -> &EnumeratorSettings {
        &self.settings
    }

    #[must_use]
    pub const fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Run `request` and return the leaf level's result
    pub fn get_data(&self, request: &Request, ctx: &dyn ConnectionContext) -> Result<EnumResult> {
        debug!(urn = %request.urn, "received request");
        let mut request = request.shallow_clone();
        if request.result_type == ResultType::Default {
            request.result_type = self.settings.result_type;
        }

        let fields = request.properties.fields.take();
        let kind = request.properties.fields_kind;
        let fields = self.fix_property_list(ctx, &request.urn, fields, kind)?;
        let mut requested = fields.len();
        request.properties.fields = Some(fields);
        request.properties.fields_kind = RequestFieldsKind::REQUEST;

        let mut urn = Some(request.urn.clone());
        for parent in &mut request.parent_properties_requests {
            let Some(parent_urn) = urn.as_ref().and_then(Urn::parent) else {
                break;
            };
            if let Some(parent) = parent {
                let fields = self.fix_property_list(
                    ctx,
                    &parent_urn,
                    parent.fields.take(),
                    parent.fields_kind,
                )?;
                requested += fields.len();
                parent.fields = Some(fields);
                parent.fields_kind = RequestFieldsKind::REQUEST;
            }
            urn = Some(parent_urn);
        }

        if requested == 0 {
            return Err(EnumError::query_not_supported("no properties requested"));
        }
        Environment::new(&self.cache).get_data(request, ctx)
    }

    /// SQL the leaf level would run for `request`, without running it
    pub fn statement(&self, request: &Request, ctx: &dyn ConnectionContext) -> Result<String> {
        let request = request.shallow_clone().with_result_type(ResultType::Reserved1);
        let result = self.get_data(&request, ctx)?;
        Ok(result.into_statement()?.statement.sql_statement())
    }

    pub fn get_object_info(
        &self,
        request: &RequestObjectInfo,
        ctx: &dyn ConnectionContext,
    ) -> Result<ObjectInfo> {
        Environment::new(&self.cache).get_object_info(request, ctx)
    }

    /// Object info for a known server, without a connection
    pub fn object_info_for(
        &self,
        server: &ServerInformation,
        request: &RequestObjectInfo,
    ) -> Result<ObjectInfo> {
        Environment::new(&self.cache).object_info_for(server, request)
    }

    pub fn server_information(
        &self,
        urn: &Urn,
        ctx: &dyn ConnectionContext,
    ) -> Result<ServerInformation> {
        Environment::new(&self.cache).server_information(urn, ctx)
    }

    /// Add level `name` served by `implement` under `parent` (top level when `None`)
    pub fn register_extension(
        &self,
        parent: Option<&Urn>,
        name: &str,
        implement: &str,
    ) -> Result<ObjectLoadInfo> {
        self.cache.metadata().add_extension(parent, name, implement)
    }

    pub fn register_factory(&self, implement: impl Into<String>, factory: LevelFactory) {
        self.cache.metadata().register_factory(implement, factory);
    }

    fn fix_property_list(
        &self,
        ctx: &dyn ConnectionContext,
        urn: &Urn,
        fields: Option<Vec<String>>,
        kind: RequestFieldsKind,
    ) -> Result<Vec<String>> {
        if let Some(fields) = &fields {
            if kind.contains(RequestFieldsKind::REQUEST) {
                return Ok(fields.clone());
            }
        }

        let request = RequestObjectInfo::new(urn.clone(), ObjectInfoFlags::PROPERTIES);
        let info = self.get_object_info(&request, ctx)?;
        let include_expensive = kind.contains(RequestFieldsKind::INCLUDE_EXPENSIVE);
        let rejected = fields.unwrap_or_default();
        Ok(info
            .properties
            .into_iter()
            .filter(|p| p.usage.contains(PropertyUsage::REQUEST))
            .filter(|p| !p.expensive || include_expensive)
            .filter(|p| !rejected.contains(&p.name))
            .map(|p| p.name)
            .collect())
    }
}
