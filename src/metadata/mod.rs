//! Level Metadata
//!
//! The level hierarchy (`config.xml`) names, for every urn segment, the
//! implementation that serves it and the definition file it is initialized
//! from:
//!
//! ```xml
//! <hierarchy>
//!   <object type="Server" assembly="urnquery" implement="SqlObject" cfg="levels/server.xml">
//!     <object type="Database" implement="SqlObject" cfg="levels/database.xml"/>
//!   </object>
//! </hierarchy>
//! ```
//!
//! # Loading
//! The hierarchy is read on first use and kept for the lifetime of the
//! manager. Loading and extension grafting happen under one lock; a failed
//! load leaves nothing behind and is retried on the next lookup.
//!
//! # Keys
//! Every node gets a unique key. Keys advance by [`SAME_OBJECT_NUMBER`] so the
//! cache can derive that many distinct slots per node without collisions.
//!
//! # Implementations
//! `implement` names are looked up in a factory registry. `SqlObject` is
//! registered by default; extensions register their own.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::cache::SAME_OBJECT_NUMBER;
use crate::config::{ResourceLoader, HIERARCHY_RESOURCE};
use crate::engine::ServerInformation;
use crate::enumerator::level::EnumObject;
use crate::enumerator::sql::{SqlLevel, SQL_LEVEL_IMPLEMENTATION};
use crate::error::{EnumError, Result};
use crate::urn::Urn;

/// Builds an uninitialized level object for a metadata node
pub type LevelFactory = Arc<dyn Fn(&ObjectLoadInfo) -> Result<Box<dyn EnumObject>> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct XmlHierarchy {
    #[serde(rename = "object", default)]
    objects: Vec<XmlObject>,
}

#[derive(Debug, Deserialize)]
struct XmlObject {
    #[serde(rename = "@type")]
    name: String,
    #[serde(rename = "@assembly")]
    assembly: Option<String>,
    #[serde(rename = "@cfg")]
    cfg: Option<String>,
    #[serde(rename = "@implement")]
    implement: String,
    #[serde(rename = "@allow_recursion")]
    allow_recursion: Option<bool>,
    #[serde(rename = "object", default)]
    children: Vec<XmlObject>,
}

/// Snapshot of one hierarchy node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLoadInfo {
    pub name: String,
    pub assembly: Option<String>,
    /// Definition resource handed to [`EnumObject::load_init_data`]
    pub init_data: Option<String>,
    pub implement: String,
    pub unique_key: u32,
    /// A child segment with this node's own name resolves to this node
    pub allows_recursion: bool,
    /// Child names in sorted order
    pub children: Vec<String>,
}

#[derive(Debug)]
struct Node {
    name: String,
    assembly: Option<String>,
    init_data: Option<String>,
    implement: String,
    unique_key: u32,
    allows_recursion: bool,
    children: BTreeMap<String, usize>,
}

/// Arena holding the loaded hierarchy
#[derive(Debug, Default)]
struct Hierarchy {
    nodes: Vec<Node>,
    roots: BTreeMap<String, usize>,
    next_key: u32,
}

impl Hierarchy {
    fn parse(xml: &str) -> Result<Self> {
        let document: XmlHierarchy = from_str(xml)
            .map_err(|e| EnumError::config_error(format!("invalid level hierarchy: {e}")))?;
        let mut hierarchy = Self::default();
        for object in document.objects {
            hierarchy.graft(None, object)?;
        }
        Ok(hierarchy)
    }

    fn graft(&mut self, parent: Option<usize>, object: XmlObject) -> Result<usize> {
        let index = self.add_node(
            parent,
            Node {
                name: object.name,
                assembly: object.assembly,
                init_data: object.cfg,
                implement: object.implement,
                unique_key: 0,
                allows_recursion: object.allow_recursion.unwrap_or(false),
                children: BTreeMap::new(),
            },
        )?;
        for child in object.children {
            self.graft(Some(index), child)?;
        }
        Ok(index)
    }

    fn add_node(&mut self, parent: Option<usize>, mut node: Node) -> Result<usize> {
        let siblings = match parent {
            Some(p) => &self.nodes[p].children,
            None => &self.roots,
        };
        if siblings.contains_key(&node.name) {
            return Err(EnumError::config_error(format!("level {} is declared twice", node.name)));
        }

        node.unique_key = self.next_key;
        self.next_key += SAME_OBJECT_NUMBER;

        let index = self.nodes.len();
        let name = node.name.clone();
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p].children.insert(name, index),
            None => self.roots.insert(name, index),
        };
        Ok(index)
    }

    fn root(&self, name: &str) -> Result<usize> {
        self.roots.get(name).copied().ok_or_else(|| EnumError::unresolved_urn(name))
    }

    fn next_level(&self, current: usize, name: &str) -> Result<usize> {
        let node = &self.nodes[current];
        match node.children.get(name) {
            Some(&child) => Ok(child),
            None if node.allows_recursion && node.name == name => Ok(current),
            None => Err(EnumError::unresolved_urn(name)),
        }
    }

    /// Node index for every name in `types`, top-down
    fn path(&self, types: &[String]) -> Result<Vec<usize>> {
        let mut path = Vec::with_capacity(types.len());
        for name in types {
            let next = match path.last() {
                None => self.root(name)?,
                Some(&current) => self.next_level(current, name)?,
            };
            path.push(next);
        }
        Ok(path)
    }

    fn snapshot(&self, index: usize) -> ObjectLoadInfo {
        let node = &self.nodes[index];
        ObjectLoadInfo {
            name: node.name.clone(),
            assembly: node.assembly.clone(),
            init_data: node.init_data.clone(),
            implement: node.implement.clone(),
            unique_key: node.unique_key,
            allows_recursion: node.allows_recursion,
            children: node.children.keys().cloned().collect(),
        }
    }
}

fn sql_level(_: &ObjectLoadInfo) -> Result<Box<dyn EnumObject>> {
    Ok(Box::new(SqlLevel::new()))
}

/// Registry of hierarchy nodes and level implementations
pub struct ObjectLoadInfoManager {
    resources: Arc<dyn ResourceLoader>,
    hierarchy: Mutex<Option<Hierarchy>>,
    factories: RwLock<HashMap<String, LevelFactory>>,
}

impl std::fmt::Debug for ObjectLoadInfoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLoadInfoManager").finish_non_exhaustive()
    }
}

impl ObjectLoadInfoManager {
    /// Manager reading the hierarchy and level definitions from `resources`
    pub fn new(resources: Arc<dyn ResourceLoader>) -> Self {
        let mut factories: HashMap<String, LevelFactory> = HashMap::new();
        factories.insert(SQL_LEVEL_IMPLEMENTATION.to_string(), Arc::new(sql_level));
        Self {
            resources,
            hierarchy: Mutex::new(None),
            factories: RwLock::new(factories),
        }
    }

    #[must_use]
    pub fn resources(&self) -> &Arc<dyn ResourceLoader> {
        &self.resources
    }

    fn with_hierarchy<R>(&self, f: impl FnOnce(&mut Hierarchy) -> Result<R>) -> Result<R> {
        let mut guard = self.hierarchy.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let hierarchy = Hierarchy::parse(&self.resources.load(HIERARCHY_RESOURCE)?)?;
            debug!(levels = hierarchy.nodes.len(), "loaded level hierarchy");
            *guard = Some(hierarchy);
        }
        match guard.as_mut() {
            Some(hierarchy) => f(hierarchy),
            None => Err(EnumError::internal("level hierarchy missing after load")),
        }
    }

    /// Node serving the last segment of `urn`
    pub fn resolve(&self, urn: &Urn) -> Result<ObjectLoadInfo> {
        self.resolve_all(urn)?
            .pop()
            .ok_or_else(|| EnumError::invalid_input("empty urn"))
    }

    /// Node for every segment of `urn`, top-down
    pub fn resolve_all(&self, urn: &Urn) -> Result<Vec<ObjectLoadInfo>> {
        self.resolve_types(&urn.types()?)
    }

    /// Node for every name of a type chain such as `["Server", "Database"]`
    pub fn resolve_types(&self, types: &[String]) -> Result<Vec<ObjectLoadInfo>> {
        self.with_hierarchy(|h| {
            Ok(h.path(types)?
                .into_iter()
                .map(|i| h.snapshot(i))
                .collect())
        })
    }

    /// Node serving the first segment of `urn`
    pub fn resolve_first(&self, urn: &Urn) -> Result<ObjectLoadInfo> {
        let types = urn.types()?;
        let first = types.first().ok_or_else(|| EnumError::invalid_input("empty urn"))?;
        self.with_hierarchy(|h| Ok(h.snapshot(h.root(first)?)))
    }

    /// Top-level level names
    pub fn roots(&self) -> Result<Vec<String>> {
        self.with_hierarchy(|h| Ok(h.roots.keys().cloned().collect()))
    }

    /// Graft a new level named `name` under `parent`, or at the top when `None`
    pub fn add_extension(
        &self,
        parent: Option<&Urn>,
        name: &str,
        implement: &str,
    ) -> Result<ObjectLoadInfo> {
        let parent_types = parent.map(Urn::types).transpose()?;
        self.with_hierarchy(|h| {
            let parent_index = match &parent_types {
                Some(types) => Some(
                    *h.path(types)?
                        .last()
                        .ok_or_else(|| EnumError::invalid_input("empty parent urn"))?,
                ),
                None => None,
            };
            let index = h.add_node(
                parent_index,
                Node {
                    name: name.to_string(),
                    assembly: None,
                    init_data: None,
                    implement: implement.to_string(),
                    unique_key: 0,
                    allows_recursion: false,
                    children: BTreeMap::new(),
                },
            )?;
            debug!(level = name, implement, "registered extension level");
            Ok(h.snapshot(index))
        })
    }

    /// Make `implement` resolvable to objects built by `factory`
    pub fn register_factory(&self, implement: impl Into<String>, factory: LevelFactory) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(implement.into(), factory);
    }

    /// Build the level object for `info` and load its definition for `server`
    pub fn instantiate(
        &self,
        info: &ObjectLoadInfo,
        server: &ServerInformation,
    ) -> Result<Box<dyn EnumObject>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&info.implement)
            .cloned()
            .ok_or_else(|| {
                EnumError::config_error(format!(
                    "no implementation '{}' registered for level {}",
                    info.implement, info.name
                ))
            })?;
        let mut level = factory(info)?;
        if let Some(cfg) = &info.init_data {
            level.load_init_data(cfg, self.resources.as_ref(), server)?;
        }
        Ok(level)
    }
}
