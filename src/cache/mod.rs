//! Level Object Cache
//!
//! Instantiating a level means parsing its definition, so initialized level
//! objects are pooled per metadata node, server version, engine type and
//! edition. A checked-out object leaves the pool until it is put back.
//!
//! # Retention
//! Each element carries a usage counter (`0..=MAX_USAGE`, saturating) that
//! grows on every hit. While the pool is below capacity, returned elements
//! are always kept. At capacity, every other put first ages the pool (each
//! pooled element loses one point), then the incoming element replaces the
//! least used pooled element unless it is used less than that element.
//!
//! # Same-object slots
//! A node may have up to [`SAME_OBJECT_NUMBER`] pooled instances, so urns
//! through a recursive level can check out more than one at a time.
//!
//! All pool traffic is serialized behind one mutex.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::engine::{DatabaseEngineEdition, DatabaseEngineType, ServerInformation};
use crate::enumerator::level::EnumObject;
use crate::error::Result;
use crate::metadata::{ObjectLoadInfo, ObjectLoadInfoManager};
use crate::urn::Urn;

/// Pool size before eviction starts
pub const CACHE_CAPACITY: usize = 15;

/// Upper bound of an element's usage counter
pub const MAX_USAGE: u32 = 15;

/// Puts at capacity between two agings
pub const PINGS_FOR_AGING: u32 = 1;

/// Pooled instances allowed per metadata node
pub const SAME_OBJECT_NUMBER: u32 = 2;

/// Pool key; ordered component by component in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    /// Unique key of the metadata node
    pub base: u32,
    /// `major * 100 + minor`
    pub version: i32,
    pub slot: u32,
    pub engine_type: DatabaseEngineType,
    pub edition: DatabaseEngineEdition,
}

impl CacheKey {
    #[must_use]
    pub const fn new(info: &ObjectLoadInfo, server: &ServerInformation) -> Self {
        Self {
            base: info.unique_key,
            version: server.version.cache_number(),
            slot: 0,
            engine_type: server.engine_type,
            edition: server.edition,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.version)
    }
}

/// Level object plus its cache bookkeeping
pub struct CacheElement {
    info: ObjectLoadInfo,
    level: Box<dyn EnumObject>,
    usage: u32,
    key: CacheKey,
}

impl fmt::Debug for CacheElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheElement")
            .field("level", &self.info.name)
            .field("usage", &self.usage)
            .field("key", &self.key)
            .finish()
    }
}

impl CacheElement {
    #[must_use]
    pub fn new(info: ObjectLoadInfo, level: Box<dyn EnumObject>, key: CacheKey) -> Self {
        Self {
            info,
            level,
            usage: 0,
            key,
        }
    }

    #[must_use]
    pub fn level(&self) -> &dyn EnumObject {
        self.level.as_ref()
    }

    pub fn level_mut(&mut self) -> &mut dyn EnumObject {
        self.level.as_mut()
    }

    #[must_use]
    pub const fn usage(&self) -> u32 {
        self.usage
    }

    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    #[must_use]
    pub const fn info(&self) -> &ObjectLoadInfo {
        &self.info
    }

    /// Names of the child levels
    #[must_use]
    pub fn children(&self) -> &[String] {
        &self.info.children
    }

    fn increment_usage(&mut self) {
        if self.usage < MAX_USAGE {
            self.usage += 1;
        }
    }

    fn decrement_usage(&mut self) {
        self.usage = self.usage.saturating_sub(1);
    }
}

#[derive(Default)]
struct Pool {
    elements: BTreeMap<CacheKey, CacheElement>,
    pings: u32,
}

impl Pool {
    /// Checked-out element for `key` in any slot, removed from the pool
    fn take(&mut self, mut key: CacheKey) -> Option<CacheElement> {
        for slot in 0..SAME_OBJECT_NUMBER {
            key.slot = slot;
            if let Some(element) = self.elements.remove(&key) {
                return Some(element);
            }
        }
        None
    }

    /// Store `element` in the first free slot; when all are taken the
    /// occupant of the last slot gains a point and `element` is dropped
    fn insert(&mut self, mut element: CacheElement) -> bool {
        let mut last = None;
        for slot in 0..SAME_OBJECT_NUMBER {
            element.key.slot = slot;
            if !self.elements.contains_key(&element.key) {
                self.elements.insert(element.key, element);
                return true;
            }
            last = Some(element.key);
        }
        if let Some(occupant) = last.and_then(|k| self.elements.get_mut(&k)) {
            occupant.increment_usage();
        }
        debug!(key = %element.key, "all slots taken, dropping returned level");
        false
    }

    fn try_insert(&mut self, element: CacheElement, with_aging: bool) {
        let mut smallest: Option<(CacheKey, u32)> = None;
        for (key, pooled) in &mut self.elements {
            if with_aging {
                pooled.decrement_usage();
            }
            match smallest {
                Some((_, usage)) if usage < pooled.usage => {}
                _ => smallest = Some((*key, pooled.usage)),
            }
        }

        let Some((smallest_key, smallest_usage)) = smallest else {
            self.insert(element);
            return;
        };
        if element.usage < smallest_usage {
            debug!(
                key = %element.key,
                usage = element.usage,
                "returned level used less than pool minimum, dropping"
            );
            return;
        }
        if self.insert(element) {
            debug!(
                key = %smallest_key,
                usage = smallest_usage,
                "evicting least used level"
            );
            self.elements.remove(&smallest_key);
        }
    }
}

/// Pool of initialized level objects
pub struct ObjectCache {
    metadata: Arc<ObjectLoadInfoManager>,
    capacity: usize,
    pool: Mutex<Pool>,
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl ObjectCache {
    #[must_use]
    pub fn new(metadata: Arc<ObjectLoadInfoManager>) -> Self {
        Self::with_capacity(metadata, CACHE_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(metadata: Arc<ObjectLoadInfoManager>, capacity: usize) -> Self {
        Self {
            metadata,
            capacity,
            pool: Mutex::new(Pool::default()),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<ObjectLoadInfoManager> {
        &self.metadata
    }

    fn pool(&self) -> std::sync::MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of pooled (not checked-out) elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool().elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an element for `info` and `server` sits in the pool
    #[must_use]
    pub fn contains(&self, info: &ObjectLoadInfo, server: &ServerInformation) -> bool {
        let mut key = CacheKey::new(info, server);
        let pool = self.pool();
        (0..SAME_OBJECT_NUMBER).any(|slot| {
            key.slot = slot;
            pool.elements.contains_key(&key)
        })
    }

    /// Check out the level for `info`, loading a new one on a miss
    pub fn get_element(
        &self,
        info: &ObjectLoadInfo,
        server: &ServerInformation,
    ) -> Result<CacheElement> {
        let key = CacheKey::new(info, server);
        let mut pool = self.pool();
        let mut element = match pool.take(key) {
            Some(element) => {
                debug!(level = %info.name, %key, usage = element.usage, "level cache hit");
                element
            }
            None => {
                debug!(
                    level = %info.name,
                    %key,
                    pooled = pool.elements.len(),
                    "level cache miss"
                );
                let level = self.metadata.instantiate(info, server)?;
                CacheElement::new(info.clone(), level, key)
            }
        };
        element.increment_usage();
        Ok(element)
    }

    /// Return a checked-out element to the pool
    pub fn put_element(&self, element: CacheElement) {
        let mut pool = self.pool();
        if pool.elements.len() >= self.capacity {
            pool.pings += 1;
            if pool.pings > PINGS_FOR_AGING {
                pool.try_insert(element, true);
                pool.pings = 0;
            } else {
                pool.try_insert(element, false);
            }
        } else {
            pool.insert(element);
        }
    }

    /// Check out one level per segment of `urn`, top-down
    ///
    /// On failure every element checked out so far goes back to the pool.
    pub fn get_all_elements(
        &self,
        urn: &Urn,
        server: &ServerInformation,
    ) -> Result<Vec<CacheElement>> {
        let infos = self.metadata.resolve_all(urn)?;
        let mut elements = Vec::with_capacity(infos.len());
        for info in &infos {
            match self.get_element(info, server) {
                Ok(element) => elements.push(element),
                Err(e) => {
                    self.put_all_elements(elements);
                    return Err(e);
                }
            }
        }
        Ok(elements)
    }

    pub fn put_all_elements(&self, elements: Vec<CacheElement>) {
        for element in elements {
            self.put_element(element);
        }
    }

    /// Uncached level for the first segment of `urn`, loaded without a known server
    pub fn load_first_element_versionless(&self, urn: &Urn) -> Result<Box<dyn EnumObject>> {
        let info = self.metadata.resolve_first(urn)?;
        self.metadata.instantiate(&info, &ServerInformation::default())
    }
}
