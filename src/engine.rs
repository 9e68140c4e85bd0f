use crate::collection::Collection;
use crate::config::QueryConfig;
use crate::errors::DbError;
use crate::types::CollectionName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory catalog of named collections.
pub struct Engine {
    collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
    query_config: QueryConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("collections", &self.list_collection_names())
            .field("query_config", &self.query_config)
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(QueryConfig::default())
    }

    #[must_use]
    pub fn with_config(query_config: QueryConfig) -> Arc<Self> {
        Arc::new(Self { collections: RwLock::new(HashMap::new()), query_config })
    }

    /// Returns the named collection, creating it on first use.
    pub fn create_collection(self: &Arc<Self>, name: &str) -> Arc<Collection> {
        if let Some(existing) = self.get_collection(name) {
            return existing;
        }
        let mut cols = self.collections.write();
        cols.entry(name.to_string())
            .or_insert_with(|| {
                log::info!("created collection '{name}'");
                Arc::new(Collection::new(name.to_string(), Arc::downgrade(self), self.query_config.clone()))
            })
            .clone()
    }

    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// # Errors
    /// Returns `NoSuchCollection` if `name` does not exist.
    pub fn require_collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        self.get_collection(name).ok_or_else(|| DbError::NoSuchCollection(name.to_string()))
    }

    pub fn delete_collection(&self, name: &str) -> bool {
        let removed = self.collections.write().remove(name).is_some();
        if removed {
            log::info!("dropped collection '{name}'");
        }
        removed
    }

    pub fn list_collection_names(&self) -> Vec<CollectionName> {
        let mut names: Vec<_> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}
