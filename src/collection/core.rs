use crate::config::QueryConfig;
use crate::document::Document;
use crate::engine::Engine;
use crate::types::DocumentId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Documents keyed by id, iterated in insertion order.
#[derive(Default)]
pub(crate) struct Store {
    pub(crate) order: Vec<DocumentId>,
    pub(crate) docs: HashMap<DocumentId, Document>,
}

pub struct Collection {
    name: String,
    pub(crate) store: RwLock<Store>,
    engine: Weak<Engine>,
    config: QueryConfig,
}

impl Collection {
    pub(crate) fn new(name: String, engine: Weak<Engine>, config: QueryConfig) -> Self {
        Self { name, store: RwLock::new(Store::default()), engine, config }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning engine, used to resolve cross-collection references.
    pub(crate) fn engine(&self) -> Option<Arc<Engine>> {
        self.engine.upgrade()
    }

    pub(crate) fn config(&self) -> &QueryConfig {
        &self.config
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name).field("len", &self.len()).finish()
    }
}
