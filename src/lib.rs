pub mod collection;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod expr;
pub mod linq;
pub mod logger;
pub mod query;
pub mod types;

use crate::collection::{AsyncCollection, Collection};
use crate::config::DatabaseConfig;
use crate::document::Document;
use crate::engine::Engine;
use crate::errors::DbError;
use crate::linq::{AsQueryable, Queryable};
use crate::types::DocumentId;
use std::path::Path;
use std::sync::Arc;

/// The main database struct.
pub struct Database {
    engine: Arc<Engine>,
    config: DatabaseConfig,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("name", &self.config.name).field("engine", &self.engine).finish()
    }
}

impl Database {
    /// Creates a new in-memory database with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(DatabaseConfig::default())
    }

    /// Creates a database, installing file logging when `config.log.enabled`.
    ///
    /// A logger that is already installed for the process is kept, with a warning.
    ///
    /// # Errors
    /// Returns an error if the log directory or its appenders cannot be created.
    pub fn with_config(config: DatabaseConfig) -> Result<Self, DbError> {
        if config.log.enabled {
            let log_config = logger::build_config(&config.log)?;
            if let Err(e) = log4rs::init_config(log_config) {
                log::warn!("logging for '{}' not installed: {e}", config.name);
            }
        }
        Ok(Self::from_parts(config))
    }

    fn from_parts(config: DatabaseConfig) -> Self {
        log::info!("opened database '{}'", config.name);
        Self { engine: Engine::with_config(config.query.clone()), config }
    }

    /// Loads configuration from `path` (when present) and the environment.
    ///
    /// # Errors
    /// Returns an error if an existing config file cannot be read or parsed,
    /// or if enabled logging cannot be set up.
    pub fn open(path: Option<&Path>) -> Result<Self, DbError> {
        Self::with_config(DatabaseConfig::load(path)?)
    }

    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Returns the named collection, creating it on first use.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        self.engine.create_collection(name)
    }

    /// Asynchronous handle over the named collection.
    pub fn async_collection(&self, name: &str) -> AsyncCollection {
        AsyncCollection::new(self.collection(name))
    }

    /// Deferred query over the named collection; synchronous terminals only.
    pub fn queryable<T>(&self, name: &str) -> Queryable<T> {
        self.collection(name).as_queryable()
    }

    /// Deferred query whose async terminals are enabled.
    pub fn async_queryable<T>(&self, name: &str) -> Queryable<T> {
        self.async_collection(name).as_queryable()
    }

    /// Inserts a document into the specified collection.
    ///
    /// # Errors
    /// Returns `NoSuchCollection` if the collection does not exist.
    pub fn insert_document(&self, collection_name: &str, document: Document) -> Result<DocumentId, DbError> {
        Ok(self.engine.require_collection(collection_name)?.insert_document(document))
    }

    pub fn drop_collection(&self, name: &str) -> bool {
        self.engine.delete_collection(name)
    }

    pub fn list_collection_names(&self) -> Vec<String> {
        self.engine.list_collection_names()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
