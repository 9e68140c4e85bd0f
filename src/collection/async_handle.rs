use super::core::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::query::{AsyncNativeQuery, run_blocking};
use crate::types::DocumentId;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Asynchronous handle over a [`Collection`]. Store calls run on the blocking
/// pool so they never stall the async runtime.
#[derive(Clone, Debug)]
pub struct AsyncCollection {
    inner: Arc<Collection>,
}

impl AsyncCollection {
    #[must_use]
    pub fn new(inner: Arc<Collection>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The synchronous collection underneath.
    #[must_use]
    pub fn inner(&self) -> &Arc<Collection> {
        &self.inner
    }

    /// # Errors
    /// Serialization failure, or `Cancelled`.
    pub async fn insert<T: Serialize + ?Sized>(
        &self,
        entity: &T,
        cancel: &CancellationToken,
    ) -> Result<DocumentId, DbError> {
        let doc = Document::from_entity(entity)?;
        let col = self.inner.clone();
        run_blocking(cancel, move || Ok(col.insert_document(doc))).await
    }

    /// # Errors
    /// Serialization failure, or `Cancelled`.
    pub async fn insert_many<T: Serialize>(
        &self,
        entities: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<DocumentId>, DbError> {
        let docs = entities.iter().map(Document::from_entity).collect::<Result<Vec<_>, _>>()?;
        let col = self.inner.clone();
        run_blocking(cancel, move || Ok(docs.into_iter().map(|d| col.insert_document(d)).collect())).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn find_by_id(
        &self,
        id: &DocumentId,
        cancel: &CancellationToken,
    ) -> Result<Option<Document>, DbError> {
        let (col, id) = (self.inner.clone(), id.clone());
        run_blocking(cancel, move || Ok(col.find_document(&id))).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn delete(&self, id: &DocumentId, cancel: &CancellationToken) -> Result<bool, DbError> {
        let (col, id) = (self.inner.clone(), id.clone());
        run_blocking(cancel, move || Ok(col.delete_document(&id))).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn len(&self, cancel: &CancellationToken) -> Result<usize, DbError> {
        let col = self.inner.clone();
        run_blocking(cancel, move || Ok(col.len())).await
    }

    /// A fresh asynchronous native query handle.
    #[must_use]
    pub fn query(&self) -> AsyncNativeQuery {
        AsyncNativeQuery::new(self.inner.query())
    }
}

impl From<Arc<Collection>> for AsyncCollection {
    fn from(inner: Arc<Collection>) -> Self {
        Self::new(inner)
    }
}
