use crate::collection::Collection;
use crate::errors::DbError;
use crate::expr::{Comparer, NumericKind};
use bson::Bson;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::builder::{NativeQuery, SelectedQuery};
use super::types::{FieldExpr, Filter, Order};

/// Runs `job` on the blocking pool, abandoning the wait if `cancel` fires first.
pub(crate) async fn run_blocking<T, F>(cancel: &CancellationToken, job: F) -> Result<T, DbError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DbError> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(DbError::Cancelled);
    }
    let handle = tokio::task::spawn_blocking(job);
    tokio::select! {
        () = cancel.cancelled() => Err(DbError::Cancelled),
        res = handle => res?,
    }
}

/// Asynchronous counterpart of [`NativeQuery`]; builder calls are synchronous,
/// terminals execute off the async runtime.
#[derive(Clone)]
pub struct AsyncNativeQuery {
    inner: NativeQuery,
}

impl AsyncNativeQuery {
    pub(crate) fn new(inner: NativeQuery) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn collection(&self) -> &Arc<Collection> {
        self.inner.collection()
    }

    #[must_use]
    pub fn filter(self, filter: Filter) -> Self {
        Self { inner: self.inner.filter(filter) }
    }

    /// # Errors
    /// Only one order level is supported; a second call fails.
    pub fn order_by(self, key: FieldExpr, order: Order) -> Result<Self, DbError> {
        Ok(Self { inner: self.inner.order_by(key, order)? })
    }

    #[must_use]
    pub fn skip(self, n: usize) -> Self {
        Self { inner: self.inner.skip(n) }
    }

    #[must_use]
    pub fn limit(self, n: usize) -> Self {
        Self { inner: self.inner.limit(n) }
    }

    #[must_use]
    pub fn include(self, path: impl Into<String>) -> Self {
        Self { inner: self.inner.include(path) }
    }

    #[must_use]
    pub fn select(self, projection: FieldExpr) -> AsyncSelectedQuery {
        AsyncSelectedQuery { inner: self.inner.select(projection) }
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires before the rows are ready.
    pub async fn to_documents(self, cancel: &CancellationToken) -> Result<Vec<Bson>, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.to_documents())).await
    }

    /// # Errors
    /// `NoElements`, or `Cancelled`.
    pub async fn first(self, cancel: &CancellationToken) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.first()).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn first_or_default(self, cancel: &CancellationToken) -> Result<Option<Bson>, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.first_or_default())).await
    }

    /// # Errors
    /// `NoElements`, `MoreThanOneElement`, or `Cancelled`.
    pub async fn single(self, cancel: &CancellationToken) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.single()).await
    }

    /// # Errors
    /// `MoreThanOneElement`, or `Cancelled`.
    pub async fn single_or_default(self, cancel: &CancellationToken) -> Result<Option<Bson>, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.single_or_default()).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn count(self, cancel: &CancellationToken) -> Result<usize, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.count())).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn long_count(self, cancel: &CancellationToken) -> Result<u64, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.long_count())).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn exists(self, cancel: &CancellationToken) -> Result<bool, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.exists())).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn sum(
        self,
        selector: Option<FieldExpr>,
        kind: NumericKind,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.sum(selector.as_ref(), kind)).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn average(
        self,
        selector: Option<FieldExpr>,
        kind: NumericKind,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.average(selector.as_ref(), kind)).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn min(
        self,
        selector: Option<FieldExpr>,
        comparer: Option<Comparer>,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.min(selector.as_ref(), comparer.as_ref())).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn max(
        self,
        selector: Option<FieldExpr>,
        comparer: Option<Comparer>,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.max(selector.as_ref(), comparer.as_ref())).await
    }
}

#[derive(Clone)]
pub struct AsyncSelectedQuery {
    inner: SelectedQuery,
}

impl AsyncSelectedQuery {
    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn to_values(self, cancel: &CancellationToken) -> Result<Vec<Bson>, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.to_values())).await
    }

    /// # Errors
    /// `NoElements`, or `Cancelled`.
    pub async fn first(self, cancel: &CancellationToken) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.first()).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn first_or_default(self, cancel: &CancellationToken) -> Result<Option<Bson>, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.first_or_default())).await
    }

    /// # Errors
    /// `NoElements`, `MoreThanOneElement`, or `Cancelled`.
    pub async fn single(self, cancel: &CancellationToken) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.single()).await
    }

    /// # Errors
    /// `MoreThanOneElement`, or `Cancelled`.
    pub async fn single_or_default(self, cancel: &CancellationToken) -> Result<Option<Bson>, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.single_or_default()).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn count(self, cancel: &CancellationToken) -> Result<usize, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.count())).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn long_count(self, cancel: &CancellationToken) -> Result<u64, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.long_count())).await
    }

    /// # Errors
    /// Returns `Cancelled` if `cancel` fires first.
    pub async fn exists(self, cancel: &CancellationToken) -> Result<bool, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || Ok(q.exists())).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn sum(
        self,
        selector: Option<FieldExpr>,
        kind: NumericKind,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.sum(selector.as_ref(), kind)).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn average(
        self,
        selector: Option<FieldExpr>,
        kind: NumericKind,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.average(selector.as_ref(), kind)).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn min(
        self,
        selector: Option<FieldExpr>,
        comparer: Option<Comparer>,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.min(selector.as_ref(), comparer.as_ref())).await
    }

    /// # Errors
    /// Aggregate errors, or `Cancelled`.
    pub async fn max(
        self,
        selector: Option<FieldExpr>,
        comparer: Option<Comparer>,
        cancel: &CancellationToken,
    ) -> Result<Bson, DbError> {
        let q = self.inner;
        run_blocking(cancel, move || q.max(selector.as_ref(), comparer.as_ref())).await
    }
}
