//! Asynchronous terminal operators.
//!
//! Available on every [`Queryable`], but they only succeed when the query was
//! built from an [`AsyncCollection`](crate::collection::AsyncCollection).
//! Each takes the cancellation token that is forwarded to the store.

use crate::errors::DbError;
use crate::expr::{Comparer, Expr, Lambda, Method};
use crate::types::from_bson_value;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;
use tokio_util::sync::CancellationToken;

use super::dispatch::QueryOutput;
use super::numeric::Numeric;
use super::queryable::{
    Queryable, aggregate_args, decode_rows, into_bool, into_count, into_element, into_long_count,
    into_required, into_rows, into_scalar, numeric_args, predicate_arg,
};

impl<T: DeserializeOwned> Queryable<T> {
    async fn run_async(
        &self,
        method: Option<Method>,
        rest: Vec<Expr>,
        cancel: &CancellationToken,
    ) -> Result<QueryOutput, DbError> {
        let expr = match method {
            Some(m) => self.call(m, rest),
            None => self.expression().clone(),
        };
        self.provider().execute_async(&expr, cancel).await
    }

    /// # Errors
    /// `InvalidOperation` for a synchronous source, `Cancelled`, composition
    /// or native errors.
    pub async fn to_list_async(&self, cancel: &CancellationToken) -> Result<Vec<T>, DbError> {
        decode_rows(into_rows(self.run_async(None, vec![], cancel).await?)?)
    }

    /// # Errors
    /// As [`to_list_async`](Self::to_list_async).
    pub async fn to_array_async(&self, cancel: &CancellationToken) -> Result<Box<[T]>, DbError> {
        Ok(self.to_list_async(cancel).await?.into_boxed_slice())
    }

    /// Collects into a map keyed by `key`.
    ///
    /// # Errors
    /// `InvalidOperation` when two elements share a key; otherwise as
    /// [`to_list_async`](Self::to_list_async).
    pub async fn to_map_async<K, F>(&self, key: F, cancel: &CancellationToken) -> Result<HashMap<K, T>, DbError>
    where
        K: Eq + Hash + Debug,
        F: Fn(&T) -> K,
    {
        let items = self.to_list_async(cancel).await?;
        let mut map = HashMap::with_capacity(items.len());
        for item in items {
            match map.entry(key(&item)) {
                Entry::Occupied(e) => {
                    return Err(DbError::InvalidOperation(format!(
                        "an item with the same key has already been added: {:?}",
                        e.key()
                    )));
                }
                Entry::Vacant(v) => {
                    v.insert(item);
                }
            }
        }
        Ok(map)
    }

    /// Runs the query, then feeds each decoded element to `f` in order.
    ///
    /// # Errors
    /// As [`to_list_async`](Self::to_list_async), plus decode failures.
    pub async fn for_each_async<F>(&self, mut f: F, cancel: &CancellationToken) -> Result<(), DbError>
    where
        F: FnMut(T),
    {
        let rows = into_rows(self.run_async(None, vec![], cancel).await?)?;
        for row in rows {
            if cancel.is_cancelled() {
                return Err(DbError::Cancelled);
            }
            f(from_bson_value(row)?);
        }
        Ok(())
    }

    /// # Errors
    /// `NoElements`, plus the async errors.
    pub async fn first_async(&self, cancel: &CancellationToken) -> Result<T, DbError> {
        into_required(self.run_async(Some(Method::First), vec![], cancel).await?)
    }

    /// # Errors
    /// `NoElements`, plus the async errors.
    pub async fn first_where_async(
        &self,
        predicate: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<T, DbError> {
        let rest = predicate_arg(Some(predicate.into()));
        into_required(self.run_async(Some(Method::First), rest, cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn first_or_default_async(&self, cancel: &CancellationToken) -> Result<Option<T>, DbError> {
        into_element(self.run_async(Some(Method::FirstOrDefault), vec![], cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn first_or_default_where_async(
        &self,
        predicate: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, DbError> {
        let rest = predicate_arg(Some(predicate.into()));
        into_element(self.run_async(Some(Method::FirstOrDefault), rest, cancel).await?)
    }

    /// # Errors
    /// `NoElements`, `MoreThanOneElement`, plus the async errors.
    pub async fn single_async(&self, cancel: &CancellationToken) -> Result<T, DbError> {
        into_required(self.run_async(Some(Method::Single), vec![], cancel).await?)
    }

    /// # Errors
    /// `NoElements`, `MoreThanOneElement`, plus the async errors.
    pub async fn single_where_async(
        &self,
        predicate: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<T, DbError> {
        let rest = predicate_arg(Some(predicate.into()));
        into_required(self.run_async(Some(Method::Single), rest, cancel).await?)
    }

    /// # Errors
    /// `MoreThanOneElement`, plus the async errors.
    pub async fn single_or_default_async(&self, cancel: &CancellationToken) -> Result<Option<T>, DbError> {
        into_element(self.run_async(Some(Method::SingleOrDefault), vec![], cancel).await?)
    }

    /// # Errors
    /// `MoreThanOneElement`, plus the async errors.
    pub async fn single_or_default_where_async(
        &self,
        predicate: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, DbError> {
        let rest = predicate_arg(Some(predicate.into()));
        into_element(self.run_async(Some(Method::SingleOrDefault), rest, cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn count_async(&self, cancel: &CancellationToken) -> Result<usize, DbError> {
        into_count(self.run_async(Some(Method::Count), vec![], cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn count_where_async(
        &self,
        predicate: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<usize, DbError> {
        let rest = predicate_arg(Some(predicate.into()));
        into_count(self.run_async(Some(Method::Count), rest, cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn long_count_async(&self, cancel: &CancellationToken) -> Result<u64, DbError> {
        into_long_count(self.run_async(Some(Method::LongCount), vec![], cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn long_count_where_async(
        &self,
        predicate: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<u64, DbError> {
        let rest = predicate_arg(Some(predicate.into()));
        into_long_count(self.run_async(Some(Method::LongCount), rest, cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn any_async(&self, cancel: &CancellationToken) -> Result<bool, DbError> {
        into_bool(self.run_async(Some(Method::Any), vec![], cancel).await?)
    }

    /// # Errors
    /// The async errors.
    pub async fn any_where_async(
        &self,
        predicate: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<bool, DbError> {
        let rest = predicate_arg(Some(predicate.into()));
        into_bool(self.run_async(Some(Method::Any), rest, cancel).await?)
    }

    /// # Errors
    /// `Overflow`, non-numeric values, plus the async errors.
    pub async fn sum_async<N: Numeric>(
        &self,
        selector: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<N, DbError> {
        let rest = numeric_args::<N>(Some(selector.into()));
        into_scalar(self.run_async(Some(Method::Sum), rest, cancel).await?)
    }

    /// # Errors
    /// `NoElements`, `Overflow`, non-numeric values, plus the async errors.
    pub async fn average_async<N: Numeric>(
        &self,
        selector: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<N::Average, DbError> {
        let rest = numeric_args::<N>(Some(selector.into()));
        into_scalar(self.run_async(Some(Method::Average), rest, cancel).await?)
    }

    /// # Errors
    /// `NoElements`, plus the async errors.
    pub async fn min_async<U: DeserializeOwned>(
        &self,
        selector: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<U, DbError> {
        let rest = aggregate_args(Some(selector.into()), None);
        into_scalar(self.run_async(Some(Method::Min), rest, cancel).await?)
    }

    /// # Errors
    /// `NoElements`, plus the async errors.
    pub async fn min_by_async<U: DeserializeOwned>(
        &self,
        selector: impl Into<Lambda>,
        comparer: Comparer,
        cancel: &CancellationToken,
    ) -> Result<U, DbError> {
        let rest = aggregate_args(Some(selector.into()), Some(comparer));
        into_scalar(self.run_async(Some(Method::Min), rest, cancel).await?)
    }

    /// # Errors
    /// `NoElements`, plus the async errors.
    pub async fn max_async<U: DeserializeOwned>(
        &self,
        selector: impl Into<Lambda>,
        cancel: &CancellationToken,
    ) -> Result<U, DbError> {
        let rest = aggregate_args(Some(selector.into()), None);
        into_scalar(self.run_async(Some(Method::Max), rest, cancel).await?)
    }

    /// # Errors
    /// `NoElements`, plus the async errors.
    pub async fn max_by_async<U: DeserializeOwned>(
        &self,
        selector: impl Into<Lambda>,
        comparer: Comparer,
        cancel: &CancellationToken,
    ) -> Result<U, DbError> {
        let rest = aggregate_args(Some(selector.into()), Some(comparer));
        into_scalar(self.run_async(Some(Method::Max), rest, cancel).await?)
    }
}

impl<T: Numeric> Queryable<T> {
    /// # Errors
    /// `Overflow`, non-numeric values, plus the async errors.
    pub async fn sum_values_async(&self, cancel: &CancellationToken) -> Result<T, DbError> {
        let expr = self.call(Method::Sum, numeric_args::<T>(None));
        into_scalar(self.provider().execute_async(&expr, cancel).await?)
    }

    /// # Errors
    /// `NoElements`, plus the async errors.
    pub async fn average_values_async(&self, cancel: &CancellationToken) -> Result<T::Average, DbError> {
        let expr = self.call(Method::Average, numeric_args::<T>(None));
        into_scalar(self.provider().execute_async(&expr, cancel).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::collection::AsyncCollection;
    use crate::engine::Engine;
    use crate::errors::DbError;
    use crate::expr::field;
    use crate::linq::{AsQueryable, Queryable};
    use serde::{Deserialize, Serialize};
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        sku: String,
        qty: i64,
    }

    async fn items() -> (std::sync::Arc<Engine>, Queryable<Item>) {
        let e = Engine::new();
        let col = AsyncCollection::new(e.create_collection("items"));
        let batch = [("a", 3), ("b", 5), ("a", 7)].map(|(s, q)| Item { sku: s.into(), qty: q });
        col.insert_many(&batch, &CancellationToken::new()).await.unwrap();
        let q = col.as_queryable();
        (e, q)
    }

    #[tokio::test]
    async fn to_map_rejects_duplicate_keys() {
        let (_e, q) = items().await;
        let cancel = CancellationToken::new();
        let err = q.to_map_async(|i| i.sku.clone(), &cancel).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidOperation(_)));
        let by_qty = q.to_map_async(|i| i.qty, &cancel).await.unwrap();
        assert_eq!(by_qty[&5].sku, "b");
    }

    #[tokio::test]
    async fn for_each_visits_in_order() {
        let (_e, q) = items().await;
        let mut seen = Vec::new();
        q.order_by_descending(field("qty"))
            .for_each_async(|i| seen.push(i.qty), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(seen, vec![7, 5, 3]);
    }

    #[tokio::test]
    async fn numeric_terminals() {
        let (_e, q) = items().await;
        let cancel = CancellationToken::new();
        assert_eq!(q.sum_async::<i64>(field("qty"), &cancel).await.unwrap(), 15);
        assert!((q.average_async::<i64>(field("qty"), &cancel).await.unwrap() - 5.0).abs() < 1e-9);
        let qty: Queryable<i64> = q.select(field("qty"));
        assert_eq!(qty.sum_values_async(&cancel).await.unwrap(), 15);
        assert_eq!(q.max_async::<i64>(field("qty"), &cancel).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancelled_token_faults_the_query() {
        let (_e, q) = items().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(q.count_async(&cancel).await, Err(DbError::Cancelled)));
        assert_eq!(q.count_async(&CancellationToken::new()).await.unwrap(), 3);
    }
}
