//! Typed deferred queries.
//!
//! A [`Queryable<T>`] is an expression tree plus the provider that can run it.
//! Composition methods only grow the tree; terminal methods append their own
//! call and execute. Elements decode from BSON through serde, documents
//! carrying their `_id` as a string.

use crate::collection::{AsyncCollection, Collection};
use crate::errors::DbError;
use crate::expr::{Comparer, Constant, Expr, Lambda, Method};
use crate::types::from_bson_value;
use bson::Bson;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::dispatch::{QueryOutput, Rows};
use super::numeric::Numeric;
use super::provider::{QueryProvider, QuerySource};

pub struct Queryable<T> {
    expr: Arc<Expr>,
    provider: QueryProvider,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Queryable<T> {
    fn clone(&self) -> Self {
        Self { expr: self.expr.clone(), provider: self.provider.clone(), _marker: PhantomData }
    }
}

impl<T> fmt::Debug for Queryable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("element", &std::any::type_name::<T>())
            .field("expr", &self.expr)
            .finish_non_exhaustive()
    }
}

fn lambda(l: impl Into<Lambda>) -> Expr {
    Expr::Lambda(l.into())
}

fn count_arg(n: usize) -> Expr {
    Expr::Constant(Constant::Value(Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))))
}

impl<T> Queryable<T> {
    #[must_use]
    pub fn new(provider: QueryProvider) -> Self {
        let expr = Arc::new(provider.root());
        Self { expr, provider, _marker: PhantomData }
    }

    /// Wraps an existing tree. Nothing is validated until execution.
    #[must_use]
    pub fn from_expr(provider: QueryProvider, expr: Expr) -> Self {
        Self { expr: Arc::new(expr), provider, _marker: PhantomData }
    }

    #[must_use]
    pub fn expression(&self) -> &Expr {
        &self.expr
    }

    #[must_use]
    pub fn provider(&self) -> &QueryProvider {
        &self.provider
    }

    pub(crate) fn call(&self, method: Method, rest: Vec<Expr>) -> Expr {
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push((*self.expr).clone());
        args.extend(rest);
        Expr::call(method, args)
    }

    fn compose<U>(&self, method: Method, rest: Vec<Expr>) -> Queryable<U> {
        Queryable::from_expr(self.provider.clone(), self.call(method, rest))
    }

    #[must_use]
    pub fn filter(&self, predicate: impl Into<Lambda>) -> Self {
        self.compose(Method::Where, vec![lambda(predicate)])
    }

    #[must_use]
    pub fn order_by(&self, key: impl Into<Lambda>) -> Self {
        self.compose(Method::OrderBy, vec![lambda(key)])
    }

    #[must_use]
    pub fn order_by_descending(&self, key: impl Into<Lambda>) -> Self {
        self.compose(Method::OrderByDescending, vec![lambda(key)])
    }

    /// Composes fine; the store has no secondary sort, so execution fails.
    #[must_use]
    pub fn then_by(&self, key: impl Into<Lambda>) -> Self {
        self.compose(Method::ThenBy, vec![lambda(key)])
    }

    #[must_use]
    pub fn then_by_descending(&self, key: impl Into<Lambda>) -> Self {
        self.compose(Method::ThenByDescending, vec![lambda(key)])
    }

    #[must_use]
    pub fn skip(&self, n: usize) -> Self {
        self.compose(Method::Skip, vec![count_arg(n)])
    }

    #[must_use]
    pub fn take(&self, n: usize) -> Self {
        self.compose(Method::Take, vec![count_arg(n)])
    }

    /// Eager-loads the reference (or array of references) at `path`.
    #[must_use]
    pub fn include(&self, path: impl Into<Lambda>) -> Self {
        self.compose(Method::Include, vec![lambda(path)])
    }

    #[must_use]
    pub fn select<U>(&self, selector: impl Into<Lambda>) -> Queryable<U> {
        self.compose(Method::Select, vec![lambda(selector)])
    }

    /// Applies a method by name. Only useful for operators the typed surface
    /// does not cover; unknown names fail at execution.
    #[must_use]
    pub fn apply(&self, method: Method, args: Vec<Expr>) -> Self {
        self.compose(method, args)
    }

    fn run(&self, method: Method, rest: Vec<Expr>) -> Result<QueryOutput, DbError> {
        self.provider.execute(&self.call(method, rest))
    }
}

pub(crate) fn predicate_arg(predicate: Option<Lambda>) -> Vec<Expr> {
    predicate.map(Expr::Lambda).into_iter().collect()
}

pub(crate) fn aggregate_args(selector: Option<Lambda>, comparer: Option<Comparer>) -> Vec<Expr> {
    let mut rest = predicate_arg(selector);
    if let Some(c) = comparer {
        rest.push(Expr::Constant(Constant::Comparer(c)));
    }
    rest
}

pub(crate) fn numeric_args<N: Numeric>(selector: Option<Lambda>) -> Vec<Expr> {
    let mut rest = vec![Expr::Constant(Constant::Numeric(N::KIND))];
    rest.extend(predicate_arg(selector));
    rest
}

fn mismatch(want: &str, got: &QueryOutput) -> DbError {
    DbError::QueryError(format!("expected a {want} result, got {}", got.shape()))
}

pub(crate) fn into_rows(out: QueryOutput) -> Result<Rows, DbError> {
    match out {
        QueryOutput::Rows(r) => Ok(r),
        other => Err(mismatch("rows", &other)),
    }
}

pub(crate) fn into_element<T: DeserializeOwned>(out: QueryOutput) -> Result<Option<T>, DbError> {
    match out {
        QueryOutput::Element(e) => e.map(from_bson_value).transpose(),
        other => Err(mismatch("element", &other)),
    }
}

pub(crate) fn into_required<T: DeserializeOwned>(out: QueryOutput) -> Result<T, DbError> {
    into_element(out)?.ok_or(DbError::NoElements)
}

pub(crate) fn into_count(out: QueryOutput) -> Result<usize, DbError> {
    match out {
        QueryOutput::Count(n) => Ok(n),
        other => Err(mismatch("count", &other)),
    }
}

pub(crate) fn into_long_count(out: QueryOutput) -> Result<u64, DbError> {
    match out {
        QueryOutput::LongCount(n) => Ok(n),
        other => Err(mismatch("long count", &other)),
    }
}

pub(crate) fn into_bool(out: QueryOutput) -> Result<bool, DbError> {
    match out {
        QueryOutput::Bool(b) => Ok(b),
        other => Err(mismatch("bool", &other)),
    }
}

pub(crate) fn into_scalar<U: DeserializeOwned>(out: QueryOutput) -> Result<U, DbError> {
    match out {
        QueryOutput::Scalar(v) => from_bson_value(v),
        other => Err(mismatch("scalar", &other)),
    }
}

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Rows) -> Result<Vec<T>, DbError> {
    rows.map(from_bson_value).collect()
}

impl<T: DeserializeOwned> Queryable<T> {
    /// # Errors
    /// Composition errors, native errors, or a decode failure.
    pub fn to_list(&self) -> Result<Vec<T>, DbError> {
        let rows = into_rows(self.provider.execute(&self.expr)?)?;
        decode_rows(rows)
    }

    /// A lazy iterator; the query runs on the first `next()`.
    #[must_use]
    pub fn iter(&self) -> QueryIter<T> {
        QueryIter { pending: Some(self.clone()), rows: None }
    }

    /// # Errors
    /// `NoElements` when the sequence is empty.
    pub fn first(&self) -> Result<T, DbError> {
        into_required(self.run(Method::First, vec![])?)
    }

    /// # Errors
    /// `NoElements` when nothing matches `predicate`.
    pub fn first_where(&self, predicate: impl Into<Lambda>) -> Result<T, DbError> {
        into_required(self.run(Method::First, vec![lambda(predicate)])?)
    }

    /// # Errors
    /// Composition errors, native errors, or a decode failure.
    pub fn first_or_default(&self) -> Result<Option<T>, DbError> {
        into_element(self.run(Method::FirstOrDefault, vec![])?)
    }

    /// # Errors
    /// Composition errors, native errors, or a decode failure.
    pub fn first_or_default_where(&self, predicate: impl Into<Lambda>) -> Result<Option<T>, DbError> {
        into_element(self.run(Method::FirstOrDefault, vec![lambda(predicate)])?)
    }

    /// # Errors
    /// `NoElements` or `MoreThanOneElement` unless exactly one element exists.
    pub fn single(&self) -> Result<T, DbError> {
        into_required(self.run(Method::Single, vec![])?)
    }

    /// # Errors
    /// `NoElements` or `MoreThanOneElement` unless exactly one element matches.
    pub fn single_where(&self, predicate: impl Into<Lambda>) -> Result<T, DbError> {
        into_required(self.run(Method::Single, vec![lambda(predicate)])?)
    }

    /// # Errors
    /// `MoreThanOneElement` when several elements exist.
    pub fn single_or_default(&self) -> Result<Option<T>, DbError> {
        into_element(self.run(Method::SingleOrDefault, vec![])?)
    }

    /// # Errors
    /// `MoreThanOneElement` when several elements match.
    pub fn single_or_default_where(&self, predicate: impl Into<Lambda>) -> Result<Option<T>, DbError> {
        into_element(self.run(Method::SingleOrDefault, vec![lambda(predicate)])?)
    }

    /// # Errors
    /// Composition errors.
    pub fn count(&self) -> Result<usize, DbError> {
        into_count(self.run(Method::Count, vec![])?)
    }

    /// # Errors
    /// Composition errors.
    pub fn count_where(&self, predicate: impl Into<Lambda>) -> Result<usize, DbError> {
        into_count(self.run(Method::Count, vec![lambda(predicate)])?)
    }

    /// # Errors
    /// Composition errors.
    pub fn long_count(&self) -> Result<u64, DbError> {
        into_long_count(self.run(Method::LongCount, vec![])?)
    }

    /// # Errors
    /// Composition errors.
    pub fn long_count_where(&self, predicate: impl Into<Lambda>) -> Result<u64, DbError> {
        into_long_count(self.run(Method::LongCount, vec![lambda(predicate)])?)
    }

    /// # Errors
    /// Composition errors.
    pub fn any(&self) -> Result<bool, DbError> {
        into_bool(self.run(Method::Any, vec![])?)
    }

    /// # Errors
    /// Composition errors.
    pub fn any_where(&self, predicate: impl Into<Lambda>) -> Result<bool, DbError> {
        into_bool(self.run(Method::Any, vec![lambda(predicate)])?)
    }

    /// Sum of `selector` over the elements, in the width of `N`.
    ///
    /// # Errors
    /// `Overflow`, or a query error for non-numeric values.
    pub fn sum<N: Numeric>(&self, selector: impl Into<Lambda>) -> Result<N, DbError> {
        into_scalar(self.run(Method::Sum, numeric_args::<N>(Some(selector.into())))?)
    }

    /// # Errors
    /// `NoElements` on an empty sequence, `Overflow`, or a query error for
    /// non-numeric values.
    pub fn average<N: Numeric>(&self, selector: impl Into<Lambda>) -> Result<N::Average, DbError> {
        into_scalar(self.run(Method::Average, numeric_args::<N>(Some(selector.into())))?)
    }

    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn min<U: DeserializeOwned>(&self, selector: impl Into<Lambda>) -> Result<U, DbError> {
        into_scalar(self.run(Method::Min, aggregate_args(Some(selector.into()), None))?)
    }

    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn min_by<U: DeserializeOwned>(&self, selector: impl Into<Lambda>, comparer: Comparer) -> Result<U, DbError> {
        into_scalar(self.run(Method::Min, aggregate_args(Some(selector.into()), Some(comparer)))?)
    }

    /// Smallest element under `comparer`.
    ///
    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn min_with(&self, comparer: Comparer) -> Result<T, DbError> {
        into_scalar(self.run(Method::Min, aggregate_args(None, Some(comparer)))?)
    }

    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn max<U: DeserializeOwned>(&self, selector: impl Into<Lambda>) -> Result<U, DbError> {
        into_scalar(self.run(Method::Max, aggregate_args(Some(selector.into()), None))?)
    }

    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn max_by<U: DeserializeOwned>(&self, selector: impl Into<Lambda>, comparer: Comparer) -> Result<U, DbError> {
        into_scalar(self.run(Method::Max, aggregate_args(Some(selector.into()), Some(comparer)))?)
    }

    /// Largest element under `comparer`.
    ///
    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn max_with(&self, comparer: Comparer) -> Result<T, DbError> {
        into_scalar(self.run(Method::Max, aggregate_args(None, Some(comparer)))?)
    }

    /// Smallest element under the store's ordering.
    ///
    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn min_value(&self) -> Result<T, DbError> {
        into_scalar(self.run(Method::Min, vec![])?)
    }

    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn max_value(&self) -> Result<T, DbError> {
        into_scalar(self.run(Method::Max, vec![])?)
    }
}

/// Aggregates over a sequence that is already numeric, typically the result
/// of a projection.
impl<T: Numeric> Queryable<T> {
    /// # Errors
    /// `Overflow`, or a query error for non-numeric values.
    pub fn sum_values(&self) -> Result<T, DbError> {
        into_scalar(self.run(Method::Sum, numeric_args::<T>(None))?)
    }

    /// # Errors
    /// `NoElements` on an empty sequence.
    pub fn average_values(&self) -> Result<T::Average, DbError> {
        into_scalar(self.run(Method::Average, numeric_args::<T>(None))?)
    }
}

/// Lazily executing iterator over a [`Queryable`].
pub struct QueryIter<T> {
    pending: Option<Queryable<T>>,
    rows: Option<Rows>,
}

impl<T: DeserializeOwned> Iterator for QueryIter<T> {
    type Item = Result<T, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(q) = self.pending.take() {
            match q.provider.execute(&q.expr).and_then(into_rows) {
                Ok(rows) => self.rows = Some(rows),
                Err(e) => return Some(Err(e)),
            }
        }
        self.rows.as_mut()?.next().map(from_bson_value)
    }
}

impl<T: DeserializeOwned> IntoIterator for Queryable<T> {
    type Item = Result<T, DbError>;
    type IntoIter = QueryIter<T>;

    fn into_iter(self) -> QueryIter<T> {
        QueryIter { pending: Some(self), rows: None }
    }
}

impl<T: DeserializeOwned> IntoIterator for &Queryable<T> {
    type Item = Result<T, DbError>;
    type IntoIter = QueryIter<T>;

    fn into_iter(self) -> QueryIter<T> {
        self.iter()
    }
}

/// Entry point for deferred queries over a collection handle.
pub trait AsQueryable {
    fn as_queryable<T>(&self) -> Queryable<T>;
}

impl AsQueryable for Arc<Collection> {
    fn as_queryable<T>(&self) -> Queryable<T> {
        Queryable::new(QueryProvider::new(QuerySource::Sync(self.clone())))
    }
}

impl AsQueryable for AsyncCollection {
    fn as_queryable<T>(&self) -> Queryable<T> {
        Queryable::new(QueryProvider::new(QuerySource::Async(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::expr::field;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: i32,
    }

    fn people() -> (Arc<Engine>, Queryable<Person>) {
        let e = Engine::new();
        let col = e.create_collection("people");
        for (name, age) in [("Thomas", 30), ("Benjamin", 25), ("Thomas", 27), ("Albert", 27), ("Tim", 40)] {
            col.insert(&Person { name: name.into(), age }).unwrap();
        }
        let q = col.as_queryable();
        (e, q)
    }

    #[test]
    fn composition_does_not_execute() {
        let (e, q) = people();
        let filtered = q.filter(field("age").gt(26));
        let col = e.require_collection("people").unwrap();
        col.insert(&Person { name: "Zoe".into(), age: 61 }).unwrap();
        assert_eq!(filtered.count().unwrap(), 5);
        assert_eq!(filtered.count().unwrap(), 5);
        assert!(matches!(q.expression(), Expr::Constant(Constant::Source(n)) if n == "people"));
    }

    #[test]
    fn iteration_is_lazy_and_typed() {
        let (_e, q) = people();
        let mut it = q.order_by(field("age")).take(2).into_iter();
        let first = it.next().unwrap().unwrap();
        assert_eq!(first.name, "Benjamin");
        assert_eq!(it.count(), 1);
    }

    #[test]
    fn iteration_reports_composition_errors_once() {
        let (_e, q) = people();
        let mut it = q.order_by(field("age")).then_by(field("name")).iter();
        assert!(matches!(it.next(), Some(Err(DbError::NotSupported(_)))));
        assert!(it.next().is_none());
    }

    #[test]
    fn numeric_projection_aggregates() {
        let (_e, q) = people();
        let ages: Queryable<i32> = q.select(field("age"));
        assert_eq!(ages.sum_values().unwrap(), 149);
        assert!((ages.average_values().unwrap() - 29.8).abs() < 1e-9);
        assert_eq!(ages.min_value().unwrap(), 25);
        assert_eq!(ages.max_with(Comparer::new(|a, b| crate::query::compare_bson(b, a))).unwrap(), 25);
    }
}
