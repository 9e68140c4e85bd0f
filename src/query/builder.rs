use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::expr::{Comparer, NumericKind};
use bson::Bson;
use std::sync::Arc;
use std::time::Instant;

use super::aggregate;
use super::cursor::Cursor;
use super::eval::{compare_rows, eval_field, eval_filter};
use super::include::resolve_path;
use super::telemetry;
use super::types::{FieldExpr, Filter, Order, SortKey};

/// Fluent query builder over one collection.
///
/// Rows flow through filter, order, skip, limit, include and finally the
/// projection of a [`SelectedQuery`]. Every terminal consumes the builder.
#[derive(Clone)]
pub struct NativeQuery {
    collection: Arc<Collection>,
    filters: Vec<Filter>,
    order: Option<SortKey>,
    skip: Option<usize>,
    limit: Option<usize>,
    includes: Vec<String>,
}

impl NativeQuery {
    pub(crate) fn new(collection: Arc<Collection>) -> Self {
        Self { collection, filters: Vec::new(), order: None, skip: None, limit: None, includes: Vec::new() }
    }

    /// Adds a filter; multiple filters are combined conjunctively.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// # Errors
    /// Only one order level is supported; a second call fails.
    pub fn order_by(mut self, key: FieldExpr, order: Order) -> Result<Self, DbError> {
        if self.order.is_some() {
            return Err(DbError::QueryError("ORDER BY already defined in this query".into()));
        }
        self.order = Some(SortKey { key, order });
        Ok(self)
    }

    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Requests the references at `path` to be loaded in place.
    #[must_use]
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    #[must_use]
    pub fn select(self, projection: FieldExpr) -> SelectedQuery {
        SelectedQuery { base: self, projection }
    }

    #[must_use]
    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    fn is_plain_scan(&self) -> bool {
        self.filters.is_empty() && self.order.is_none() && self.includes.is_empty()
    }

    fn rows(&self) -> Vec<Bson> {
        let mut rows: Vec<Bson> = self
            .collection
            .get_all_documents()
            .iter()
            .map(Document::to_bson)
            .filter(|r| self.filters.iter().all(|f| eval_filter(r, f)))
            .collect();
        if let Some(sort) = &self.order {
            // stable: ties keep insertion order
            rows.sort_by(|a, b| compare_rows(a, b, sort));
        }
        let mut rows = window(rows, self.skip, self.limit);
        if !self.includes.is_empty() {
            match self.collection.engine() {
                Some(engine) => {
                    for row in &mut rows {
                        for path in &self.includes {
                            resolve_path(&engine, row, path);
                        }
                    }
                }
                None => log::warn!("include skipped: engine for '{}' is gone", self.collection.name()),
            }
        }
        rows
    }

    fn record(&self, op: &str, started: Instant, rows: usize) {
        telemetry::record_execution(
            self.collection.name(),
            op,
            started,
            rows,
            self.collection.config().slow_query_ms,
        );
    }

    /// Lazy sequence of matching documents.
    #[must_use]
    pub fn find(self) -> Cursor {
        let started = Instant::now();
        let cursor = if self.is_plain_scan() {
            let ids = window(self.collection.list_ids(), self.skip, self.limit);
            Cursor::over_ids(self.collection.clone(), ids)
        } else {
            Cursor::over_rows(self.collection.clone(), self.rows())
        };
        self.record("find", started, cursor.ids.len() + cursor.rows.as_ref().map_or(0, Vec::len));
        cursor
    }

    #[must_use]
    pub fn to_documents(self) -> Vec<Bson> {
        self.find().to_vec()
    }

    /// # Errors
    /// Returns `NoElements` when nothing matches.
    pub fn first(self) -> Result<Bson, DbError> {
        self.first_or_default().ok_or(DbError::NoElements)
    }

    #[must_use]
    pub fn first_or_default(self) -> Option<Bson> {
        let started = Instant::now();
        let row = self.rows().into_iter().next();
        self.record("first", started, usize::from(row.is_some()));
        row
    }

    /// # Errors
    /// Returns `NoElements` or `MoreThanOneElement` unless exactly one row matches.
    pub fn single(self) -> Result<Bson, DbError> {
        self.single_or_default()?.ok_or(DbError::NoElements)
    }

    /// # Errors
    /// Returns `MoreThanOneElement` when several rows match.
    pub fn single_or_default(self) -> Result<Option<Bson>, DbError> {
        let started = Instant::now();
        let rows = self.rows();
        self.record("single", started, rows.len());
        single_of(rows)
    }

    #[must_use]
    pub fn count(self) -> usize {
        let started = Instant::now();
        let n = self.rows().len();
        self.record("count", started, n);
        n
    }

    #[must_use]
    pub fn long_count(self) -> u64 {
        u64::try_from(self.count()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn exists(self) -> bool {
        let started = Instant::now();
        let found = !self.rows().is_empty();
        self.record("exists", started, usize::from(found));
        found
    }

    /// # Errors
    /// See [`aggregate::sum`].
    pub fn sum(self, selector: Option<&FieldExpr>, kind: NumericKind) -> Result<Bson, DbError> {
        let values = self.values_for("sum", selector);
        aggregate::sum(values, kind)
    }

    /// # Errors
    /// See [`aggregate::average`].
    pub fn average(self, selector: Option<&FieldExpr>, kind: NumericKind) -> Result<Bson, DbError> {
        let values = self.values_for("average", selector);
        aggregate::average(values, kind)
    }

    /// # Errors
    /// See [`aggregate::min`].
    pub fn min(self, selector: Option<&FieldExpr>, comparer: Option<&Comparer>) -> Result<Bson, DbError> {
        let values = self.values_for("min", selector);
        aggregate::min(values, comparer)
    }

    /// # Errors
    /// See [`aggregate::max`].
    pub fn max(self, selector: Option<&FieldExpr>, comparer: Option<&Comparer>) -> Result<Bson, DbError> {
        let values = self.values_for("max", selector);
        aggregate::max(values, comparer)
    }

    fn values_for(&self, op: &str, selector: Option<&FieldExpr>) -> Vec<Bson> {
        let started = Instant::now();
        let rows = self.rows();
        self.record(op, started, rows.len());
        match selector {
            Some(s) => rows.iter().map(|r| eval_field(r, s)).collect(),
            None => rows,
        }
    }
}

/// A native query whose rows are projected before being returned.
#[derive(Clone)]
pub struct SelectedQuery {
    base: NativeQuery,
    projection: FieldExpr,
}

impl SelectedQuery {
    #[must_use]
    pub fn projection(&self) -> &FieldExpr {
        &self.projection
    }

    fn values(&self, op: &str) -> Vec<Bson> {
        let started = Instant::now();
        let values: Vec<Bson> = self.base.rows().iter().map(|r| eval_field(r, &self.projection)).collect();
        self.base.record(op, started, values.len());
        values
    }

    fn selected(&self, op: &str, selector: Option<&FieldExpr>) -> Vec<Bson> {
        let values = self.values(op);
        match selector {
            Some(s) => values.iter().map(|v| eval_field(v, s)).collect(),
            None => values,
        }
    }

    #[must_use]
    pub fn to_values(self) -> Vec<Bson> {
        self.values("find")
    }

    /// # Errors
    /// Returns `NoElements` when nothing matches.
    pub fn first(self) -> Result<Bson, DbError> {
        self.first_or_default().ok_or(DbError::NoElements)
    }

    #[must_use]
    pub fn first_or_default(self) -> Option<Bson> {
        self.values("first").into_iter().next()
    }

    /// # Errors
    /// Returns `NoElements` or `MoreThanOneElement` unless exactly one row matches.
    pub fn single(self) -> Result<Bson, DbError> {
        self.single_or_default()?.ok_or(DbError::NoElements)
    }

    /// # Errors
    /// Returns `MoreThanOneElement` when several rows match.
    pub fn single_or_default(self) -> Result<Option<Bson>, DbError> {
        single_of(self.values("single"))
    }

    #[must_use]
    pub fn count(self) -> usize {
        self.base.count()
    }

    #[must_use]
    pub fn long_count(self) -> u64 {
        self.base.long_count()
    }

    #[must_use]
    pub fn exists(self) -> bool {
        self.base.exists()
    }

    /// # Errors
    /// See [`aggregate::sum`].
    pub fn sum(self, selector: Option<&FieldExpr>, kind: NumericKind) -> Result<Bson, DbError> {
        aggregate::sum(self.selected("sum", selector), kind)
    }

    /// # Errors
    /// See [`aggregate::average`].
    pub fn average(self, selector: Option<&FieldExpr>, kind: NumericKind) -> Result<Bson, DbError> {
        aggregate::average(self.selected("average", selector), kind)
    }

    /// # Errors
    /// See [`aggregate::min`].
    pub fn min(self, selector: Option<&FieldExpr>, comparer: Option<&Comparer>) -> Result<Bson, DbError> {
        aggregate::min(self.selected("min", selector), comparer)
    }

    /// # Errors
    /// See [`aggregate::max`].
    pub fn max(self, selector: Option<&FieldExpr>, comparer: Option<&Comparer>) -> Result<Bson, DbError> {
        aggregate::max(self.selected("max", selector), comparer)
    }
}

fn window<T>(items: Vec<T>, skip: Option<usize>, limit: Option<usize>) -> Vec<T> {
    items.into_iter().skip(skip.unwrap_or(0)).take(limit.unwrap_or(usize::MAX)).collect()
}

fn single_of(rows: Vec<Bson>) -> Result<Option<Bson>, DbError> {
    if rows.len() > 1 {
        return Err(DbError::MoreThanOneElement);
    }
    Ok(rows.into_iter().next())
}
