use crate::collection::Collection;
use crate::errors::DbError;
use crate::expr::{Constant, Expr};
use crate::query::{
    AsyncNativeQuery, AsyncSelectedQuery, FieldExpr, Filter, NativeQuery, Order, SelectedQuery,
    compile_path, compile_predicate, compile_selector,
};
use std::sync::Arc;

use super::dispatch::{Terminal, terminal_of};
use super::extract::{
    FilterExtractor, IncludeExtractor, OrderExtractor, SelectExtractor, SkipExtractor, SourceChain,
    TakeExtractor, ThenByExtractor, extract, reject_after_projection,
};

/// The native builder surface the assembler drives. Implemented by the sync
/// and async query handles of a collection.
pub trait QueryBuilder: Sized {
    type Selected;

    fn collection(&self) -> &Arc<Collection>;

    #[must_use]
    fn filter(self, filter: Filter) -> Self;

    /// # Errors
    /// Stores reject a second order level.
    fn order_by(self, key: FieldExpr, order: Order) -> Result<Self, DbError>;

    #[must_use]
    fn skip(self, n: usize) -> Self;

    #[must_use]
    fn limit(self, n: usize) -> Self;

    #[must_use]
    fn include(self, path: String) -> Self;

    fn select(self, projection: FieldExpr) -> Self::Selected;
}

impl QueryBuilder for NativeQuery {
    type Selected = SelectedQuery;

    fn collection(&self) -> &Arc<Collection> {
        NativeQuery::collection(self)
    }

    fn filter(self, filter: Filter) -> Self {
        NativeQuery::filter(self, filter)
    }

    fn order_by(self, key: FieldExpr, order: Order) -> Result<Self, DbError> {
        NativeQuery::order_by(self, key, order)
    }

    fn skip(self, n: usize) -> Self {
        NativeQuery::skip(self, n)
    }

    fn limit(self, n: usize) -> Self {
        NativeQuery::limit(self, n)
    }

    fn include(self, path: String) -> Self {
        NativeQuery::include(self, path)
    }

    fn select(self, projection: FieldExpr) -> SelectedQuery {
        NativeQuery::select(self, projection)
    }
}

impl QueryBuilder for AsyncNativeQuery {
    type Selected = AsyncSelectedQuery;

    fn collection(&self) -> &Arc<Collection> {
        AsyncNativeQuery::collection(self)
    }

    fn filter(self, filter: Filter) -> Self {
        AsyncNativeQuery::filter(self, filter)
    }

    fn order_by(self, key: FieldExpr, order: Order) -> Result<Self, DbError> {
        AsyncNativeQuery::order_by(self, key, order)
    }

    fn skip(self, n: usize) -> Self {
        AsyncNativeQuery::skip(self, n)
    }

    fn limit(self, n: usize) -> Self {
        AsyncNativeQuery::limit(self, n)
    }

    fn include(self, path: String) -> Self {
        AsyncNativeQuery::include(self, path)
    }

    fn select(self, projection: FieldExpr) -> AsyncSelectedQuery {
        AsyncNativeQuery::select(self, projection)
    }
}

/// Projection state: the handle terminals run against.
pub enum Stage<Q: QueryBuilder> {
    Base(Q),
    Selected(Q::Selected),
}

impl<Q: QueryBuilder> Stage<Q> {
    #[must_use]
    pub fn is_projected(&self) -> bool {
        matches!(self, Self::Selected(_))
    }
}

pub struct Assembled<Q: QueryBuilder> {
    pub stage: Stage<Q>,
    pub terminal: Terminal,
}

/// Every call below the outermost one must be a query operator, and the
/// chain must bottom out at a collection source.
fn validate_chain(root: &Expr) -> Result<(), DbError> {
    let mut innermost = root;
    for (depth, (method, args)) in SourceChain::new(root).enumerate() {
        let allowed = method.is_query_operator() || (depth == 0 && method.is_terminal());
        if !allowed {
            return Err(DbError::not_supported(format!("method '{method}' is not supported")));
        }
        match args.first() {
            Some(source) => innermost = source,
            None => return Err(DbError::ArgumentNull("source")),
        }
    }
    match innermost {
        Expr::Constant(Constant::Source(_)) => Ok(()),
        other => Err(DbError::not_supported(format!("query source {other:?} is not a collection"))),
    }
}

/// Translates `expr` into native builder calls on a fresh `handle`.
///
/// Phases run in a fixed order: filter, order, skip, take, include, project.
/// The handle is consumed, so nothing leaks into the next execution.
///
/// # Errors
/// `NotSupported` for compositions the store cannot express (including
/// filter, order or include applied after a projection), `ArgumentNull`
/// for calls missing a required lambda, and any compiler error.
pub fn assemble<Q: QueryBuilder>(expr: &Expr, handle: Q) -> Result<Assembled<Q>, DbError> {
    validate_chain(expr)?;
    reject_after_projection(expr)?;
    let terminal = terminal_of(expr)?;
    let mut q = handle;

    let predicates = extract::<FilterExtractor>(expr)?;
    for p in &predicates {
        q = q.filter(compile_predicate(p)?);
    }

    let orders = extract::<OrderExtractor>(expr)?;
    let then_bys = extract::<ThenByExtractor>(expr)?;
    if orders.len() > 1 {
        return Err(DbError::not_supported("multiple order is not supported"));
    }
    if !then_bys.is_empty() {
        return Err(DbError::not_supported("secondary order is not supported"));
    }
    if let Some(key) = orders.first() {
        q = q.order_by(compile_selector(key.selector)?, key.order)?;
    }

    let skip = extract::<SkipExtractor>(expr)?;
    let take = extract::<TakeExtractor>(expr)?;
    if let Some(n) = skip {
        q = q.skip(n);
    }
    if let Some(n) = take {
        q = q.limit(n);
    }

    let includes = extract::<IncludeExtractor>(expr)?;
    let mut include_paths = Vec::with_capacity(includes.len());
    for l in &includes {
        include_paths.push(compile_path(l)?);
    }

    let projections = extract::<SelectExtractor>(expr)?;
    if projections.len() > 1 {
        return Err(DbError::not_supported("multiple projection is not supported"));
    }

    if q.collection().config().log_plans {
        log::debug!(
            "plan on '{}': filters={} order={:?} skip={:?} take={:?} include={:?} projected={} terminal={:?}",
            q.collection().name(),
            predicates.len(),
            orders.first().map(|o| o.order),
            skip,
            take,
            include_paths,
            !projections.is_empty(),
            terminal,
        );
    }

    for path in include_paths {
        q = q.include(path);
    }
    let stage = match projections.first() {
        Some(l) => Stage::Selected(q.select(compile_selector(l)?)),
        None => Stage::Base(q),
    };
    Ok(Assembled { stage, terminal })
}
