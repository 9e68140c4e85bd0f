use crate::collection::{AsyncCollection, Collection};
use crate::errors::DbError;
use crate::expr::Expr;
use crate::query::NativeQuery;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::assembler::{Assembled, assemble};
use super::dispatch::{QueryOutput, dispatch_async, dispatch_sync};

/// The collection handle a queryable was created from. Fixes whether the
/// asynchronous terminals are available.
#[derive(Clone, Debug)]
pub enum QuerySource {
    Sync(Arc<Collection>),
    Async(AsyncCollection),
}

impl QuerySource {
    #[must_use]
    pub fn collection(&self) -> &Arc<Collection> {
        match self {
            Self::Sync(c) => c,
            Self::Async(c) => c.inner(),
        }
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

/// Executes expression trees against one collection.
///
/// Holds no per-query state: every execution acquires a fresh native handle,
/// so a tree can be executed any number of times.
#[derive(Clone, Debug)]
pub struct QueryProvider {
    source: QuerySource,
}

impl QueryProvider {
    #[must_use]
    pub fn new(source: QuerySource) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn source(&self) -> &QuerySource {
        &self.source
    }

    /// The root expression for queries over this provider's collection.
    #[must_use]
    pub fn root(&self) -> Expr {
        Expr::source(self.source.collection().name())
    }

    /// Runs `expr` synchronously. Allowed for both kinds of source.
    ///
    /// # Errors
    /// Composition errors from the assembler, or native errors unchanged.
    pub fn execute(&self, expr: &Expr) -> Result<QueryOutput, DbError> {
        let name = self.source.collection().name();
        log::trace!("query on '{name}': executing");
        let result = assemble(expr, self.source.collection().query())
            .and_then(|a| dispatch_sync(a.stage, a.terminal));
        trace_outcome(name, &result);
        result
    }

    /// Runs `expr` on the blocking pool.
    ///
    /// # Errors
    /// `InvalidOperation` when the source is synchronous; otherwise as
    /// [`execute`](Self::execute), plus `Cancelled`.
    pub async fn execute_async(&self, expr: &Expr, cancel: &CancellationToken) -> Result<QueryOutput, DbError> {
        let QuerySource::Async(col) = &self.source else {
            return Err(DbError::InvalidOperation("queryable is not async".into()));
        };
        log::trace!("query on '{}': executing async", col.name());
        let assembled = assemble(expr, col.query());
        let result = match assembled {
            Ok(a) => dispatch_async(a.stage, a.terminal, cancel).await,
            Err(e) => Err(e),
        };
        trace_outcome(col.name(), &result);
        result
    }

    /// Assembles without executing; useful for inspecting the native plan.
    ///
    /// # Errors
    /// Composition errors from the assembler.
    pub fn assemble_sync(&self, expr: &Expr) -> Result<Assembled<NativeQuery>, DbError> {
        assemble(expr, self.source.collection().query())
    }
}

fn trace_outcome(name: &str, result: &Result<QueryOutput, DbError>) {
    match result {
        Ok(out) => log::trace!("query on '{name}': materialized {}", out.shape()),
        Err(e) => log::trace!("query on '{name}': faulted: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::expr::Method;
    use crate::linq::assembler::Stage;

    #[test]
    fn sync_source_rejects_async_execution() {
        let e = Engine::new();
        let p = QueryProvider::new(QuerySource::Sync(e.create_collection("c")));
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let err = rt.block_on(p.execute_async(&p.root(), &CancellationToken::new())).unwrap_err();
        assert!(matches!(err, DbError::InvalidOperation(ref m) if m == "queryable is not async"));
    }

    #[tokio::test]
    async fn async_source_allows_both_paths() {
        let e = Engine::new();
        let col = e.create_collection("c");
        col.insert(&bson::doc! {"n": 1}).unwrap();
        let p = QueryProvider::new(QuerySource::Async(AsyncCollection::new(col)));
        let count = Expr::call(Method::Count, vec![p.root()]);
        assert!(matches!(p.execute(&count).unwrap(), QueryOutput::Count(1)));
        let out = p.execute_async(&count, &CancellationToken::new()).await.unwrap();
        assert!(matches!(out, QueryOutput::Count(1)));
    }

    #[test]
    fn assemble_sync_exposes_the_stage() {
        let e = Engine::new();
        let p = QueryProvider::new(QuerySource::Sync(e.create_collection("c")));
        let a = p.assemble_sync(&p.root()).unwrap();
        assert!(matches!(a.stage, Stage::Base(_)));
    }
}
