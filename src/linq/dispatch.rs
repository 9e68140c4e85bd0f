//! Terminal execution dispatch.
//!
//! The outermost call of a query picks exactly one native terminal. The set of
//! terminals and their result shapes is closed, so dispatch is a match over
//! [`Terminal`] producing a [`QueryOutput`].

use crate::errors::DbError;
use crate::expr::{Comparer, Expr, Method, NumericKind};
use crate::query::{
    AsyncNativeQuery, AsyncSelectedQuery, Cursor, FieldExpr, NativeQuery, SelectedQuery,
    compile_selector,
};
use bson::Bson;
use tokio_util::sync::CancellationToken;

use super::assembler::Stage;
use super::extract::{AggregateExtractor, AggregateOp, extract};

#[derive(Debug, Clone)]
pub enum Terminal {
    /// Plain enumeration of the query.
    Materialize,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Count,
    LongCount,
    Any,
    Sum { kind: NumericKind, selector: Option<FieldExpr> },
    Average { kind: NumericKind, selector: Option<FieldExpr> },
    Min { selector: Option<FieldExpr>, comparer: Option<Comparer> },
    Max { selector: Option<FieldExpr>, comparer: Option<Comparer> },
}

/// Determines the terminal from the outermost call. Query operators and a
/// bare source collapse to [`Terminal::Materialize`].
///
/// # Errors
/// `NotSupported` for unrecognized methods; `ArgumentNull` for a numeric
/// aggregate without a result kind.
pub fn terminal_of(expr: &Expr) -> Result<Terminal, DbError> {
    let Some(method) = expr.method() else {
        return Ok(Terminal::Materialize);
    };
    Ok(match method {
        m if m.is_query_operator() => Terminal::Materialize,
        Method::First => Terminal::First,
        Method::FirstOrDefault => Terminal::FirstOrDefault,
        Method::Single => Terminal::Single,
        Method::SingleOrDefault => Terminal::SingleOrDefault,
        Method::Count => Terminal::Count,
        Method::LongCount => Terminal::LongCount,
        Method::Any => Terminal::Any,
        Method::Sum | Method::Average | Method::Min | Method::Max => aggregate_terminal(expr)?,
        other => return Err(DbError::not_supported(format!("method '{other}' is not supported"))),
    })
}

fn aggregate_terminal(expr: &Expr) -> Result<Terminal, DbError> {
    let Some(agg) = extract::<AggregateExtractor>(expr)? else {
        return Err(DbError::not_supported("aggregate without a source"));
    };
    if agg.implicit_projection {
        log::trace!("{:?} aggregates the projected values", agg.op);
    }
    let selector = agg.selector.map(compile_selector).transpose()?;
    Ok(match agg.op {
        AggregateOp::Sum => Terminal::Sum { kind: agg.kind.ok_or(DbError::ArgumentNull("kind"))?, selector },
        AggregateOp::Average => {
            Terminal::Average { kind: agg.kind.ok_or(DbError::ArgumentNull("kind"))?, selector }
        }
        AggregateOp::Min => Terminal::Min { selector, comparer: agg.comparer },
        AggregateOp::Max => Terminal::Max { selector, comparer: agg.comparer },
    })
}

/// Lazy sequence produced by [`Terminal::Materialize`].
pub enum Rows {
    Documents(Cursor),
    Values(std::vec::IntoIter<Bson>),
}

impl Iterator for Rows {
    type Item = Bson;

    fn next(&mut self) -> Option<Bson> {
        match self {
            Self::Documents(c) => c.next(),
            Self::Values(v) => v.next(),
        }
    }
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Documents(_) => f.write_str("Rows::Documents(..)"),
            Self::Values(v) => write!(f, "Rows::Values({} left)", v.len()),
        }
    }
}

#[derive(Debug)]
pub enum QueryOutput {
    Rows(Rows),
    Element(Option<Bson>),
    Count(usize),
    LongCount(u64),
    Bool(bool),
    Scalar(Bson),
}

impl QueryOutput {
    /// Short name of the shape, for error messages.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Rows(_) => "rows",
            Self::Element(_) => "element",
            Self::Count(_) => "count",
            Self::LongCount(_) => "long count",
            Self::Bool(_) => "bool",
            Self::Scalar(_) => "scalar",
        }
    }
}

/// # Errors
/// Propagates native errors unchanged.
pub fn dispatch_sync(stage: Stage<NativeQuery>, terminal: Terminal) -> Result<QueryOutput, DbError> {
    match stage {
        Stage::Base(q) => base_sync(q, terminal),
        Stage::Selected(q) => selected_sync(q, terminal),
    }
}

fn base_sync(q: NativeQuery, terminal: Terminal) -> Result<QueryOutput, DbError> {
    Ok(match terminal {
        Terminal::Materialize => QueryOutput::Rows(Rows::Documents(q.find())),
        Terminal::First => QueryOutput::Element(Some(q.first()?)),
        Terminal::FirstOrDefault => QueryOutput::Element(q.first_or_default()),
        Terminal::Single => QueryOutput::Element(Some(q.single()?)),
        Terminal::SingleOrDefault => QueryOutput::Element(q.single_or_default()?),
        Terminal::Count => QueryOutput::Count(q.count()),
        Terminal::LongCount => QueryOutput::LongCount(q.long_count()),
        Terminal::Any => QueryOutput::Bool(q.exists()),
        Terminal::Sum { kind, selector } => QueryOutput::Scalar(q.sum(selector.as_ref(), kind)?),
        Terminal::Average { kind, selector } => QueryOutput::Scalar(q.average(selector.as_ref(), kind)?),
        Terminal::Min { selector, comparer } => {
            QueryOutput::Scalar(q.min(selector.as_ref(), comparer.as_ref())?)
        }
        Terminal::Max { selector, comparer } => {
            QueryOutput::Scalar(q.max(selector.as_ref(), comparer.as_ref())?)
        }
    })
}

fn selected_sync(q: SelectedQuery, terminal: Terminal) -> Result<QueryOutput, DbError> {
    Ok(match terminal {
        Terminal::Materialize => QueryOutput::Rows(Rows::Values(q.to_values().into_iter())),
        Terminal::First => QueryOutput::Element(Some(q.first()?)),
        Terminal::FirstOrDefault => QueryOutput::Element(q.first_or_default()),
        Terminal::Single => QueryOutput::Element(Some(q.single()?)),
        Terminal::SingleOrDefault => QueryOutput::Element(q.single_or_default()?),
        Terminal::Count => QueryOutput::Count(q.count()),
        Terminal::LongCount => QueryOutput::LongCount(q.long_count()),
        Terminal::Any => QueryOutput::Bool(q.exists()),
        Terminal::Sum { kind, selector } => QueryOutput::Scalar(q.sum(selector.as_ref(), kind)?),
        Terminal::Average { kind, selector } => QueryOutput::Scalar(q.average(selector.as_ref(), kind)?),
        Terminal::Min { selector, comparer } => {
            QueryOutput::Scalar(q.min(selector.as_ref(), comparer.as_ref())?)
        }
        Terminal::Max { selector, comparer } => {
            QueryOutput::Scalar(q.max(selector.as_ref(), comparer.as_ref())?)
        }
    })
}

/// # Errors
/// Propagates native errors unchanged, or `Cancelled`.
pub async fn dispatch_async(
    stage: Stage<AsyncNativeQuery>,
    terminal: Terminal,
    cancel: &CancellationToken,
) -> Result<QueryOutput, DbError> {
    match stage {
        Stage::Base(q) => base_async(q, terminal, cancel).await,
        Stage::Selected(q) => selected_async(q, terminal, cancel).await,
    }
}

async fn base_async(
    q: AsyncNativeQuery,
    terminal: Terminal,
    cancel: &CancellationToken,
) -> Result<QueryOutput, DbError> {
    Ok(match terminal {
        Terminal::Materialize => QueryOutput::Rows(Rows::Values(q.to_documents(cancel).await?.into_iter())),
        Terminal::First => QueryOutput::Element(Some(q.first(cancel).await?)),
        Terminal::FirstOrDefault => QueryOutput::Element(q.first_or_default(cancel).await?),
        Terminal::Single => QueryOutput::Element(Some(q.single(cancel).await?)),
        Terminal::SingleOrDefault => QueryOutput::Element(q.single_or_default(cancel).await?),
        Terminal::Count => QueryOutput::Count(q.count(cancel).await?),
        Terminal::LongCount => QueryOutput::LongCount(q.long_count(cancel).await?),
        Terminal::Any => QueryOutput::Bool(q.exists(cancel).await?),
        Terminal::Sum { kind, selector } => QueryOutput::Scalar(q.sum(selector, kind, cancel).await?),
        Terminal::Average { kind, selector } => QueryOutput::Scalar(q.average(selector, kind, cancel).await?),
        Terminal::Min { selector, comparer } => QueryOutput::Scalar(q.min(selector, comparer, cancel).await?),
        Terminal::Max { selector, comparer } => QueryOutput::Scalar(q.max(selector, comparer, cancel).await?),
    })
}

async fn selected_async(
    q: AsyncSelectedQuery,
    terminal: Terminal,
    cancel: &CancellationToken,
) -> Result<QueryOutput, DbError> {
    Ok(match terminal {
        Terminal::Materialize => QueryOutput::Rows(Rows::Values(q.to_values(cancel).await?.into_iter())),
        Terminal::First => QueryOutput::Element(Some(q.first(cancel).await?)),
        Terminal::FirstOrDefault => QueryOutput::Element(q.first_or_default(cancel).await?),
        Terminal::Single => QueryOutput::Element(Some(q.single(cancel).await?)),
        Terminal::SingleOrDefault => QueryOutput::Element(q.single_or_default(cancel).await?),
        Terminal::Count => QueryOutput::Count(q.count(cancel).await?),
        Terminal::LongCount => QueryOutput::LongCount(q.long_count(cancel).await?),
        Terminal::Any => QueryOutput::Bool(q.exists(cancel).await?),
        Terminal::Sum { kind, selector } => QueryOutput::Scalar(q.sum(selector, kind, cancel).await?),
        Terminal::Average { kind, selector } => QueryOutput::Scalar(q.average(selector, kind, cancel).await?),
        Terminal::Min { selector, comparer } => QueryOutput::Scalar(q.min(selector, comparer, cancel).await?),
        Terminal::Max { selector, comparer } => QueryOutput::Scalar(q.max(selector, comparer, cancel).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Constant, field};

    #[test]
    fn query_operators_collapse_to_materialize() {
        assert!(matches!(terminal_of(&Expr::source("c")).unwrap(), Terminal::Materialize));
        let q = Expr::call(Method::Take, vec![Expr::source("c"), 3.into()]);
        assert!(matches!(terminal_of(&q).unwrap(), Terminal::Materialize));
    }

    #[test]
    fn aggregates_carry_kind_and_selector() {
        let q = Expr::call(
            Method::Average,
            vec![
                Expr::source("c"),
                Expr::Constant(Constant::Numeric(NumericKind::Int64)),
                Expr::Lambda(field("age").lambda()),
            ],
        );
        match terminal_of(&q).unwrap() {
            Terminal::Average { kind, selector } => {
                assert_eq!(kind, NumericKind::Int64);
                assert_eq!(selector, Some(FieldExpr::Path("age".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
        let no_kind = Expr::call(Method::Sum, vec![Expr::source("c")]);
        assert!(matches!(terminal_of(&no_kind), Err(DbError::ArgumentNull("kind"))));
    }

    #[test]
    fn scalar_functions_are_not_terminals() {
        let q = Expr::call(Method::ToUpper, vec![Expr::source("c")]);
        assert!(terminal_of(&q).unwrap_err().is_not_supported());
    }
}
