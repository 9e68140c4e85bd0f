//! Operator extractors.
//!
//! Each extractor walks the source chain from the outermost call inward
//! (always through `args[0]`, never into other arguments), collects what its
//! operator family needs, and reverses the result so it reads in application
//! order.

use crate::errors::DbError;
use crate::expr::{Comparer, Constant, Expr, Lambda, Method, NumericKind};
use crate::query::Order;
use bson::Bson;

/// Iterates `(method, args)` of each call along the source chain, outermost first.
pub(crate) struct SourceChain<'a> {
    next: Option<&'a Expr>,
}

impl<'a> SourceChain<'a> {
    pub(crate) fn new(root: &'a Expr) -> Self {
        Self { next: Some(root) }
    }
}

impl<'a> Iterator for SourceChain<'a> {
    type Item = (&'a Method, &'a [Expr]);

    fn next(&mut self) -> Option<Self::Item> {
        match self.next.take()? {
            Expr::Call { method, args } => {
                self.next = args.first();
                Some((method, args.as_slice()))
            }
            _ => None,
        }
    }
}

pub(crate) trait Extractor<'a>: Default {
    type Output;

    /// Called once per call node, outermost first.
    ///
    /// # Errors
    /// Malformed arguments for this extractor's operators.
    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError>;

    fn finish(self) -> Self::Output;
}

/// # Errors
/// Propagates the extractor's argument errors.
pub(crate) fn extract<'a, E: Extractor<'a>>(root: &'a Expr) -> Result<E::Output, DbError> {
    let mut extractor = E::default();
    for (method, args) in SourceChain::new(root) {
        extractor.visit(method, args)?;
    }
    Ok(extractor.finish())
}

fn required_lambda<'a>(args: &'a [Expr], name: &'static str) -> Result<&'a Lambda, DbError> {
    match args.get(1) {
        Some(Expr::Lambda(l)) => Ok(l),
        None => Err(DbError::ArgumentNull(name)),
        Some(other) => Err(DbError::not_supported(format!("{name} must be a lambda, got {other:?}"))),
    }
}

fn optional_lambda(args: &[Expr]) -> Option<&Lambda> {
    args.iter().skip(1).find_map(|a| match a {
        Expr::Lambda(l) => Some(l),
        _ => None,
    })
}

fn count_literal(args: &[Expr]) -> Result<usize, DbError> {
    let n = match args.get(1) {
        Some(Expr::Constant(Constant::Value(Bson::Int32(n)))) => i64::from(*n),
        Some(Expr::Constant(Constant::Value(Bson::Int64(n)))) => *n,
        None => return Err(DbError::ArgumentNull("count")),
        Some(other) => {
            return Err(DbError::not_supported(format!("count must be an integer literal, got {other:?}")));
        }
    };
    // negative counts behave like zero
    Ok(usize::try_from(n.max(0)).unwrap_or(usize::MAX))
}

/// Rejects operators composed on top of a `Select` whose lambdas would see the
/// projected value. The store only filters, orders and includes documents
/// before projecting, so these cannot be replayed faithfully. Paging and
/// aggregate selectors are fine after a projection.
///
/// # Errors
/// `NotSupported` naming the first offending operator family.
pub(crate) fn reject_after_projection(root: &Expr) -> Result<(), DbError> {
    let chain: Vec<_> = SourceChain::new(root).collect();
    let mut projected = false;
    for (method, args) in chain.into_iter().rev() {
        let family = match method {
            Method::Select => {
                projected = true;
                None
            }
            Method::Where => Some("filter"),
            Method::OrderBy | Method::OrderByDescending | Method::ThenBy | Method::ThenByDescending => {
                Some("order")
            }
            Method::Include => Some("include"),
            Method::First
            | Method::FirstOrDefault
            | Method::Single
            | Method::SingleOrDefault
            | Method::Count
            | Method::LongCount
            | Method::Any => optional_lambda(args).map(|_| "filter"),
            _ => None,
        };
        if let (true, Some(family)) = (projected, family) {
            return Err(DbError::not_supported(format!("{family} after projection is not supported")));
        }
    }
    Ok(())
}

/// Predicates of `Where` plus the implicit predicate carried by
/// `First`/`Single`/`Count`/`Any` and their variants.
#[derive(Default)]
pub(crate) struct FilterExtractor<'a> {
    found: Vec<&'a Lambda>,
}

impl<'a> Extractor<'a> for FilterExtractor<'a> {
    type Output = Vec<&'a Lambda>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        match method {
            Method::Where => self.found.push(required_lambda(args, "predicate")?),
            Method::First
            | Method::FirstOrDefault
            | Method::Single
            | Method::SingleOrDefault
            | Method::Count
            | Method::LongCount
            | Method::Any => {
                if let Some(l) = optional_lambda(args) {
                    self.found.push(l);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Self::Output {
        self.found.reverse();
        self.found
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OrderKey<'a> {
    pub selector: &'a Lambda,
    pub order: Order,
}

#[derive(Default)]
pub(crate) struct OrderExtractor<'a> {
    found: Vec<OrderKey<'a>>,
}

impl<'a> Extractor<'a> for OrderExtractor<'a> {
    type Output = Vec<OrderKey<'a>>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        let order = match method {
            Method::OrderBy => Order::Asc,
            Method::OrderByDescending => Order::Desc,
            _ => return Ok(()),
        };
        self.found.push(OrderKey { selector: required_lambda(args, "keySelector")?, order });
        Ok(())
    }

    fn finish(mut self) -> Self::Output {
        self.found.reverse();
        self.found
    }
}

#[derive(Default)]
pub(crate) struct ThenByExtractor<'a> {
    found: Vec<OrderKey<'a>>,
}

impl<'a> Extractor<'a> for ThenByExtractor<'a> {
    type Output = Vec<OrderKey<'a>>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        let order = match method {
            Method::ThenBy => Order::Asc,
            Method::ThenByDescending => Order::Desc,
            _ => return Ok(()),
        };
        self.found.push(OrderKey { selector: required_lambda(args, "keySelector")?, order });
        Ok(())
    }

    fn finish(mut self) -> Self::Output {
        self.found.reverse();
        self.found
    }
}

#[derive(Default)]
pub(crate) struct SkipExtractor {
    found: Vec<usize>,
}

impl<'a> Extractor<'a> for SkipExtractor {
    type Output = Option<usize>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        if *method == Method::Skip {
            self.found.push(count_literal(args)?);
        }
        Ok(())
    }

    /// The last literal in application order wins.
    fn finish(mut self) -> Self::Output {
        self.found.reverse();
        self.found.last().copied()
    }
}

#[derive(Default)]
pub(crate) struct TakeExtractor {
    found: Vec<usize>,
}

impl<'a> Extractor<'a> for TakeExtractor {
    type Output = Option<usize>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        if *method == Method::Take {
            self.found.push(count_literal(args)?);
        }
        Ok(())
    }

    fn finish(mut self) -> Self::Output {
        self.found.reverse();
        self.found.last().copied()
    }
}

#[derive(Default)]
pub(crate) struct IncludeExtractor<'a> {
    found: Vec<&'a Lambda>,
}

impl<'a> Extractor<'a> for IncludeExtractor<'a> {
    type Output = Vec<&'a Lambda>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        if *method == Method::Include {
            self.found.push(required_lambda(args, "path")?);
        }
        Ok(())
    }

    fn finish(mut self) -> Self::Output {
        self.found.reverse();
        self.found
    }
}

#[derive(Default)]
pub(crate) struct SelectExtractor<'a> {
    found: Vec<&'a Lambda>,
}

impl<'a> Extractor<'a> for SelectExtractor<'a> {
    type Output = Vec<&'a Lambda>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        if *method == Method::Select {
            self.found.push(required_lambda(args, "selector")?);
        }
        Ok(())
    }

    fn finish(mut self) -> Self::Output {
        self.found.reverse();
        self.found
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AggregateOp {
    Sum,
    Average,
    Min,
    Max,
}

#[derive(Debug)]
pub(crate) struct AggregateExtraction<'a> {
    pub op: AggregateOp,
    pub selector: Option<&'a Lambda>,
    pub comparer: Option<Comparer>,
    pub kind: Option<NumericKind>,
    /// No explicit selector, but a projection precedes the aggregate: the
    /// projected values are what gets aggregated.
    pub implicit_projection: bool,
}

#[derive(Default)]
pub(crate) struct AggregateExtractor<'a> {
    found: Option<AggregateExtraction<'a>>,
    saw_projection: bool,
}

impl<'a> Extractor<'a> for AggregateExtractor<'a> {
    type Output = Option<AggregateExtraction<'a>>;

    fn visit(&mut self, method: &'a Method, args: &'a [Expr]) -> Result<(), DbError> {
        let op = match method {
            Method::Sum => AggregateOp::Sum,
            Method::Average => AggregateOp::Average,
            Method::Min => AggregateOp::Min,
            Method::Max => AggregateOp::Max,
            Method::Select => {
                self.saw_projection |= self.found.is_some();
                return Ok(());
            }
            _ => return Ok(()),
        };
        // only the outermost aggregate is a terminal
        if self.found.is_some() {
            return Ok(());
        }
        let mut comparer = None;
        let mut kind = None;
        for arg in args.iter().skip(1) {
            match arg {
                Expr::Constant(Constant::Comparer(c)) => comparer = Some(c.clone()),
                Expr::Constant(Constant::Numeric(k)) => kind = Some(*k),
                _ => {}
            }
        }
        self.found = Some(AggregateExtraction {
            op,
            selector: optional_lambda(args),
            comparer,
            kind,
            implicit_projection: false,
        });
        Ok(())
    }

    fn finish(self) -> Self::Output {
        let saw_projection = self.saw_projection;
        self.found.map(|mut a| {
            a.implicit_projection = a.selector.is_none() && saw_projection;
            a
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{field, lit};

    fn call(method: Method, source: Expr, rest: Vec<Expr>) -> Expr {
        let mut args = vec![source];
        args.extend(rest);
        Expr::call(method, args)
    }

    fn lam(e: Expr) -> Expr {
        Expr::Lambda(e.lambda())
    }

    #[test]
    fn filters_come_out_in_composition_order() {
        let q = call(Method::Where, Expr::source("c"), vec![lam(field("a").equals(1))]);
        let q = call(Method::Where, q, vec![lam(field("b").equals(2))]);
        let q = call(Method::Count, q, vec![lam(field("c").equals(3))]);
        let found = extract::<FilterExtractor>(&q).unwrap();
        let paths: Vec<String> = found
            .iter()
            .map(|l| match l.body() {
                Expr::Binary { lhs, .. } => match lhs.as_ref() {
                    Expr::Member { name, .. } => name.clone(),
                    _ => String::new(),
                },
                _ => String::new(),
            })
            .collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }

    #[test]
    fn skip_and_take_read_literals() {
        let q = call(Method::Take, Expr::source("c"), vec![lit(2)]);
        let q = call(Method::Skip, q, vec![lit(Bson::Int64(3))]);
        assert_eq!(extract::<SkipExtractor>(&q).unwrap(), Some(3));
        assert_eq!(extract::<TakeExtractor>(&q).unwrap(), Some(2));
        let neg = call(Method::Skip, Expr::source("c"), vec![lit(-4)]);
        assert_eq!(extract::<SkipExtractor>(&neg).unwrap(), Some(0));
    }

    #[test]
    fn missing_lambda_is_argument_null() {
        let q = call(Method::Where, Expr::source("c"), vec![]);
        assert!(matches!(extract::<FilterExtractor>(&q), Err(DbError::ArgumentNull("predicate"))));
    }

    #[test]
    fn nested_arguments_are_not_walked() {
        let inner = call(Method::Where, Expr::source("other"), vec![lam(field("x").equals(1))]);
        let q = call(Method::Where, Expr::source("c"), vec![lam(field("a").equals(1)), inner]);
        assert_eq!(extract::<FilterExtractor>(&q).unwrap().len(), 1);
    }

    #[test]
    fn aggregate_after_projection_is_implicit() {
        let q = call(Method::Select, Expr::source("c"), vec![lam(field("age"))]);
        let q = call(Method::Sum, q, vec![Expr::Constant(Constant::Numeric(NumericKind::Int32))]);
        let agg = extract::<AggregateExtractor>(&q).unwrap().unwrap();
        assert_eq!(agg.op, AggregateOp::Sum);
        assert_eq!(agg.kind, Some(NumericKind::Int32));
        assert!(agg.selector.is_none());
        assert!(agg.implicit_projection);
    }

    #[test]
    fn explicit_selector_is_not_implicit() {
        let q = call(Method::Max, Expr::source("c"), vec![lam(field("age"))]);
        let agg = extract::<AggregateExtractor>(&q).unwrap().unwrap();
        assert!(agg.selector.is_some());
        assert!(!agg.implicit_projection);
    }

    #[test]
    fn orders_and_then_bys_are_separate_families() {
        let q = call(Method::OrderByDescending, Expr::source("c"), vec![lam(field("a"))]);
        let q = call(Method::ThenBy, q, vec![lam(field("b"))]);
        let primary = extract::<OrderExtractor>(&q).unwrap();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].order, Order::Desc);
        assert_eq!(extract::<ThenByExtractor>(&q).unwrap().len(), 1);
    }
}
