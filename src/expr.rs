//! Expression trees for deferred queries.
//!
//! A query is an immutable chain of [`Expr::Call`] nodes whose first argument
//! is always the source the operator applies to, bottoming out at a
//! [`Constant::Source`] naming the collection. Lambdas carry a single implicit
//! parameter, referenced in their body with [`Expr::Parameter`].
//!
//! Argument layout per operator (after the source):
//!
//! | Method | Arguments |
//! |---|---|
//! | `Where`, `OrderBy*`, `ThenBy*`, `Include`, `Select` | lambda |
//! | `Skip`, `Take` | integer constant |
//! | `First*`, `Single*`, `Count`, `LongCount`, `Any` | optional predicate lambda |
//! | `Sum`, `Average` | numeric kind constant, optional selector lambda |
//! | `Min`, `Max` | optional selector lambda, optional comparer constant |

use bson::Bson;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Result type tag for numeric aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Int32,
    Int64,
    Double,
}

/// Caller-supplied ordering for `Min`/`Max`.
#[derive(Clone)]
pub struct Comparer(Arc<dyn Fn(&Bson, &Bson) -> Ordering + Send + Sync>);

impl Comparer {
    pub fn new(f: impl Fn(&Bson, &Bson) -> Ordering + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn compare(&self, a: &Bson, b: &Bson) -> Ordering {
        (self.0)(a, b)
    }
}

impl fmt::Debug for Comparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparer(..)")
    }
}

#[derive(Debug, Clone)]
pub enum Constant {
    Value(Bson),
    /// Root of a query: the collection it reads from.
    Source(String),
    Comparer(Comparer),
    Numeric(NumericKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Where,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Skip,
    Take,
    Include,
    Select,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Count,
    LongCount,
    Any,
    Sum,
    Average,
    Min,
    Max,
    StartsWith,
    EndsWith,
    Contains,
    ToUpper,
    ToLower,
    Length,
    Named(String),
}

impl Method {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Where => "Where",
            Self::OrderBy => "OrderBy",
            Self::OrderByDescending => "OrderByDescending",
            Self::ThenBy => "ThenBy",
            Self::ThenByDescending => "ThenByDescending",
            Self::Skip => "Skip",
            Self::Take => "Take",
            Self::Include => "Include",
            Self::Select => "Select",
            Self::First => "First",
            Self::FirstOrDefault => "FirstOrDefault",
            Self::Single => "Single",
            Self::SingleOrDefault => "SingleOrDefault",
            Self::Count => "Count",
            Self::LongCount => "LongCount",
            Self::Any => "Any",
            Self::Sum => "Sum",
            Self::Average => "Average",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::Contains => "Contains",
            Self::ToUpper => "ToUpper",
            Self::ToLower => "ToLower",
            Self::Length => "Length",
            Self::Named(n) => n,
        }
    }

    /// Operators that return another deferred query.
    #[must_use]
    pub fn is_query_operator(&self) -> bool {
        matches!(
            self,
            Self::Where
                | Self::OrderBy
                | Self::OrderByDescending
                | Self::ThenBy
                | Self::ThenByDescending
                | Self::Skip
                | Self::Take
                | Self::Include
                | Self::Select
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::First
                | Self::FirstOrDefault
                | Self::Single
                | Self::SingleOrDefault
                | Self::Count
                | Self::LongCount
                | Self::Any
                | Self::Sum
                | Self::Average
                | Self::Min
                | Self::Max
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single-parameter lambda.
#[derive(Debug, Clone)]
pub struct Lambda {
    body: Box<Expr>,
}

impl Lambda {
    pub fn new(body: Expr) -> Self {
        Self { body: Box::new(body) }
    }

    #[must_use]
    pub fn body(&self) -> &Expr {
        &self.body
    }
}

impl From<Expr> for Lambda {
    fn from(body: Expr) -> Self {
        match body {
            Expr::Lambda(l) => l,
            other => Self::new(other),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Constant(Constant),
    Parameter,
    Member { target: Box<Expr>, name: String },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Lambda(Lambda),
    Call { method: Method, args: Vec<Expr> },
    /// Anonymous object construction, e.g. a projection to `{name, age}`.
    New(Vec<(String, Expr)>),
}

/// The lambda parameter itself.
#[must_use]
pub fn it() -> Expr {
    Expr::Parameter
}

/// Member access on the lambda parameter; dots descend into sub-documents.
#[must_use]
pub fn field(path: &str) -> Expr {
    path.split('.').fold(Expr::Parameter, Expr::member)
}

pub fn lit(value: impl Into<Bson>) -> Expr {
    Expr::Constant(Constant::Value(value.into()))
}

pub fn new_object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Expr)>) -> Expr {
    Expr::New(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn source(collection: impl Into<String>) -> Self {
        Self::Constant(Constant::Source(collection.into()))
    }

    pub fn call(method: Method, args: Vec<Expr>) -> Self {
        Self::Call { method, args }
    }

    #[must_use]
    pub fn member(self, name: &str) -> Self {
        Self::Member { target: Box::new(self), name: name.to_string() }
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Self {
        Self::Binary { op, lhs: Box::new(self), rhs: Box::new(rhs.into()) }
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn add(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn sub(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn mul(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn div(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn rem(self, rhs: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mod, rhs)
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::Unary { op: UnaryOp::Not, operand: Box::new(self) }
    }

    #[must_use]
    pub fn neg(self) -> Self {
        Self::Unary { op: UnaryOp::Negate, operand: Box::new(self) }
    }

    pub fn starts_with(self, prefix: impl Into<Expr>) -> Self {
        Self::call(Method::StartsWith, vec![self, prefix.into()])
    }

    pub fn ends_with(self, suffix: impl Into<Expr>) -> Self {
        Self::call(Method::EndsWith, vec![self, suffix.into()])
    }

    /// Substring test on strings, membership test on arrays.
    pub fn contains(self, item: impl Into<Expr>) -> Self {
        Self::call(Method::Contains, vec![self, item.into()])
    }

    #[must_use]
    pub fn to_upper(self) -> Self {
        Self::call(Method::ToUpper, vec![self])
    }

    #[must_use]
    pub fn to_lower(self) -> Self {
        Self::call(Method::ToLower, vec![self])
    }

    #[must_use]
    pub fn len(self) -> Self {
        Self::call(Method::Length, vec![self])
    }

    #[must_use]
    pub fn lambda(self) -> Lambda {
        Lambda::from(self)
    }

    /// Method of the outermost call, if this node is a call.
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        match self {
            Self::Call { method, .. } => Some(method),
            _ => None,
        }
    }
}

impl From<Lambda> for Expr {
    fn from(l: Lambda) -> Self {
        Self::Lambda(l)
    }
}

impl From<Constant> for Expr {
    fn from(c: Constant) -> Self {
        Self::Constant(c)
    }
}

impl From<Bson> for Expr {
    fn from(v: Bson) -> Self {
        lit(v)
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        lit(v)
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        lit(v)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        lit(v)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        lit(v)
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        lit(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        lit(v)
    }
}
