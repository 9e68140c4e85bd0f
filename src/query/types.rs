use bson::Bson;

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    /// The operator that holds with the operands swapped.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFn {
    StartsWith,
    EndsWith,
    Contains,
    Upper,
    Lower,
    Length,
}

/// A value expression evaluated against one row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldExpr {
    Root,
    Path(String),
    Literal(Bson),
    Object(Vec<(String, FieldExpr)>),
    Compare { op: CmpOp, lhs: Box<FieldExpr>, rhs: Box<FieldExpr> },
    Logic { op: LogicOp, lhs: Box<FieldExpr>, rhs: Box<FieldExpr> },
    Not(Box<FieldExpr>),
    Arith { op: ArithOp, lhs: Box<FieldExpr>, rhs: Box<FieldExpr> },
    Negate(Box<FieldExpr>),
    Func { func: ScalarFn, args: Vec<FieldExpr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    StartsWith { path: String, prefix: String },
    EndsWith { path: String, suffix: String },
    Contains { path: String, value: Bson },
    /// Any boolean expression the path-based forms cannot express.
    Expr(FieldExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub key: FieldExpr,
    pub order: Order,
}
