//! Field-expression compiler: turns lambdas over a document into the store's
//! native `Filter` and `FieldExpr` forms.

use crate::errors::DbError;
use crate::expr::{BinaryOp, Constant, Expr, Lambda, Method, UnaryOp};
use bson::Bson;

use super::types::{ArithOp, CmpOp, FieldExpr, Filter, LogicOp, MAX_PATH_DEPTH, ScalarFn};

/// # Errors
/// Returns `QueryError` if the lambda body has no native equivalent.
pub fn compile_predicate(lambda: &Lambda) -> Result<Filter, DbError> {
    predicate(lambda.body())
}

/// # Errors
/// Returns `QueryError` if the lambda body has no native equivalent.
pub fn compile_selector(lambda: &Lambda) -> Result<FieldExpr, DbError> {
    selector(lambda.body())
}

/// Compiles a navigation lambda such as `x => x.author` to its dotted path.
///
/// # Errors
/// Returns `QueryError` if the body is not a plain member path.
pub fn compile_path(lambda: &Lambda) -> Result<String, DbError> {
    member_path(lambda.body())
        .ok_or_else(|| DbError::QueryError("include expects a member path such as x => x.field".into()))
}

fn predicate(expr: &Expr) -> Result<Filter, DbError> {
    match expr {
        Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
            let mut parts = Vec::new();
            for side in [lhs, rhs] {
                match predicate(side)? {
                    Filter::And(inner) => parts.extend(inner),
                    f => parts.push(f),
                }
            }
            Ok(Filter::And(parts))
        }
        Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
            let mut parts = Vec::new();
            for side in [lhs, rhs] {
                match predicate(side)? {
                    Filter::Or(inner) => parts.extend(inner),
                    f => parts.push(f),
                }
            }
            Ok(Filter::Or(parts))
        }
        Expr::Unary { op: UnaryOp::Not, operand } => Ok(match predicate(operand)? {
            Filter::In { path, values } => Filter::Nin { path, values },
            inner => Filter::Not(Box::new(inner)),
        }),
        Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
            let cmp = cmp_op(*op);
            if let (Some(path), Some(value)) = (member_path(lhs), constant(rhs)) {
                return Ok(Filter::Cmp { path, op: cmp, value });
            }
            if let (Some(value), Some(path)) = (constant(lhs), member_path(rhs)) {
                return Ok(Filter::Cmp { path, op: cmp.flipped(), value });
            }
            Ok(Filter::Expr(selector(expr)?))
        }
        Expr::Call { method, args } => match (method, args.as_slice()) {
            (Method::StartsWith, [target, arg]) => match (member_path(target), constant(arg)) {
                (Some(path), Some(Bson::String(prefix))) => Ok(Filter::StartsWith { path, prefix }),
                _ => Ok(Filter::Expr(selector(expr)?)),
            },
            (Method::EndsWith, [target, arg]) => match (member_path(target), constant(arg)) {
                (Some(path), Some(Bson::String(suffix))) => Ok(Filter::EndsWith { path, suffix }),
                _ => Ok(Filter::Expr(selector(expr)?)),
            },
            (Method::Contains, [target, arg]) => {
                if let (Some(path), Some(value)) = (member_path(target), constant(arg)) {
                    return Ok(Filter::Contains { path, value });
                }
                if let (Some(Bson::Array(values)), Some(path)) = (constant(target), member_path(arg)) {
                    return Ok(Filter::In { path, values });
                }
                Ok(Filter::Expr(selector(expr)?))
            }
            _ => Ok(Filter::Expr(selector(expr)?)),
        },
        Expr::Constant(Constant::Value(Bson::Boolean(b))) => {
            Ok(if *b { Filter::True } else { Filter::Not(Box::new(Filter::True)) })
        }
        Expr::Member { .. } => match member_path(expr) {
            Some(path) => Ok(Filter::Cmp { path, op: CmpOp::Eq, value: Bson::Boolean(true) }),
            None => Ok(Filter::Expr(selector(expr)?)),
        },
        _ => Ok(Filter::Expr(selector(expr)?)),
    }
}

fn selector(expr: &Expr) -> Result<FieldExpr, DbError> {
    Ok(match expr {
        Expr::Parameter => FieldExpr::Root,
        Expr::Member { .. } => match member_path(expr) {
            Some(p) => FieldExpr::Path(p),
            None => {
                return Err(DbError::QueryError(
                    "member access is only supported on the lambda parameter".into(),
                ));
            }
        },
        Expr::Constant(Constant::Value(v)) => FieldExpr::Literal(v.clone()),
        Expr::Constant(other) => {
            return Err(DbError::QueryError(format!("constant {other:?} cannot be used inside a lambda")));
        }
        Expr::Binary { op, lhs, rhs } => {
            let (l, r) = (Box::new(selector(lhs)?), Box::new(selector(rhs)?));
            match op {
                BinaryOp::And => FieldExpr::Logic { op: LogicOp::And, lhs: l, rhs: r },
                BinaryOp::Or => FieldExpr::Logic { op: LogicOp::Or, lhs: l, rhs: r },
                BinaryOp::Add => FieldExpr::Arith { op: ArithOp::Add, lhs: l, rhs: r },
                BinaryOp::Sub => FieldExpr::Arith { op: ArithOp::Sub, lhs: l, rhs: r },
                BinaryOp::Mul => FieldExpr::Arith { op: ArithOp::Mul, lhs: l, rhs: r },
                BinaryOp::Div => FieldExpr::Arith { op: ArithOp::Div, lhs: l, rhs: r },
                BinaryOp::Mod => FieldExpr::Arith { op: ArithOp::Mod, lhs: l, rhs: r },
                cmp => FieldExpr::Compare { op: cmp_op(*cmp), lhs: l, rhs: r },
            }
        }
        Expr::Unary { op: UnaryOp::Not, operand } => FieldExpr::Not(Box::new(selector(operand)?)),
        Expr::Unary { op: UnaryOp::Negate, operand } => FieldExpr::Negate(Box::new(selector(operand)?)),
        Expr::Call { method, args } => {
            let (func, arity) = match method {
                Method::StartsWith => (ScalarFn::StartsWith, 2),
                Method::EndsWith => (ScalarFn::EndsWith, 2),
                Method::Contains => (ScalarFn::Contains, 2),
                Method::ToUpper => (ScalarFn::Upper, 1),
                Method::ToLower => (ScalarFn::Lower, 1),
                Method::Length => (ScalarFn::Length, 1),
                other => {
                    return Err(DbError::QueryError(format!(
                        "method '{other}' cannot be used inside a lambda"
                    )));
                }
            };
            if args.len() != arity {
                return Err(DbError::QueryError(format!(
                    "method '{method}' expects {arity} argument(s), got {}",
                    args.len()
                )));
            }
            FieldExpr::Func { func, args: args.iter().map(selector).collect::<Result<_, _>>()? }
        }
        Expr::New(fields) => FieldExpr::Object(
            fields
                .iter()
                .map(|(name, e)| Ok((name.clone(), selector(e)?)))
                .collect::<Result<_, DbError>>()?,
        ),
        Expr::Lambda(_) => {
            return Err(DbError::QueryError("nested lambdas are not supported".into()));
        }
    })
}

fn cmp_op(op: BinaryOp) -> CmpOp {
    match op {
        BinaryOp::Ne => CmpOp::Ne,
        BinaryOp::Lt => CmpOp::Lt,
        BinaryOp::Le => CmpOp::Lte,
        BinaryOp::Gt => CmpOp::Gt,
        BinaryOp::Ge => CmpOp::Gte,
        _ => CmpOp::Eq,
    }
}

/// `x.a.b` becomes `Some("a.b")`; anything not rooted at the parameter is `None`.
fn member_path(expr: &Expr) -> Option<String> {
    let mut segs = Vec::new();
    let mut cur = expr;
    loop {
        match cur {
            Expr::Member { target, name } => {
                segs.push(name.as_str());
                cur = target;
            }
            Expr::Parameter if !segs.is_empty() && segs.len() <= MAX_PATH_DEPTH => break,
            _ => return None,
        }
    }
    segs.reverse();
    Some(segs.join("."))
}

fn constant(expr: &Expr) -> Option<Bson> {
    match expr {
        Expr::Constant(Constant::Value(v)) => Some(v.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{field, it, lit, new_object};

    #[test]
    fn path_comparisons_become_cmp_filters() {
        let f = compile_predicate(&field("age").gt(25).lambda()).unwrap();
        assert_eq!(f, Filter::Cmp { path: "age".into(), op: CmpOp::Gt, value: Bson::Int32(25) });
        let flipped = compile_predicate(&lit(25).lt(field("age")).lambda()).unwrap();
        assert_eq!(flipped, Filter::Cmp { path: "age".into(), op: CmpOp::Gt, value: Bson::Int32(25) });
    }

    #[test]
    fn conjunctions_are_flattened() {
        let body = field("a").equals(1).and(field("b").equals(2)).and(field("c").equals(3));
        let Filter::And(parts) = compile_predicate(&body.lambda()).unwrap() else { panic!("and") };
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn string_methods_on_paths_use_native_forms() {
        let f = compile_predicate(&field("name").starts_with("T").lambda()).unwrap();
        assert_eq!(f, Filter::StartsWith { path: "name".into(), prefix: "T".into() });
        let f = compile_predicate(&lit(vec![Bson::from("a"), Bson::from("b")]).contains(field("k")).lambda())
            .unwrap();
        assert!(matches!(f, Filter::In { ref path, .. } if path == "k"));
        let f = compile_predicate(&lit(vec![Bson::from("a")]).contains(field("k")).not().lambda()).unwrap();
        assert!(matches!(f, Filter::Nin { ref path, .. } if path == "k"));
    }

    #[test]
    fn computed_predicates_fall_back_to_expressions() {
        let f = compile_predicate(&field("name").to_upper().equals("TIM").lambda()).unwrap();
        assert!(matches!(f, Filter::Expr(FieldExpr::Compare { op: CmpOp::Eq, .. })));
    }

    #[test]
    fn selectors_and_paths() {
        assert_eq!(compile_selector(&it().lambda()).unwrap(), FieldExpr::Root);
        assert_eq!(compile_selector(&field("a.b").lambda()).unwrap(), FieldExpr::Path("a.b".into()));
        let obj = compile_selector(&new_object([("n", field("name"))]).lambda()).unwrap();
        assert_eq!(obj, FieldExpr::Object(vec![("n".into(), FieldExpr::Path("name".into()))]));
        assert_eq!(compile_path(&field("author").lambda()).unwrap(), "author");
        assert!(compile_path(&it().lambda()).is_err());
    }

    #[test]
    fn query_operators_inside_lambdas_are_rejected() {
        let nested = Expr::call(Method::Where, vec![Expr::source("x")]);
        assert!(matches!(compile_selector(&nested.lambda()), Err(DbError::QueryError(_))));
    }
}
