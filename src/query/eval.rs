use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::types::{
    ArithOp, CmpOp, FieldExpr, Filter, LogicOp, MAX_IN_SET, MAX_PATH_DEPTH, Order, ScalarFn,
    SortKey,
};

pub fn eval_filter(row: &Bson, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(row, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(row, f)),
        Filter::Not(f) => !eval_filter(row, f),
        Filter::In { path, values } => get_path(row, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Nin { path, values } => !get_path(row, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Cmp { path, op, value } => {
            let v = get_path(row, path).unwrap_or(&Bson::Null);
            compare_with(v, *op, value)
        }
        Filter::StartsWith { path, prefix } => {
            matches!(get_path(row, path), Some(Bson::String(s)) if s.starts_with(prefix.as_str()))
        }
        Filter::EndsWith { path, suffix } => {
            matches!(get_path(row, path), Some(Bson::String(s)) if s.ends_with(suffix.as_str()))
        }
        Filter::Contains { path, value } => get_path(row, path).is_some_and(|v| contains(v, value)),
        Filter::Expr(e) => is_truthy(&eval_field(row, e)),
    }
}

/// Evaluates `expr` against `row`; anything that cannot be computed is `Null`.
pub fn eval_field(row: &Bson, expr: &FieldExpr) -> Bson {
    match expr {
        FieldExpr::Root => row.clone(),
        FieldExpr::Path(p) => get_path(row, p).cloned().unwrap_or(Bson::Null),
        FieldExpr::Literal(v) => v.clone(),
        FieldExpr::Object(fields) => {
            let mut out = BsonDocument::new();
            for (name, e) in fields {
                out.insert(name.clone(), eval_field(row, e));
            }
            Bson::Document(out)
        }
        FieldExpr::Compare { op, lhs, rhs } => {
            Bson::Boolean(compare_with(&eval_field(row, lhs), *op, &eval_field(row, rhs)))
        }
        FieldExpr::Logic { op, lhs, rhs } => {
            let l = is_truthy(&eval_field(row, lhs));
            let b = match op {
                LogicOp::And => l && is_truthy(&eval_field(row, rhs)),
                LogicOp::Or => l || is_truthy(&eval_field(row, rhs)),
            };
            Bson::Boolean(b)
        }
        FieldExpr::Not(e) => Bson::Boolean(!is_truthy(&eval_field(row, e))),
        FieldExpr::Arith { op, lhs, rhs } => arith(*op, &eval_field(row, lhs), &eval_field(row, rhs)),
        FieldExpr::Negate(e) => match eval_field(row, e) {
            Bson::Int32(i) => i.checked_neg().map_or(Bson::Int64(-i64::from(i)), Bson::Int32),
            Bson::Int64(i) => i.checked_neg().map_or(Bson::Null, Bson::Int64),
            Bson::Double(f) => Bson::Double(-f),
            _ => Bson::Null,
        },
        FieldExpr::Func { func, args } => {
            let vals: Vec<Bson> = args.iter().map(|a| eval_field(row, a)).collect();
            scalar(*func, &vals)
        }
    }
}

pub fn compare_rows(a: &Bson, b: &Bson, sort: &SortKey) -> Ordering {
    let ord = compare_bson(&eval_field(a, &sort.key), &eval_field(b, &sort.key));
    if matches!(sort.order, Order::Asc) { ord } else { ord.reverse() }
}

fn compare_with(v: &Bson, op: CmpOp, value: &Bson) -> bool {
    match op {
        CmpOp::Eq => bson_equal(v, value),
        CmpOp::Ne => !bson_equal(v, value),
        // ordering against a missing or null operand never matches
        _ if matches!(v, Bson::Null) || matches!(value, Bson::Null) => false,
        CmpOp::Gt => compare_bson(v, value) == Ordering::Greater,
        CmpOp::Gte => compare_bson(v, value) != Ordering::Less,
        CmpOp::Lt => compare_bson(v, value) == Ordering::Less,
        CmpOp::Lte => compare_bson(v, value) != Ordering::Greater,
    }
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().take(MAX_IN_SET).any(|x| bson_equal(x, v))
}

fn contains(haystack: &Bson, needle: &Bson) -> bool {
    match (haystack, needle) {
        (Bson::String(s), Bson::String(n)) => s.contains(n.as_str()),
        (Bson::Array(items), _) => is_in_set(needle, items),
        _ => false,
    }
}

pub(crate) fn is_truthy(v: &Bson) -> bool {
    matches!(v, Bson::Boolean(true))
}

/// Resolves a dotted path inside `row`. An empty path is the row itself.
pub fn get_path<'a>(row: &'a Bson, path: &str) -> Option<&'a Bson> {
    if path.is_empty() {
        return Some(row);
    }
    if path.len() > 1024 {
        return None;
    }
    let mut cur = row;
    for (depth, part) in path.split('.').enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        cur = match cur {
            Bson::Document(d) => d.get(part)?,
            _ => return None,
        };
    }
    Some(cur)
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

pub(crate) fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

pub(crate) fn as_i64_num(x: &Bson) -> Option<i64> {
    match x {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

/// Equality that treats numerically equal values of different widths as equal.
pub fn bson_equal(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return match (as_i64_num(a), as_i64_num(b)) {
            (Some(x), Some(y)) => x == y,
            _ => as_f64_num(a) == as_f64_num(b),
        };
    }
    a == b
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if is_num(a) && is_num(b) {
        if let (Some(x), Some(y)) = (as_i64_num(a), as_i64_num(b)) {
            return x.cmp(&y);
        }
        return as_f64_num(a).total_cmp(&as_f64_num(b));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::String(_) | T::Symbol(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::RegularExpression(_) => 11,
        T::DbPointer(_) => 12,
        T::JavaScriptCode(_) | T::JavaScriptCodeWithScope(_) => 13,
        T::MaxKey => 255,
    }
}

fn arith(op: ArithOp, a: &Bson, b: &Bson) -> Bson {
    if let (Bson::String(x), Bson::String(y), ArithOp::Add) = (a, b, op) {
        return Bson::String(format!("{x}{y}"));
    }
    if !is_num(a) || !is_num(b) {
        return Bson::Null;
    }
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => match int_op(op, i64::from(*x), i64::from(*y)) {
            Some(r) => i32::try_from(r).map_or(Bson::Int64(r), Bson::Int32),
            None => Bson::Null,
        },
        _ => match (as_i64_num(a), as_i64_num(b)) {
            (Some(x), Some(y)) => int_op(op, x, y).map_or(Bson::Null, Bson::Int64),
            _ => {
                let (x, y) = (as_f64_num(a), as_f64_num(b));
                Bson::Double(match op {
                    ArithOp::Add => x + y,
                    ArithOp::Sub => x - y,
                    ArithOp::Mul => x * y,
                    ArithOp::Div => x / y,
                    ArithOp::Mod => x % y,
                })
            }
        },
    }
}

fn int_op(op: ArithOp, x: i64, y: i64) -> Option<i64> {
    match op {
        ArithOp::Add => x.checked_add(y),
        ArithOp::Sub => x.checked_sub(y),
        ArithOp::Mul => x.checked_mul(y),
        ArithOp::Div => x.checked_div(y),
        ArithOp::Mod => x.checked_rem(y),
    }
}

fn scalar(func: ScalarFn, args: &[Bson]) -> Bson {
    match (func, args) {
        (ScalarFn::StartsWith, [Bson::String(s), Bson::String(p)]) => {
            Bson::Boolean(s.starts_with(p.as_str()))
        }
        (ScalarFn::EndsWith, [Bson::String(s), Bson::String(p)]) => {
            Bson::Boolean(s.ends_with(p.as_str()))
        }
        (ScalarFn::Contains, [haystack, needle]) => Bson::Boolean(contains(haystack, needle)),
        (ScalarFn::Upper, [Bson::String(s)]) => Bson::String(s.to_uppercase()),
        (ScalarFn::Lower, [Bson::String(s)]) => Bson::String(s.to_lowercase()),
        (ScalarFn::Length, [Bson::String(s)]) => len_to_bson(s.chars().count()),
        (ScalarFn::Length, [Bson::Array(a)]) => len_to_bson(a.len()),
        (ScalarFn::StartsWith | ScalarFn::EndsWith, _) => Bson::Boolean(false),
        _ => Bson::Null,
    }
}

fn len_to_bson(n: usize) -> Bson {
    i32::try_from(n).map_or_else(|_| Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)), Bson::Int32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn row() -> Bson {
        Bson::Document(doc! {"name": "Thomas", "age": 30, "tags": ["a", "b"], "addr": {"city": "Oslo"}})
    }

    #[test]
    fn cmp_is_width_insensitive() {
        let f = Filter::Cmp { path: "age".into(), op: CmpOp::Eq, value: Bson::Int64(30) };
        assert!(eval_filter(&row(), &f));
        let f = Filter::Cmp { path: "age".into(), op: CmpOp::Lt, value: Bson::Double(30.5) };
        assert!(eval_filter(&row(), &f));
    }

    #[test]
    fn missing_path_only_matches_null_equality() {
        let eq_null = Filter::Cmp { path: "nope".into(), op: CmpOp::Eq, value: Bson::Null };
        let gt = Filter::Cmp { path: "nope".into(), op: CmpOp::Gt, value: Bson::Int32(1) };
        assert!(eval_filter(&row(), &eq_null));
        assert!(!eval_filter(&row(), &gt));
    }

    #[test]
    fn string_and_array_predicates() {
        let r = row();
        assert!(eval_filter(&r, &Filter::StartsWith { path: "name".into(), prefix: "Th".into() }));
        assert!(eval_filter(&r, &Filter::EndsWith { path: "name".into(), suffix: "mas".into() }));
        assert!(eval_filter(&r, &Filter::Contains { path: "tags".into(), value: "b".into() }));
        assert!(eval_filter(&r, &Filter::In { path: "addr.city".into(), values: vec!["Oslo".into()] }));
        assert!(!eval_filter(&r, &Filter::Nin { path: "addr.city".into(), values: vec!["Oslo".into()] }));
    }

    #[test]
    fn field_expressions_compute_values() {
        let r = row();
        let plus = FieldExpr::Arith {
            op: ArithOp::Add,
            lhs: Box::new(FieldExpr::Path("age".into())),
            rhs: Box::new(FieldExpr::Literal(Bson::Int32(1))),
        };
        assert_eq!(eval_field(&r, &plus), Bson::Int32(31));
        let upper = FieldExpr::Func { func: ScalarFn::Upper, args: vec![FieldExpr::Path("name".into())] };
        assert_eq!(eval_field(&r, &upper), Bson::String("THOMAS".into()));
        let obj = FieldExpr::Object(vec![("city".into(), FieldExpr::Path("addr.city".into()))]);
        assert_eq!(eval_field(&r, &obj), Bson::Document(doc! {"city": "Oslo"}));
    }

    #[test]
    fn int32_overflow_widens() {
        let r = Bson::Document(doc! {"n": i32::MAX});
        let e = FieldExpr::Arith {
            op: ArithOp::Add,
            lhs: Box::new(FieldExpr::Path("n".into())),
            rhs: Box::new(FieldExpr::Literal(Bson::Int32(1))),
        };
        assert_eq!(eval_field(&r, &e), Bson::Int64(i64::from(i32::MAX) + 1));
    }
}
