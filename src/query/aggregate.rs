//! Numeric and ordering aggregates over a row sequence.
//!
//! `Null` values are skipped. Sums are checked in the width named by the
//! result kind; integral averages widen to `Double`.

use crate::errors::DbError;
use crate::expr::{Comparer, NumericKind};
use bson::Bson;
use std::cmp::Ordering;

use super::eval::{as_f64_num, as_i64_num, compare_bson};

fn non_null(values: impl IntoIterator<Item = Bson>) -> impl Iterator<Item = Bson> {
    values.into_iter().filter(|v| !matches!(v, Bson::Null))
}

fn expect_int(v: &Bson, op: &'static str) -> Result<i64, DbError> {
    match v {
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => {
            // 2^63; `as` would saturate outside [-2^63, 2^63)
            const BOUND: f64 = 9_223_372_036_854_775_808.0;
            if !(-BOUND..BOUND).contains(f) {
                return Err(DbError::Overflow(op));
            }
            #[allow(clippy::cast_possible_truncation)]
            let i = *f as i64;
            Ok(i)
        }
        _ => as_i64_num(v)
            .ok_or_else(|| DbError::QueryError(format!("{op} expects integral values, found {v}"))),
    }
}

fn expect_f64(v: &Bson, op: &'static str) -> Result<f64, DbError> {
    match v {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => Ok(as_f64_num(v)),
        _ => Err(DbError::QueryError(format!("{op} expects numeric values, found {v}"))),
    }
}

/// # Errors
/// Fails on non-numeric input or when the sum overflows `kind`.
pub fn sum(values: impl IntoIterator<Item = Bson>, kind: NumericKind) -> Result<Bson, DbError> {
    match kind {
        NumericKind::Int32 => {
            let mut acc: i32 = 0;
            for v in non_null(values) {
                let n = i32::try_from(expect_int(&v, "sum")?).map_err(|_| DbError::Overflow("sum"))?;
                acc = acc.checked_add(n).ok_or(DbError::Overflow("sum"))?;
            }
            Ok(Bson::Int32(acc))
        }
        NumericKind::Int64 => {
            let mut acc: i64 = 0;
            for v in non_null(values) {
                acc = acc.checked_add(expect_int(&v, "sum")?).ok_or(DbError::Overflow("sum"))?;
            }
            Ok(Bson::Int64(acc))
        }
        NumericKind::Double => {
            let mut acc = 0.0;
            for v in non_null(values) {
                acc += expect_f64(&v, "sum")?;
            }
            Ok(Bson::Double(acc))
        }
    }
}

/// # Errors
/// Fails on non-numeric input, overflow, or an empty sequence.
pub fn average(values: impl IntoIterator<Item = Bson>, kind: NumericKind) -> Result<Bson, DbError> {
    let mut count: u32 = 0;
    let total = match kind {
        NumericKind::Int32 | NumericKind::Int64 => {
            let mut acc: i64 = 0;
            for v in non_null(values) {
                acc = acc.checked_add(expect_int(&v, "average")?).ok_or(DbError::Overflow("average"))?;
                count = count.saturating_add(1);
            }
            #[allow(clippy::cast_precision_loss)]
            let t = acc as f64;
            t
        }
        NumericKind::Double => {
            let mut acc = 0.0;
            for v in non_null(values) {
                acc += expect_f64(&v, "average")?;
                count = count.saturating_add(1);
            }
            acc
        }
    };
    if count == 0 {
        return Err(DbError::NoElements);
    }
    Ok(Bson::Double(total / f64::from(count)))
}

/// # Errors
/// Returns `NoElements` for an empty sequence.
pub fn min(values: impl IntoIterator<Item = Bson>, comparer: Option<&Comparer>) -> Result<Bson, DbError> {
    extreme(values, comparer, Ordering::Less)
}

/// # Errors
/// Returns `NoElements` for an empty sequence.
pub fn max(values: impl IntoIterator<Item = Bson>, comparer: Option<&Comparer>) -> Result<Bson, DbError> {
    extreme(values, comparer, Ordering::Greater)
}

fn extreme(
    values: impl IntoIterator<Item = Bson>,
    comparer: Option<&Comparer>,
    wanted: Ordering,
) -> Result<Bson, DbError> {
    let mut best: Option<Bson> = None;
    for v in non_null(values) {
        let replace = match &best {
            None => true,
            Some(b) => {
                let ord = comparer.map_or_else(|| compare_bson(&v, b), |c| c.compare(&v, b));
                ord == wanted
            }
        };
        if replace {
            best = Some(v);
        }
    }
    best.ok_or(DbError::NoElements)
}
