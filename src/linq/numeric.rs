use crate::expr::NumericKind;
use serde::de::DeserializeOwned;

/// Rust types a numeric aggregate can produce. The associated kind is the
/// tag the native aggregate is keyed by.
pub trait Numeric: DeserializeOwned + Send + 'static {
    const KIND: NumericKind;
    /// Result type of `average` over this type.
    type Average: DeserializeOwned + Send + 'static;
}

impl Numeric for i32 {
    const KIND: NumericKind = NumericKind::Int32;
    type Average = f64;
}

impl Numeric for i64 {
    const KIND: NumericKind = NumericKind::Int64;
    type Average = f64;
}

impl Numeric for f64 {
    const KIND: NumericKind = NumericKind::Double;
    type Average = f64;
}

impl Numeric for f32 {
    const KIND: NumericKind = NumericKind::Double;
    type Average = f32;
}
