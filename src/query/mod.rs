// Telemetry is a submodule of query
pub mod telemetry;

// Submodules for separation of concerns
pub mod aggregate;
mod async_query;
mod builder;
mod compile;
mod cursor;
mod eval;
mod include;
mod types;

// Public API re-exports
pub use async_query::{AsyncNativeQuery, AsyncSelectedQuery};
pub(crate) use async_query::run_blocking;
pub use builder::{NativeQuery, SelectedQuery};
pub use compile::{compile_path, compile_predicate, compile_selector};
pub use cursor::Cursor;
pub use eval::{bson_equal, compare_bson, eval_field, eval_filter, get_path};
pub use types::{ArithOp, CmpOp, FieldExpr, Filter, LogicOp, Order, ScalarFn, SortKey};
