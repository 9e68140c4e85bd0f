//! Translation of deferred query expressions into native store queries.
//!
//! Flow per execution: [`QueryProvider`] acquires a fresh native handle,
//! [`assemble`] applies the extracted phases to it, and the dispatch layer
//! runs the single terminal named by the outermost call.

mod assembler;
mod async_ext;
mod dispatch;
mod extract;
mod numeric;
mod provider;
mod queryable;

pub use assembler::{Assembled, QueryBuilder, Stage, assemble};
pub use dispatch::{QueryOutput, Rows, Terminal, dispatch_async, dispatch_sync, terminal_of};
pub use numeric::Numeric;
pub use provider::{QueryProvider, QuerySource};
pub use queryable::{AsQueryable, QueryIter, Queryable};
