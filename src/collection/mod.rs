mod async_handle;
mod core;
mod ops;

pub use async_handle::AsyncCollection;
pub use self::core::Collection;
