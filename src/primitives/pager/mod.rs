#![forbid(unsafe_code)]

mod frame;
mod pool;

pub use frame::{BlockRef, PageLatch, PageMut, PageRef};
pub use pool::{BufferPool, BufferPoolOptions, PoolStats};
