//! Configuration types for the client.
//!
//! - [`PoolConfig`]: Connection pool limits and timeouts
//! - [`RetryPolicy`]: Retry behavior with exponential backoff

mod pool;
mod retry;

pub use pool::{PoolConfig, defaults as pool_defaults};
pub use retry::{ExponentialBackoff, RetryPolicy, defaults as retry_defaults};
