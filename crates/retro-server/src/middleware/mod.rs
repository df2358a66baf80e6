pub mod identity;
pub mod rate_limit;

pub use identity::{require_identity, Caller};
pub use rate_limit::{write_limiter, RateLimiter};
