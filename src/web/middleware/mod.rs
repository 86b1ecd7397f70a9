//! Middleware for the web layer.

pub mod rate_limit;

pub use rate_limit::{mutation_rate_limit, RateLimitState};
