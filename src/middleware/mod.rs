//! HTTP middleware: JWT guard, audit recording, rate limiting, security headers
//! and request validation.

pub mod audit;
pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;
pub mod validation;

pub use rate_limit::EndpointRateLimiter;
