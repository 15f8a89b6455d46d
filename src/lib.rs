//! # Bookstock
//!
//! Backend for a book inventory: authenticated CRUD with soft delete, a
//! filterable/sortable/paginated listing, CSV export, cover image upload and an
//! audit trail of logins and mutations.
//!
//! ## Architecture
//!
//! - **Axum** for HTTP routing and middleware
//! - **SQLx** over SQLite for persistence
//! - **Tokio** as the async runtime
//! - **Serde** for the JSON API
//!
//! ## Core Components
//!
//! - [`listing`]: turns raw query parameters into filter, ordering and page window
//! - [`books`]: book persistence, listing execution and CSV rendering
//! - [`auth`]: password hashing, JWT issuing/verification, users
//! - [`audit`]: audit log entries
//! - [`uploads`]: image validation and storage
//! - [`routes`]: HTTP handlers and the router
//! - [`middleware`]: JWT guard, audit recording, rate limiting, headers, validation
//! - [`config`], [`db`], [`error`], [`metrics`], [`state`], [`types`]

pub mod audit;
pub mod auth;
pub mod books;
pub mod config;
pub mod db;
pub mod error;
pub mod listing;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod uploads;

#[cfg(test)]
mod tests;
