//! Shared building blocks for the rtmon agent and server.
//!
//! - [`types`] holds the metric data model and the JSON wire record.
//! - [`retry`] is the retry-with-backoff combinator used around storage calls.
//! - [`shutdown`] wraps the `watch` channel every long-lived loop listens on.

pub mod retry;
pub mod shutdown;
pub mod types;

/// Request/response header carrying the hex HMAC-SHA256 of the body bytes.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Header the agent uses to announce its own address to the server.
pub const REAL_IP_HEADER: &str = "X-Real-IP";
