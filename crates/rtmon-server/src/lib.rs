//! The rtmon server: receives metric batches over HTTP and persists them.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod state;
