//! cropstat - multi-tenant daily crop-sales reporting core
//!
//! Regional submitters file one numeric report per day; reports are persisted
//! to SQLite and mirrored into an in-memory per-region aggregate. A daily
//! retention task trims reports older than the retention window and resets
//! the aggregate. Transport concerns (HTTP, auth, rendering) live outside
//! this crate and call in through [`service::ReportService`].

pub mod config;
pub mod models;
pub mod repo;
pub mod retention;
pub mod service;
pub mod stats;
