//! HTTP API module.
//!
//! This module provides the HTTP server, its response types and the
//! progress log broadcaster shared with the pipeline.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{parse_delimiter, router, start_server, AppState, ServerConfig};
pub use types::*;
