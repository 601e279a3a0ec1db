//! # limiquantix Common
//!
//! Shared utilities for the Parallels adapter components.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use limiquantix_common::{init_logging_with_format, LogFormat};
//!
//! init_logging_with_format(LogFormat::Json, "info").unwrap();
//! tracing::info!(domain = "web-01", "Domain loaded");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_with_format, LogFormat};
