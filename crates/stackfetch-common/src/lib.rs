//! Stackfetch Common Library
//!
//! Error handling and logging shared by the stackfetch workspace members.
//!
//! # Example
//!
//! ```no_run
//! use stackfetch_common::logging::{init_logging, LogConfig};
//! use stackfetch_common::{Result, StackError};
//!
//! fn start() -> Result<()> {
//!     let config = LogConfig::from_env().map_err(|e| StackError::Config(e.to_string()))?;
//!     init_logging(&config).map_err(|e| StackError::Config(e.to_string()))?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, StackError};
