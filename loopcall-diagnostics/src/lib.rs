//! # loopcall diagnostics
//!
//! Logging setup and serializable reports of endpoint and stream state.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod call_report;
pub mod debug_logger;

// Re-export main types
pub use call_report::{CallReport, EndpointReport, SenderReport};
pub use debug_logger::DebugLogger;
