//! # Lexigraph Core
//!
//! Error types, validation helpers and telemetry setup shared by the
//! Lexigraph crates.

pub mod error;
pub mod result;
pub mod telemetry;
pub mod validation;

pub use error::*;
pub use result::*;
pub use telemetry::{init_telemetry, TelemetryConfig};
pub use validation::*;
