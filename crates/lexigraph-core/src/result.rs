//! Result type aliases for Lexigraph.

use crate::LexigraphError;

/// A specialized `Result` type for Lexigraph operations.
pub type LexigraphResult<T> = Result<T, LexigraphError>;
