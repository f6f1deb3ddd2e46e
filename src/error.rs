//! Custom error types for the decoder.
//!
//! This module provides a centralized error handling system using the
//! `thiserror` crate to define structured, typed errors with clear messages.

use thiserror::Error;

/// Primary error type for the crate, covering all recoverable failure cases.
///
/// The decoder itself is a total function over well-formed inputs; errors are
/// only surfaced for invalid configuration at construction time and malformed
/// emission matrices at [`step`](crate::LexiconDecoder::step) time. An empty
/// beam is never an error: extraction simply returns empty results.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Errors from invalid decoder configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors from malformed input, such as emission dimension mismatches.
    #[error("Invalid input: {0}")]
    Input(String),

    /// Errors surfaced by a language-model adapter.
    #[error("Language model error: {0}")]
    LanguageModel(String),
}

/// Convenience type alias for Results with DecodeError.
pub type Result<T> = std::result::Result<T, DecodeError>;
