//! Limiter error types

use thiserror::Error;

/// Errors that can occur when constructing a limiter
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
