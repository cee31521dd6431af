//! Unified error types for the dcfl workspace
//!
//! [`DcflError`] covers everything that can go wrong before an optimization
//! run starts: reading files, parsing instances, and validating instance
//! data. Algorithm crates wrap it in their own error
//! enums so `?` works across crate boundaries.
//!
//! # Example
//!
//! ```ignore
//! use dcfl_core::{DcflResult, Instance};
//!
//! fn load(path: &str) -> DcflResult<Instance> {
//!     let instance = Instance::from_json_path(path)?;
//!     instance.validate()?;
//!     Ok(instance)
//! }
//! ```

use thiserror::Error;

/// Unified error type for instance handling.
#[derive(Error, Debug)]
pub enum DcflError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Instance data validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Convenience type alias for Results using DcflError.
pub type DcflResult<T> = Result<T, DcflError>;

impl From<serde_json::Error> for DcflError {
    fn from(err: serde_json::Error) -> Self {
        DcflError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DcflError::Validation("population must be non-negative".into());
        assert!(err.to_string().contains("Validation error"));
        assert!(err.to_string().contains("population"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DcflError = io_err.into();
        assert!(matches!(err, DcflError::Io(_)));
    }

    #[test]
    fn test_json_error_is_parse() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: DcflError = json_err.into();
        assert!(matches!(err, DcflError::Parse(_)));
    }
}
