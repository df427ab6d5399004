//! Defines the error type used across the library.
//!
//! Verification paths deliberately avoid this type for "could not verify"
//! outcomes: an unresolvable DNS record or a refused SMTP connection is
//! reported as data (`unknown`, empty lists), not as an `AppError`.

use thiserror::Error;

/// A specialized `Result` type for library operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("Insufficient input: {0}")]
    InsufficientInput(String),

    #[error("DNS resolver error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert_and_display() {
        fn read_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/mailprobe.toml")?)
        }
        let err = read_missing().unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert!(err.to_string().starts_with("I/O error: "));

        let err = AppError::InvalidHostname("bad host".to_string());
        assert_eq!(err.to_string(), "Invalid hostname: bad host");
    }
}
