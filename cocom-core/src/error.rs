//! Error types for Cocom enrichment.

use std::{error::Error, fmt, io};

/// Error type for Cocom core operations.
#[derive(Debug)]
pub enum CocomError {
    /// An underlying I/O error.
    Io(io::Error),
    /// A document could not be encoded or decoded as JSON.
    Json(serde_json::Error),
    /// A date string could not be parsed at all.
    InvalidDate(String),
    /// The document store rejected or failed a request.
    Store(String),
    /// A catch-all error with a message.
    Other(String),
}

impl fmt::Display for CocomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::InvalidDate(value) => write!(f, "invalid date: {value}"),
            Self::Store(message) => write!(f, "store error: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CocomError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CocomError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CocomError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Convenience result type for Cocom core.
pub type Result<T> = std::result::Result<T, CocomError>;

#[cfg(test)]
mod tests {
    use super::CocomError;
    use std::error::Error;
    use std::io;

    #[test]
    fn io_error_formats_message() {
        let error = CocomError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(format!("{error}"), "io error: boom");
        assert!(error.source().is_some());
    }

    #[test]
    fn store_and_date_errors_format_message() {
        let error = CocomError::Store("bulk rejected".to_string());
        assert_eq!(format!("{error}"), "store error: bulk rejected");

        let error = CocomError::InvalidDate("yesterday".to_string());
        assert_eq!(format!("{error}"), "invalid date: yesterday");
        assert!(error.source().is_none());
    }

    #[test]
    fn from_json_error_maps_variant() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: CocomError = parse_err.into();
        assert!(matches!(error, CocomError::Json(_)));
    }
}
