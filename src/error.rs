// src/error.rs

use thiserror::Error;

/// Core error types for the depsolver service
///
/// Every failure crossing the solver boundary is classified into one of
/// these variants. The wire protocol reports `kind()` as the tag and the
/// `Display` rendering as the reason.
#[derive(Error, Debug)]
pub enum Error {
    /// Request failed structural validation
    #[error("{0}")]
    InvalidRequest(String),

    /// Generic configuration failure
    #[error("{0}")]
    Config(String),

    /// One or more package specs could not be marked for installation
    #[error("{0}")]
    Marking(String),

    /// Dependency resolution was infeasible
    #[error("{0}")]
    Depsolve(String),

    /// Repository metadata could not be read
    #[error("{0}")]
    Repo(String),

    /// A GPG key URL could not be resolved or fetched
    #[error("{0}")]
    GpgKeyRead(String),

    /// I/O errors outside the classified paths
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors outside the classified paths
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wire tag for this error class
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "InvalidRequest",
            Error::Config(_) => "Error",
            Error::Marking(_) => "MarkingErrors",
            Error::Depsolve(_) => "DepsolveError",
            Error::Repo(_) => "RepoError",
            Error::GpgKeyRead(_) => "GPGKeyReadError",
            Error::Io(_) => "IOError",
            Error::Http(_) => "HTTPError",
            Error::Json(_) => "JSONError",
        }
    }
}

/// Result type alias using the depsolver Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::InvalidRequest("x".into()).kind(), "InvalidRequest");
        assert_eq!(Error::Config("x".into()).kind(), "Error");
        assert_eq!(Error::Marking("x".into()).kind(), "MarkingErrors");
        assert_eq!(Error::Depsolve("x".into()).kind(), "DepsolveError");
        assert_eq!(Error::Repo("x".into()).kind(), "RepoError");
        assert_eq!(Error::GpgKeyRead("x".into()).kind(), "GPGKeyReadError");
    }

    #[test]
    fn test_reason_is_bare_message() {
        let err = Error::Config("No cache dir set".into());
        assert_eq!(err.to_string(), "No cache dir set");
    }
}
