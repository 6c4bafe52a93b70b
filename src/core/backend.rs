use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors related to backend operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BackendError {
    /// Error when URL is invalid
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// A type-safe representation of a backend host URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendUrl {
    /// The underlying URL as a string, without trailing slash
    url: String,
}

impl BackendUrl {
    /// Creates a new BackendUrl if the provided string is a valid URL
    ///
    /// # Arguments
    /// * `url` - The URL string to validate and wrap
    ///
    /// # Returns
    /// A result containing the BackendUrl or an error
    pub fn new(url: &str) -> BackendResult<Self> {
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(BackendError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {url}"
            )));
        }

        Ok(BackendUrl {
            url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the underlying URL as a string reference
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Absolute URI for a request path (and query) on this backend.
    /// Any base path on the host URL is kept in front of the request path.
    pub fn target_uri(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.url, path_and_query)
        } else {
            format!("{}/{}", self.url, path_and_query)
        }
    }
}

impl FromStr for BackendUrl {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendUrl::new(s)
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
