use std::fmt;

use http::Uri;
use regex::Regex;
use thiserror::Error;

/// Errors raised while compiling a single routing rule.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BackendError {
    /// The path pattern is not a valid regular expression.
    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The service host, port and scheme do not form a valid URI.
    #[error("invalid backend target '{scheme}://{authority}': {reason}")]
    InvalidTarget {
        scheme: String,
        authority: String,
        reason: String,
    },
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// One compiled routing rule: an optional path pattern and the backend it
/// points at.
///
/// The pattern is compiled once when the routing table is built; request
/// handling only ever runs [`BackendMatcher::matches`].
#[derive(Debug, Clone)]
pub struct BackendMatcher {
    path: Option<Regex>,
    target: Uri,
}

impl BackendMatcher {
    /// Compile a rule.
    ///
    /// # Arguments
    /// * `scheme` - Upstream scheme, lower-cased; empty means `http`
    /// * `path` - Regular expression searched in the request path; empty matches all
    /// * `host` - Service host name
    /// * `port` - Service port
    pub fn new(scheme: &str, path: &str, host: &str, port: u16) -> BackendResult<Self> {
        let scheme = if scheme.is_empty() {
            "http".to_string()
        } else {
            scheme.to_lowercase()
        };
        let authority = format!("{host}:{port}");

        let target = Uri::builder()
            .scheme(scheme.as_str())
            .authority(authority.as_str())
            .path_and_query("/")
            .build()
            .map_err(|e| BackendError::InvalidTarget {
                scheme: scheme.clone(),
                authority: authority.clone(),
                reason: e.to_string(),
            })?;

        let path = if path.is_empty() {
            None
        } else {
            Some(Regex::new(path).map_err(|source| BackendError::InvalidPattern {
                pattern: path.to_string(),
                source,
            })?)
        };

        Ok(Self { path, target })
    }

    /// True when the rule has no pattern or the pattern is found anywhere in
    /// `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.path.as_ref().is_none_or(|re| re.is_match(path))
    }

    /// Backend URL (scheme and authority, root path).
    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn scheme(&self) -> &str {
        self.target.scheme_str().unwrap_or("http")
    }

    pub fn pattern(&self) -> Option<&str> {
        self.path.as_ref().map(Regex::as_str)
    }
}

impl fmt::Display for BackendMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(re) => write!(f, "{} -> {}", re.as_str(), self.target),
            None => write!(f, "* -> {}", self.target),
        }
    }
}
