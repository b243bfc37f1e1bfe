use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to backend fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for proxying requests to backends
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Forward a request whose URI already points at the backend.
    ///
    /// # Arguments
    /// * `req` - The request, absolute-form URI, original headers
    ///
    /// # Returns
    /// The backend's response or an error; backend error statuses are
    /// returned as responses, not errors.
    async fn forward(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
