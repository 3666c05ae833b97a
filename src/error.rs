use thiserror::Error;

/// Errors surfaced by the analysis backend.
///
/// The backend is an external toolkit; every failure is terminal for the
/// request and mapped to an HTTP status by the server layer.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested image file (or template) does not exist
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// The toolkit rejected the request parameters
    #[error("invalid parameters: {message}")]
    InvalidInput { message: String },

    /// The toolkit ran but failed
    #[error("analysis failed: {message}")]
    Failed { message: String },

    /// The toolkit produced output this service could not interpret
    #[error("malformed backend response: {message}")]
    Decode { message: String },

    /// The toolkit process could not be spawned or communicated with
    #[error("backend i/o error: {0}")]
    Io(#[from] std::io::Error),
}
