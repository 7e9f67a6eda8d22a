//! Client error type.

use filemail_protocol::{ApiError, ErrorCategory, ErrorCode, ProtocolError};
use filemail_transfer::FileError;

/// Errors produced by the Filemail client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The service rejected credentials or the login token.
    #[error("authentication failed: {0}")]
    Auth(ApiError),

    /// An account operation was attempted without logging in.
    #[error("login required")]
    AuthRequired,

    /// The operation is not valid in the current state.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Caller input was rejected before anything was sent.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status without a decodable error payload.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Structured failure decoded from a response.
    #[error("remote error: {0}")]
    Remote(ApiError),

    /// One file of a multi-file upload failed. Earlier files stay sent.
    #[error("upload of {file} failed: {source}")]
    UploadFailed {
        file: String,
        #[source]
        source: Box<Error>,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("file error: {0}")]
    File(FileError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps a decoded failure, routing the 2000 range to [`Error::Auth`].
    pub fn from_api(err: ApiError) -> Self {
        match err.category() {
            ErrorCategory::Authentication => Error::Auth(err),
            _ => Error::Remote(err),
        }
    }

    /// The remote `errorcode`, when the failure came from the service.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Auth(e) | Error::Remote(e) => Some(e.error_code()),
            Error::UploadFailed { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Category of the remote error code, if there is one.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Error::AuthRequired => Some(ErrorCategory::Authentication),
            other => other.code().map(ErrorCode::category),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::UploadFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<FileError> for Error {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Cancelled => Error::Cancelled,
            other => Error::File(other),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Json(e) => Error::Json(e),
            other => Error::Protocol(other),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Io(std::io::Error::other(e))
    }
}
