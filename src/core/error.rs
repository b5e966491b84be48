use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or invariant-violating input
    Validation,
    /// Operation targets an id that does not exist
    NotFound,
    /// Disk, permission or lock failure
    Io,
    /// Data file is not a valid document
    Parse,
    /// A blocking storage task panicked or was cancelled
    Internal,
}

impl ErrorKind {
    /// Errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::Validation | ErrorKind::NotFound)
    }
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, context.into())
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    /// Human-readable message for error responses.
    pub fn detail(&self) -> &str {
        &self.context
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error {
            kind: ErrorKind::Internal,
            context: format!("storage task failed: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
