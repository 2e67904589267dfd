use std::{fmt, io};

/// Crate-wide `Result` type using [`TakeoutError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, TakeoutError>;

/// Top-level error type for takeout operations.
#[derive(Debug)]
pub enum TakeoutError {
    /// Errors raised by the remote backend or the media downloader.
    Remote(RemoteError),

    /// Export engine and serialization errors.
    Export(ExportError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// JSON encoding/decoding errors.
    Json(serde_json::Error),

    /// The run was cancelled before the operation could complete.
    Cancelled,

    /// Generic error with a free-form message.
    Generic(String),
}

/// Errors coming back through the remote ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The backend answered the call with an error.
    Rpc { code: i32, text: String },

    /// The response variant does not match the request.
    UnexpectedResponse {
        expected: &'static str,
        found: &'static str,
    },

    /// No takeout session could be opened or the session is gone.
    SessionUnavailable(String),

    /// A call or download did not finish in time.
    Timeout(String),

    /// The requested media has no downloadable representation.
    MediaUnavailable(String),
}

/// Export engine errors.
#[derive(Debug)]
pub enum ExportError {
    /// Output directory could not be created.
    DirectoryCreate { path: String, reason: String },

    /// Output file could not be written.
    Write { path: String, reason: String },

    /// Sub-streams were enqueued after every enumeration had closed.
    FanOutSealed,

    /// No categories were selected for the run.
    NothingSelected,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Anything else worth reporting about configuration.
    Generic(String),
}

impl RemoteError {
    /// Shorthand for a backend error reply.
    pub fn rpc(code: i32, text: impl Into<String>) -> Self {
        RemoteError::Rpc {
            code,
            text: text.into(),
        }
    }

    /// Whether the error came from the transport rather than the payload shape.
    pub fn is_transport(&self) -> bool {
        !matches!(self, RemoteError::UnexpectedResponse { .. })
    }
}

impl TakeoutError {
    /// Whether the error is an I/O failure of the serialization step.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            TakeoutError::Io(_)
                | TakeoutError::Export(ExportError::DirectoryCreate { .. })
                | TakeoutError::Export(ExportError::Write { .. })
        )
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for TakeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeoutError::Remote(e) => write!(f, "{e}"),
            TakeoutError::Export(e) => write!(f, "Export error: {e}"),
            TakeoutError::Config(e) => write!(f, "Configuration error: {e}"),
            TakeoutError::Io(e) => write!(f, "I/O error: {e}"),
            TakeoutError::Json(e) => write!(f, "JSON error: {e}"),
            TakeoutError::Cancelled => write!(f, "Export cancelled"),
            TakeoutError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Rpc { code, text } => write!(f, "{text} ({code})"),
            RemoteError::UnexpectedResponse { expected, found } => {
                write!(f, "Unexpected response: expected {expected}, got {found}")
            }
            RemoteError::SessionUnavailable(msg) => write!(f, "Takeout session unavailable: {msg}"),
            RemoteError::Timeout(what) => write!(f, "Timed out: {what}"),
            RemoteError::MediaUnavailable(what) => write!(f, "Media unavailable: {what}"),
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::DirectoryCreate { path, reason } => {
                write!(f, "Failed to create directory {path}: {reason}")
            }
            ExportError::Write { path, reason } => write!(f, "Failed to write {path}: {reason}"),
            ExportError::FanOutSealed => {
                write!(f, "Sub-streams enqueued after enumeration completed")
            }
            ExportError::NothingSelected => write!(f, "No export categories selected"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TakeoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TakeoutError::Io(e) => Some(e),
            TakeoutError::Json(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for RemoteError {}
impl std::error::Error for ExportError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to TakeoutError ========================= */

impl From<io::Error> for TakeoutError {
    fn from(err: io::Error) -> Self {
        TakeoutError::Io(err)
    }
}

impl From<serde_json::Error> for TakeoutError {
    fn from(err: serde_json::Error) -> Self {
        TakeoutError::Json(err)
    }
}

impl From<RemoteError> for TakeoutError {
    fn from(err: RemoteError) -> Self {
        TakeoutError::Remote(err)
    }
}

impl From<ExportError> for TakeoutError {
    fn from(err: ExportError) -> Self {
        TakeoutError::Export(err)
    }
}

impl From<ConfigError> for TakeoutError {
    fn from(err: ConfigError) -> Self {
        TakeoutError::Config(err)
    }
}

impl From<String> for TakeoutError {
    fn from(msg: String) -> Self {
        TakeoutError::Generic(msg)
    }
}

impl From<&str> for TakeoutError {
    fn from(msg: &str) -> Self {
        TakeoutError::Generic(msg.to_owned())
    }
}
