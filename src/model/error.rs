use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type AssetResult<T> = Result<T, AssetError>;

/// Stable tag callers branch on, independent of the backend in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    ConfigurationFailure,
    TransportFailure,
    Cancelled,
    InvalidArgument,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {subject}")]
    NotFound {
        subject: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("asset already exists: {subject}")]
    AlreadyExists {
        subject: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("store configuration failure: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("transport failure on '{subject}': {source}")]
    Transport {
        subject: String,
        #[source]
        source: BoxError,
    },

    #[error("operation on '{subject}' was cancelled")]
    Cancelled { subject: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AssetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssetError::NotFound { .. } => ErrorKind::NotFound,
            AssetError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            AssetError::Configuration { .. } => ErrorKind::ConfigurationFailure,
            AssetError::Transport { .. } => ErrorKind::TransportFailure,
            AssetError::Cancelled { .. } => ErrorKind::Cancelled,
            AssetError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    pub fn not_initialized() -> Self {
        AssetError::Configuration {
            message: "no connection established yet".to_string(),
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AssetError::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn transport(subject: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AssetError::Transport {
            subject: subject.into(),
            source: source.into(),
        }
    }

    /// Builds the error for a failure already classified by an adapter.
    ///
    /// `Cancelled` and `InvalidArgument` never come out of a classifier and
    /// fall back to a transport failure.
    pub fn classified(kind: ErrorKind, subject: impl Into<String>, source: impl Into<BoxError>) -> Self {
        let subject = subject.into();
        let source = source.into();

        match kind {
            ErrorKind::NotFound => AssetError::NotFound {
                subject,
                source: Some(source),
            },
            ErrorKind::AlreadyExists => AssetError::AlreadyExists {
                subject,
                source: Some(source),
            },
            ErrorKind::ConfigurationFailure => AssetError::Configuration {
                message: subject,
                source: Some(source),
            },
            _ => AssetError::Transport { subject, source },
        }
    }
}

/// Operation a provider failure happened in; classification depends on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOperation {
    Initialize,
    Upload,
    Download,
    Copy,
    Delete,
}

/// What an adapter does with a provider failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Succeed,
    Fail(ErrorKind),
}

/// Provider failure normalized at the SDK seam.
///
/// `status` is the HTTP status when the provider answered, `None` for
/// failures that never produced a response (DNS, TLS, credentials, ...).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderFailure {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ProviderFailure {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ProviderFailure {
            status: None,
            message: message.into(),
        }
    }
}
