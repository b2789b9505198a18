//! Error types for OpenStack operations.
//!
//! Errors fall into four groups: local validation (`MissingArgument`, `InvalidArgument`),
//! session and transport failures (`Authentication`, `Connection`, `ExpiredAuthToken`),
//! faults reported by the remote API ([`ApiError`]) and response decoding problems.

use std::fmt;
use thiserror::Error;

/// Main error type for OpenStack operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A required connection option was not supplied
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// A supplied option was malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The auth server rejected the credentials or returned an unusable answer
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Human-readable reason
        message: String,
        /// HTTP status returned by the auth server, if one was received
        status: Option<u16>,
    },

    /// The transport could not be opened or kept failing
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service kept answering 401 after a fresh token was obtained
    #[error("Authentication token expired: {0}")]
    ExpiredAuthToken(String),

    /// Fault reported by the remote API
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A response body could not be decoded
    #[error("Failed to parse response: {0}")]
    ResponseParse(String),

    /// Local configuration could not be turned into a working client
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Specialized result type for OpenStack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of fault named by the key of a JSON fault envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// `computeFault`
    ComputeFault,
    /// `serviceUnavailable`
    ServiceUnavailable,
    /// `unauthorized`
    Unauthorized,
    /// `badRequest`
    BadRequest,
    /// `overLimit`
    OverLimit,
    /// `badMediaType`
    BadMediaType,
    /// `badMethod`
    BadMethod,
    /// `itemNotFound`
    ItemNotFound,
    /// `buildInProgress`
    BuildInProgress,
    /// `serverCapacityUnavailable`
    ServerCapacityUnavailable,
    /// `backupOrResizeInProgress`
    BackupOrResizeInProgress,
    /// `resizeNotAllowed`
    ResizeNotAllowed,
    /// `notImplemented`, also raised locally when a capability is absent
    NotImplemented,
    /// `resourceStateConflict`
    ResourceStateConflict,
    /// `QuantumError`, returned by legacy networking deployments
    QuantumError,
    /// Anything that does not map to a known kind
    Other,
}

impl FaultKind {
    /// Returns the canonical kind identifier.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ComputeFault => "ComputeFault",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::Unauthorized => "Unauthorized",
            Self::BadRequest => "BadRequest",
            Self::OverLimit => "OverLimit",
            Self::BadMediaType => "BadMediaType",
            Self::BadMethod => "BadMethod",
            Self::ItemNotFound => "ItemNotFound",
            Self::BuildInProgress => "BuildInProgress",
            Self::ServerCapacityUnavailable => "ServerCapacityUnavailable",
            Self::BackupOrResizeInProgress => "BackupOrResizeInProgress",
            Self::ResizeNotAllowed => "ResizeNotAllowed",
            Self::NotImplemented => "NotImplemented",
            Self::ResourceStateConflict => "ResourceStateConflict",
            Self::QuantumError => "QuantumError",
            Self::Other => "Other",
        }
    }

    /// Maps a fault envelope key to a kind.
    ///
    /// The first letter is capitalised before lookup, so `itemNotFound` and
    /// `ItemNotFound` both resolve. Unknown keys yield `None`.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let mut chars = key.chars();
        let first = chars.next()?;
        let normalized: String = first.to_uppercase().chain(chars).collect();

        let kind = match normalized.as_str() {
            "ComputeFault" => Self::ComputeFault,
            "ServiceUnavailable" => Self::ServiceUnavailable,
            "Unauthorized" => Self::Unauthorized,
            "BadRequest" => Self::BadRequest,
            "OverLimit" => Self::OverLimit,
            "BadMediaType" => Self::BadMediaType,
            "BadMethod" => Self::BadMethod,
            "ItemNotFound" => Self::ItemNotFound,
            "BuildInProgress" => Self::BuildInProgress,
            "ServerCapacityUnavailable" => Self::ServerCapacityUnavailable,
            "BackupOrResizeInProgress" => Self::BackupOrResizeInProgress,
            "ResizeNotAllowed" => Self::ResizeNotAllowed,
            "NotImplemented" => Self::NotImplemented,
            "ResourceStateConflict" => Self::ResourceStateConflict,
            "QuantumError" => Self::QuantumError,
            "Other" => Self::Other,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fault returned by a remote OpenStack API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} (status {status}): {message}")]
pub struct ApiError {
    /// Classified fault kind
    pub kind: FaultKind,
    /// Message extracted from the fault envelope
    pub message: String,
    /// HTTP status code of the response
    pub status: u16,
    /// Raw response body, kept verbatim for diagnostics
    pub body: String,
}

impl ApiError {
    /// Create a new API error.
    #[must_use]
    pub fn new(
        kind: FaultKind,
        message: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
            body: body.into(),
        }
    }
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingArgument(_) => "MISSING_ARGUMENT",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::Connection(_) => "CONNECTION",
            Self::ExpiredAuthToken(_) => "EXPIRED_AUTH_TOKEN",
            Self::Api(err) => match err.kind {
                FaultKind::ComputeFault => "COMPUTE_FAULT",
                FaultKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
                FaultKind::Unauthorized => "UNAUTHORIZED",
                FaultKind::BadRequest => "BAD_REQUEST",
                FaultKind::OverLimit => "OVER_LIMIT",
                FaultKind::BadMediaType => "BAD_MEDIA_TYPE",
                FaultKind::BadMethod => "BAD_METHOD",
                FaultKind::ItemNotFound => "ITEM_NOT_FOUND",
                FaultKind::BuildInProgress => "BUILD_IN_PROGRESS",
                FaultKind::ServerCapacityUnavailable => "SERVER_CAPACITY_UNAVAILABLE",
                FaultKind::BackupOrResizeInProgress => "BACKUP_OR_RESIZE_IN_PROGRESS",
                FaultKind::ResizeNotAllowed => "RESIZE_NOT_ALLOWED",
                FaultKind::NotImplemented => "NOT_IMPLEMENTED",
                FaultKind::ResourceStateConflict => "RESOURCE_STATE_CONFLICT",
                FaultKind::QuantumError => "QUANTUM_ERROR",
                FaultKind::Other => "OTHER",
            },
            Self::ResponseParse(_) => "RESPONSE_PARSE",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP status associated with the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => Some(err.status),
            Self::Authentication { status, .. } => *status,
            Self::ExpiredAuthToken(_) => Some(401),
            _ => None,
        }
    }

    /// Raw response body of a remote fault.
    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Api(err) => Some(err.body.as_str()),
            _ => None,
        }
    }

    /// Fault kind of a remote fault.
    #[must_use]
    pub const fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::Api(err) => Some(err.kind),
            _ => None,
        }
    }

    /// Returns true when the remote API reported the item as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.fault_kind() == Some(FaultKind::ItemNotFound)
    }

    /// Returns true for local validation errors, which are never retried.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::MissingArgument(_) | Self::InvalidArgument(_))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseParse(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::MissingArgument("username".to_string()).error_code(),
            "MISSING_ARGUMENT"
        );
        assert_eq!(
            Error::InvalidArgument("auth_url".to_string()).error_code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            Error::Authentication {
                message: "denied".to_string(),
                status: Some(401)
            }
            .error_code(),
            "AUTHENTICATION"
        );
        assert_eq!(
            Error::Connection("reset".to_string()).error_code(),
            "CONNECTION"
        );
        assert_eq!(
            Error::ExpiredAuthToken("401".to_string()).error_code(),
            "EXPIRED_AUTH_TOKEN"
        );
        assert_eq!(
            Error::ResponseParse("eof".to_string()).error_code(),
            "RESPONSE_PARSE"
        );
        assert_eq!(
            Error::ConfigError("tls".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::from(ApiError::new(FaultKind::OverLimit, "slow down", 413, "")).error_code(),
            "OVER_LIMIT"
        );
    }

    #[test]
    fn test_fault_kind_from_key() {
        assert_eq!(
            FaultKind::from_key("itemNotFound"),
            Some(FaultKind::ItemNotFound)
        );
        assert_eq!(
            FaultKind::from_key("ComputeFault"),
            Some(FaultKind::ComputeFault)
        );
        assert_eq!(FaultKind::from_key("overLimit"), Some(FaultKind::OverLimit));
        assert_eq!(
            FaultKind::from_key("QuantumError"),
            Some(FaultKind::QuantumError)
        );
        assert_eq!(FaultKind::from_key("blahblah"), None);
        assert_eq!(FaultKind::from_key(""), None);
    }

    #[test]
    fn test_fault_kind_names_round_trip() {
        let kinds = [
            FaultKind::ComputeFault,
            FaultKind::ServiceUnavailable,
            FaultKind::Unauthorized,
            FaultKind::BadRequest,
            FaultKind::OverLimit,
            FaultKind::BadMediaType,
            FaultKind::BadMethod,
            FaultKind::ItemNotFound,
            FaultKind::BuildInProgress,
            FaultKind::ServerCapacityUnavailable,
            FaultKind::BackupOrResizeInProgress,
            FaultKind::ResizeNotAllowed,
            FaultKind::NotImplemented,
            FaultKind::ResourceStateConflict,
            FaultKind::QuantumError,
            FaultKind::Other,
        ];
        for kind in kinds {
            assert_eq!(FaultKind::from_key(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::Connection("Unable to connect to a.b.c".to_string());
        assert_eq!(err.to_string(), "Connection error: Unable to connect to a.b.c");

        let err = Error::from(ApiError::new(FaultKind::ItemNotFound, "gone", 404, "{}"));
        assert_eq!(err.to_string(), "ItemNotFound (status 404): gone");
    }

    #[test]
    fn test_api_error_accessors() {
        let err = Error::from(ApiError::new(
            FaultKind::ItemNotFound,
            "gone",
            404,
            r#"{"itemNotFound":{"message":"gone"}}"#,
        ));
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.response_body(),
            Some(r#"{"itemNotFound":{"message":"gone"}}"#)
        );
        assert_eq!(err.fault_kind(), Some(FaultKind::ItemNotFound));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_status_for_session_errors() {
        let err = Error::Authentication {
            message: "Authentication failed with response code 499".to_string(),
            status: Some(499),
        };
        assert_eq!(err.status(), Some(499));
        assert_eq!(Error::Connection("x".to_string()).status(), None);
        assert!(Error::MissingArgument("x".to_string()).is_validation());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("***").unwrap_err();
        let os_err: Error = err.into();
        assert!(matches!(os_err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let os_err: Error = err.into();
        assert!(matches!(os_err, Error::ResponseParse(_)));
    }

    #[test]
    fn test_error_clone_and_eq() {
        let err1 = Error::Connection("test".to_string());
        let err2 = err1.clone();
        let err3 = Error::Connection("other".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
