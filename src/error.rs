// Domain error taxonomy and HTTP API error conversion
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::error::Error as StdError;
use std::fmt;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Fixed, transport-independent classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    UnpermittedOperation,
    AlreadyExists,
    RepositoryError,
    QueryError,
    QueryDataNotFound,
    TransactionError,
    Unknown,
}

impl ErrorKind {
    /// HTTP status for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidParameter => 400,
            ErrorKind::UnpermittedOperation => 403,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::QueryDataNotFound => 404,
            ErrorKind::RepositoryError
            | ErrorKind::QueryError
            | ErrorKind::TransactionError
            | ErrorKind::Unknown => 500,
        }
    }

    /// Client-fault kinds are expected outcomes and are not logged server-side
    pub fn is_logged(&self) -> bool {
        !matches!(
            self,
            ErrorKind::InvalidParameter | ErrorKind::UnpermittedOperation | ErrorKind::AlreadyExists
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::UnpermittedOperation => "unpermitted operation",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::RepositoryError => "repository error",
            ErrorKind::QueryError => "query error",
            ErrorKind::QueryDataNotFound => "data not found",
            ErrorKind::TransactionError => "transaction error",
            ErrorKind::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-tagged error with an optional context message and a preserved cause chain.
///
/// Wrapping keeps the kind of the wrapped error, so callers branch on
/// [`DomainError::kind`] or [`DomainError::matches_kind`] and never on message text.
#[derive(Debug)]
pub struct DomainError {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<BoxError>,
}

impl DomainError {
    /// Build from an underlying cause
    pub fn new(kind: ErrorKind, cause: impl Into<BoxError>) -> Self {
        Self {
            kind,
            message: None,
            source: Some(cause.into()),
        }
    }

    /// Build from a message alone
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Add context to an existing domain error, keeping its kind
    pub fn wrap(context: impl Into<String>, err: DomainError) -> Self {
        Self {
            kind: err.kind,
            message: Some(context.into()),
            source: Some(Box::new(err)),
        }
    }

    /// Reclassify: a new error of `kind` whose cause is `err`
    pub fn caused_by(kind: ErrorKind, context: impl Into<String>, err: impl Into<BoxError>) -> Self {
        Self {
            kind,
            message: Some(context.into()),
            source: Some(err.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// True if this error or any domain error in its cause chain has `kind`
    pub fn matches_kind(&self, kind: ErrorKind) -> bool {
        matches_kind(self, kind)
    }

    /// The immediate cause, if any
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Message safe to show a client.
    ///
    /// Only messages given to [`DomainError::with_message`] are client-facing;
    /// wrap contexts and foreign causes stay in the logs. Falls back to the
    /// kind's description.
    pub fn client_message(&self) -> String {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        let mut found = None;
        while let Some(e) = current {
            if let Some(domain) = e.downcast_ref::<DomainError>() {
                if domain.kind == self.kind && domain.source.is_none() {
                    found = domain.message.as_deref();
                }
            }
            current = e.source();
        }
        found.unwrap_or(self.kind.as_str()).to_string()
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, &self.source) {
            (Some(message), Some(source)) => write!(f, "{}: {}", message, source),
            (Some(message), None) => f.write_str(message),
            (None, Some(source)) => write!(f, "{}", source),
            (None, None) => f.write_str(self.kind.as_str()),
        }
    }
}

impl StdError for DomainError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Walk a cause chain looking for a domain error of `kind`
pub fn matches_kind(err: &(dyn StdError + 'static), kind: ErrorKind) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(domain) = e.downcast_ref::<DomainError>() {
            if domain.kind == kind {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 429 Too Many Requests
    RateLimited { limit: u32, reset: String },

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::RateLimited { .. } => 429,
            ApiError::InternalServerError(_) => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::RateLimited { .. } => "Rate limit exceeded for this project",
            ApiError::InternalServerError(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited { .. } => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::RateLimited { limit, reset } => json!({
                "success": false,
                "error": self.message(),
                "code": self.error_code(),
                "limit": limit,
                "reset": reset,
            }),
            _ => json!({
                "success": false,
                "error": self.message(),
                "code": self.error_code(),
            }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let kind = err.kind();
        if kind.is_logged() {
            tracing::error!(kind = %kind, "{}", err);
        }

        match kind {
            ErrorKind::InvalidParameter => ApiError::bad_request(err.client_message()),
            ErrorKind::UnpermittedOperation => ApiError::forbidden(err.client_message()),
            ErrorKind::AlreadyExists => ApiError::conflict(err.client_message()),
            ErrorKind::QueryDataNotFound => ApiError::not_found(err.client_message()),
            // Don't expose internal failures to clients
            ErrorKind::RepositoryError
            | ErrorKind::QueryError
            | ErrorKind::TransactionError
            | ErrorKind::Unknown => {
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl StdError for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
