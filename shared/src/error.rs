use thiserror::Error;

use crate::lifecycle::TransitionError;

/// Local precondition failures. These never reach the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },
    #[error("{field} is too long ({len} > {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("{action} is not permitted for this user")]
    NotPermitted { action: &'static str },
    #[error("a service author cannot be its client")]
    SelfAssignment,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Failures reported by the remote gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("gateway error: {0}")]
    Gateway(GatewayError),
}

impl AppError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AUTH_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Unavailable(_)))
    }

    /// Translation key of the toast shown for this error.
    #[must_use]
    pub const fn toast_key(&self) -> &'static str {
        match self {
            Self::Auth(_) => "toast_auth_failed",
            Self::NotFound { .. } => "toast_not_found",
            Self::Validation(ValidationError::NotSignedIn) => "toast_sign_in_required",
            Self::Validation(ValidationError::NotPermitted { .. } | ValidationError::SelfAssignment) => {
                "toast_not_permitted"
            }
            Self::Validation(_) => "toast_invalid_input",
            Self::Gateway(_) => "toast_action_failed",
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unauthorized(reason) => Self::Auth(reason),
            GatewayError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Gateway(other),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        Self::Validation(ValidationError::Transition(e))
    }
}

pub type AppResult<T> = Result<T, AppError>;
