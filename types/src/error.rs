use thiserror::Error;

/// Error taxonomy for stake and settlement operations.
///
/// The classification matters more than the message: the payment job
/// worker only re-attempts `Transient` failures, and the HTTP layer maps
/// each class to a status code. Everything else is terminal until an
/// operator intervenes.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("transient: {0}")]
    Transient(String),
    #[error("settlement failure: {0}")]
    SettlementFailure(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether the payment job queue may automatically re-attempt the
    /// operation that produced this error. Only network/timeout failures
    /// qualify; an ambiguous outcome is re-attempted up to the attempt
    /// ceiling and then left for a human.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Stable classification label, stored in `payment_jobs.last_error`
    /// and returned in HTTP error bodies for operator triage.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Auth(_) => "auth_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Configuration(_) => "configuration_error",
            Self::InsufficientFunds(_) => "insufficient_funds",
            Self::Transient(_) => "transient_error",
            Self::SettlementFailure(_) => "settlement_failure",
        }
    }
}

/// Result type for stake and settlement operations.
pub type Result<T> = std::result::Result<T, Error>;
