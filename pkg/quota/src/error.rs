use thiserror::Error;

/// Errors raised while parsing or validating quota data.
///
/// `Format` and `MissingRequiredField` are raised before anything is written;
/// `MaxLimitExceeded` is the admission-time rejection of a quota edit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuotaError {
    /// A quantity string could not be parsed.
    #[error("quantity '{input}' is invalid: {reason}")]
    Format { input: String, reason: String },

    /// A quota field required at this level is absent.
    #[error("{field} is required: {message}")]
    MissingRequiredField { field: String, message: String },

    /// A quota edit would push an aggregate above its parent limit.
    #[error("{field} {message}")]
    MaxLimitExceeded { field: String, message: String },

    /// A cluster overcommit label does not hold a number.
    #[error("invalid overcommit value {value:?} in label {label}")]
    InvalidOvercommit { label: String, value: String },

    /// A stored quota annotation is not valid JSON.
    #[error("invalid quota annotation: {0}")]
    InvalidAnnotation(String),
}

impl QuotaError {
    pub fn format(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn exceeded(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MaxLimitExceeded {
            field: field.into(),
            message: message.into(),
        }
    }
}
