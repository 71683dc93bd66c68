use thiserror::Error;

/// Errors raised while normalizing and classifying annotation data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AecgError {
    /// A voltage or time unit outside the recognized set.
    #[error("unknown {quantity} unit '{unit}'")]
    UnknownUnit { unit: String, quantity: &'static str },
    /// An HL7 timestamp that cannot be mapped onto a calendar date and time.
    #[error("malformed HL7 datetime '{value}': {reason}")]
    DateTimeFormat { value: String, reason: String },
    /// None of the wave-component rules yields a label for the boundary.
    #[error("cannot classify {codes} ({slot} boundary): {reason}")]
    AmbiguousClassification {
        codes: String,
        slot: &'static str,
        reason: String,
    },
    /// A RELATIVE boundary whose value is not numeric.
    #[error("'{0}' is not a numeric time value")]
    InvalidNumber(String),
}

impl AecgError {
    pub(crate) fn datetime(value: &str, reason: impl Into<String>) -> Self {
        AecgError::DateTimeFormat {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AecgError>;
