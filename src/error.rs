use crate::engine::validation::{FieldError, ValidationErrors};
use crate::units::QuantityKind;
use thiserror::Error;

/// Errors returned by the engine. All of them are recoverable values that the
/// UI renders as a message; capping a dose is not an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unit '{unit}' is not registered for {kind}")]
    InvalidUnit { unit: String, kind: QuantityKind },

    #[error("invalid input: {0}")]
    InvalidInput(FieldError),

    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("unknown formula '{0}'")]
    UnknownFormula(String),

    #[error("conversion error: {0}")]
    Conversion(String),
}

impl EngineError {
    /// Field-level problems carried by this error, if any
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            EngineError::Validation(errors) => errors.as_slice(),
            EngineError::InvalidInput(error) => std::slice::from_ref(error),
            _ => &[],
        }
    }
}

impl From<ValidationErrors> for EngineError {
    fn from(errors: ValidationErrors) -> Self {
        EngineError::Validation(errors)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
