//! Error types for field construction, evaluation and assignment.
use crate::field::FieldType;
use std::error::Error;
use std::fmt;

/// Failure outcomes of field operations.
///
/// Evaluation distinguishes the expected outcome of a field not being defined at the current
/// location ([`FieldError::NotDefined`]) from hard failures, and assignment distinguishes a field
/// type that can never be assigned to ([`FieldError::AssignmentNotSupported`]) from an assignment
/// that failed at the current location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Invalid arguments were supplied, e.g. malformed composite selectors or a value array
    /// which is too small. Nothing was created or modified.
    InvalidArgument(String),
    /// The field is not defined at the location held by the cache.
    NotDefined,
    /// The field type is not invertible.
    AssignmentNotSupported { field_type: FieldType },
    /// The field type supports assignment, but it failed at the current location.
    AssignmentFailed(String),
    /// Evaluation failed for reasons other than the field not being defined.
    EvaluationFailed(String),
    /// A field with the requested name already exists in the region.
    NameInUse(String),
}

impl FieldError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        FieldError::InvalidArgument(message.into())
    }

    /// Whether this is the "not defined at location" outcome rather than a failure.
    pub fn is_not_defined(&self) -> bool {
        matches!(self, FieldError::NotDefined)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::InvalidArgument(message) => write!(f, "Invalid argument: {}", message),
            FieldError::NotDefined => write!(f, "Field is not defined at location"),
            FieldError::AssignmentNotSupported { field_type } => {
                write!(f, "Assignment is not supported for {} fields", field_type)
            }
            FieldError::AssignmentFailed(message) => write!(f, "Assignment failed: {}", message),
            FieldError::EvaluationFailed(message) => write!(f, "Evaluation failed: {}", message),
            FieldError::NameInUse(name) => write!(f, "Field named \"{}\" already exists in region", name),
        }
    }
}

impl Error for FieldError {}

pub type FieldResult<T> = Result<T, FieldError>;
