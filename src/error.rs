use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde_json::Value;

/// Error mapping produced by validators: error code to arbitrary detail.
///
/// Validation failure is data, never an error value — it travels through
/// `errors()` / `get_error()` / `has_error()`, not through `FormResult`.
pub type ValidationErrors = BTreeMap<String, Value>;

/// Builds a single-entry error mapping.
pub fn validation_error(code: impl Into<String>, detail: impl Into<Value>) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.insert(code.into(), detail.into());
    errors
}

/// Unions a sequence of validation results into one mapping: later entries
/// win on code collision, `None` when every input passed.
pub fn merge_validation_errors(
    results: impl IntoIterator<Item = Option<ValidationErrors>>,
) -> Option<ValidationErrors> {
    let mut merged = ValidationErrors::new();
    let mut failed = false;
    for result in results {
        if let Some(errors) = result {
            failed = true;
            merged.extend(errors);
        }
    }
    failed.then_some(merged)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    UnknownKey(String),
    MissingKey(String),
    LengthMismatch { expected: usize, actual: usize },
    KindMismatch(&'static str),
    Decode(String),
    Encode(String),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "control state lock poisoned while {context}")
            }
            FormError::UnknownKey(key) => write!(f, "no child control registered under {key:?}"),
            FormError::MissingKey(key) => write!(f, "value is missing an entry for child {key:?}"),
            FormError::LengthMismatch { expected, actual } => {
                write!(f, "value has {actual} entries but the control has {expected} children")
            }
            FormError::KindMismatch(operation) => {
                write!(f, "operation {operation} is not supported by this control kind")
            }
            FormError::Decode(error) => write!(f, "failed to decode control value: {error}"),
            FormError::Encode(error) => write!(f, "failed to encode control value: {error}"),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;
