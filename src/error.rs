use serde_json::Value;
use thiserror::Error;

pub type ParseResult<T> = Result<T, SchemaParseError>;

/// Every failure raised while reading or assembling a protocol.
///
/// Variants carry the offending JSON fragment (or name) so the message alone
/// is enough to locate the problem in the source document.
#[derive(Error, Debug)]
pub enum SchemaParseError {
    #[error("No {field} specified: {json}")]
    MissingField { field: &'static str, json: Value },

    #[error("{what}: {json}")]
    Malformed { what: &'static str, json: Value },

    #[error("one-way can't have errors: {0}")]
    OneWayWithErrors(Value),

    #[error("One way response must be null: {0}")]
    OneWayResponseNotNull(Value),

    #[error("Undefined error: {0}")]
    UndefinedError(String),

    #[error("Not an error: {0}")]
    NotAnError(String),

    // Namespace consistency, raised by the type context.
    #[error("Can't redefine: {0}")]
    DuplicateName(String),

    #[error("Undefined name: {0}")]
    UndefinedName(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Can't overwrite property: {0}")]
    PropertyConflict(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaParseError {
    pub(crate) fn missing(field: &'static str, json: &Value) -> Self {
        SchemaParseError::MissingField {
            field,
            json: json.clone(),
        }
    }

    pub(crate) fn malformed(what: &'static str, json: &Value) -> Self {
        SchemaParseError::Malformed {
            what,
            json: json.clone(),
        }
    }
}
