use brine_flat_schema::{BuilderError, EncodeError, ReadError, SchemaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}, column {column}: {msg}")]
    ParseError {
        msg:    String,
        line:   usize,
        column: usize,
    },

    #[error("Verifier error: {0}")]
    VerifierError(String),

    #[error("Include error: {0}")]
    IncludeError(String),

    #[error("Schema decode error: {0}")]
    DecodeError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Value(#[from] EncodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
