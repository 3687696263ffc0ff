use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsyncscopeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("path escapes the configured root: {0}")]
    PathEscape(PathBuf),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("duplicate handle: {0} was already extracted")]
    DuplicateHandle(PathBuf),
}

pub type Result<T> = std::result::Result<T, AsyncscopeError>;
