use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::security::SecurityError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found")]
    NotFound,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Too many requests")]
    TooManyRequests,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Token error: {0}")]
    Token(#[from] TokenError),
    #[error("Signature error: {0}")]
    Security(#[from] SecurityError),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) | ServerError::Security(_) => 400,
            ServerError::Unauthorized(_) | ServerError::Token(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound => 404,
            ServerError::Conflict(_) => 409,
            ServerError::ParseError(_) => 422,
            ServerError::ValidationError(_) => 422,
            ServerError::TooManyRequests => 429,
            ServerError::Database(DatabaseError::PoolExhausted { .. }) => 503,
            ServerError::IoError(_)
            | ServerError::InternalError(_)
            | ServerError::Database(_)
            | ServerError::Config(_) => 500,
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
