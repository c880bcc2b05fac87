//! Error taxonomy shared by every component.
//!
//! Nothing below the router is allowed to be fatal: request handlers
//! catch `ServerError` at the boundary and turn it into the
//! worst-case-but-still-usable HTTP response. This type exists so that
//! conversion, not panics, is the mechanism for doing that.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("module not found: {specifier}")]
    Resolve { specifier: String },

    #[error("compile failed for {file}: {message}")]
    Compile { file: String, message: String },

    #[error("no compiler host available for {file}")]
    CompilerNotFound { file: String },

    #[error("path too long: {0}")]
    PathTooLong(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServerError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn resolve(specifier: impl Into<String>) -> Self {
        Self::Resolve { specifier: specifier.into() }
    }

    pub fn compile(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile { file: file.into(), message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
