//! Error handling for the docgen service.
//! Defines the error taxonomy and result alias used throughout the crate.

use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

/// Machine-readable kind of a placeholder failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderErrorCode {
    /// Expression resolved to nothing while the strict policy was active
    UndefinedValue,
    /// Expression text does not follow the accepted grammar
    InvalidExpression,
    /// `{` without a matching `}`
    UnclosedTag,
    /// `}` without a preceding `{`
    UnopenedTag,
    /// Loop opened but never closed
    UnclosedLoop,
    /// Loop closing tag without an open loop
    UnopenedLoop,
    /// Loop closed with a different name than it was opened with
    MismatchedLoop,
    /// Loop tags sit at different depths, so no region can be repeated safely
    UnbalancedLoop,
}

impl fmt::Display for PlaceholderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaceholderErrorCode::UndefinedValue => "undefined_value",
            PlaceholderErrorCode::InvalidExpression => "invalid_expression",
            PlaceholderErrorCode::UnclosedTag => "unclosed_tag",
            PlaceholderErrorCode::UnopenedTag => "unopened_tag",
            PlaceholderErrorCode::UnclosedLoop => "unclosed_loop",
            PlaceholderErrorCode::UnopenedLoop => "unopened_loop",
            PlaceholderErrorCode::MismatchedLoop => "mismatched_loop",
            PlaceholderErrorCode::UnbalancedLoop => "unbalanced_loop",
        };
        f.write_str(s)
    }
}

/// A single placeholder that could not be bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceholderError {
    /// Tag text as written in the template, without delimiters
    pub id: String,
    pub code: PlaceholderErrorCode,
    /// Archive part the tag lives in
    pub part: String,
    pub explanation: String,
}

impl PlaceholderError {
    pub fn new(
        id: impl Into<String>,
        code: PlaceholderErrorCode,
        part: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            code,
            part: part.into(),
            explanation: explanation.into(),
        }
    }
}

impl fmt::Display for PlaceholderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' in {}: {}", self.code, self.id, self.part, self.explanation)
    }
}

/// Custom error types for docgen operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Required request fields are missing or malformed
    #[error("Invalid input: {message}.")]
    InvalidInput {
        missing: Vec<String>,
        message: String,
    },

    /// Named template is absent from the templates directory
    #[error("Template '{name}' not found at '{path}'.")]
    TemplateNotFound { name: String, path: String },

    #[error("Template '{name}' is {size} bytes, limit is {limit} bytes.")]
    TemplateTooLarge { name: String, size: u64, limit: u64 },

    /// One or more placeholders failed to bind; collected, never fail-fast
    #[error("{} placeholder(s) could not be resolved.", .0.len())]
    PlaceholderResolution(Vec<PlaceholderError>),

    /// The template bytes are not a usable DOCX archive
    #[error("Archive error: {0}.")]
    Archive(String),

    #[error("Zip error: {0}.")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}.")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}.")]
    Config(String),

    #[error("Template rendering error: {0}.")]
    Minijinja(#[from] minijinja::Error),

    #[error("Internal error: {0}.")]
    Internal(String),
}

impl Error {
    /// Builds an `InvalidInput` error for a set of missing request fields.
    pub fn missing_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let missing: Vec<String> = fields.into_iter().map(Into::into).collect();
        let message = format!("missing required field(s): {}", missing.join(", "));
        Error::InvalidInput { missing, message }
    }

    /// Builds an `InvalidInput` error that is not about missing fields.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            missing: Vec::new(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results with docgen's Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - The Error to handle
///
/// # Behavior
/// Prints the error message to stderr and exits with status code 1
pub fn default_error_handler(err: anyhow::Error) {
    eprintln!("{err:#}");
    std::process::exit(1);
}
