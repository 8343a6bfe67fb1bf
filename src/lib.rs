//! docgen fills DOCX templates with JSON data and serves the result over HTTP.
//! It provides the template loader, the placeholder binder and the axum
//! service that ties them together.

/// OOXML archive reading and writing
pub mod archive;

/// Placeholder binding: loops, conditional sections and value substitution
/// over the text parts of a document
pub mod binder;

/// Command-line interface module for the docgen service
pub mod cli;

/// Service configuration
/// Supports JSON and YAML formats (docgen.json, docgen.yml, docgen.yaml)
pub mod config;

pub mod constants;

/// Error types and handling for the docgen service
pub mod error;

/// Restricted placeholder expression language
pub mod expression;

/// Generation orchestration over a template loader
pub mod generator;

/// Template lookup and listing
pub mod loader;

pub mod logger;

/// Tokenizer for WordprocessingML parts
pub mod markup;

/// MiniJinja rendering of download file names
pub mod renderer;

/// Error to HTTP response translation
pub mod response;

/// axum router, handlers and serve loop
pub mod server;
