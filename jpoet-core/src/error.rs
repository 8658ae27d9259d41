//! Structured errors
//!
//! Every failure reachable from an evaluation carries a machine-readable code.
//! Import misses are kept apart from real IO failures because the compound
//! importer only falls through on the former.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Standard error codes (machine-readable)
pub mod codes {
    pub const MISSING_INPUT: &str = "MISSING_INPUT";
    pub const IMPORT: &str = "IMPORT";
    pub const PLUGIN: &str = "PLUGIN";
    pub const EVALUATION: &str = "EVALUATION";
    pub const OUTPUT: &str = "OUTPUT";
    pub const IO: &str = "IO";
    pub const JSON: &str = "JSON";
    pub const AGGREGATE: &str = "AGGREGATE";
}

// ========== Import Errors ==========

/// Failure to resolve an import
#[derive(Debug, Error)]
pub enum ImportError {
    /// No importer layer holds the requested path
    #[error("couldn't open import {path:?}: no match in provided file system")]
    NotFound { path: String },

    /// The memory importer has no entry under either lookup key
    #[error("import not available {path}")]
    NotAvailable { path: String },

    /// The path exists but could not be read
    #[error("couldn't open import {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ImportError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// True for the "absent" signals that let a compound importer move on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NotAvailable { .. })
    }
}

// ========== Native Function Errors ==========

/// Error returned by a native function. The message reaches the evaluated
/// program verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<String> for NativeError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for NativeError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for NativeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

// ========== Plugin Errors ==========

/// Failure while starting, calling or stopping a plugin process
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin path does not start with {prefix}: {path}")]
    InvalidName { prefix: &'static str, path: PathBuf },

    #[error("failed to start plugin {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("plugin {plugin} handshake failed: {message}")]
    Handshake { plugin: String, message: String },

    #[error("plugin {plugin} transport failed: {message}")]
    Transport { plugin: String, message: String },

    /// Error reported by the function inside the plugin, kept verbatim
    #[error("{message}")]
    Remote { message: String },

    #[error("failed to stop plugin {plugin}: {source}")]
    Kill {
        plugin: String,
        #[source]
        source: io::Error,
    },
}

impl From<PluginError> for NativeError {
    fn from(err: PluginError) -> Self {
        Self::new(err.to_string())
    }
}

// ========== Evaluation Errors ==========

/// Phase in which the evaluator failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// Lexing or parsing
    Static,
    /// Evaluation, including import and native function failures
    Runtime,
}

/// Source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Error produced by the evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl EvalError {
    pub fn parse(message: impl Into<String>, location: Location) -> Self {
        Self {
            kind: EvalErrorKind::Static,
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: EvalErrorKind::Runtime,
            message: message.into(),
            location: None,
        }
    }

    /// Builder: attach a location unless a more precise one is already set
    pub fn at(mut self, location: Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location);
        }
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EvalErrorKind::Static => write!(f, "STATIC ERROR: {}", self.message)?,
            EvalErrorKind::Runtime => write!(f, "RUNTIME ERROR: {}", self.message)?,
        }
        if let Some(ref location) = self.location {
            write!(f, "\n\t{}", location)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

// ========== Top-level Error ==========

/// Error returned by the evaluation pipeline
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing input")]
    MissingInput,

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error("expect string output, but got {found}")]
    NonStringOutput { found: &'static str },

    #[error("expect object when writing output to directory: {path}, but got {found}")]
    NonObjectOutput { path: PathBuf, found: &'static str },

    #[error("expect string when writing output to file: {path}, but got {found}")]
    NonStringLeaf { path: PathBuf, found: &'static str },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Every failure collected over one evaluation, teardown included
    #[error("failed to evaluate Jsonnet: {}", join_errors(.0))]
    Aggregate(Vec<Error>),
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingInput => codes::MISSING_INPUT,
            Error::Import(_) => codes::IMPORT,
            Error::Plugin(_) => codes::PLUGIN,
            Error::Evaluation(_) => codes::EVALUATION,
            Error::NonStringOutput { .. }
            | Error::NonObjectOutput { .. }
            | Error::NonStringLeaf { .. } => codes::OUTPUT,
            Error::Io { .. } => codes::IO,
            Error::Json(_) => codes::JSON,
            Error::Aggregate(_) => codes::AGGREGATE,
        }
    }

    /// The individual causes; a non-aggregate error is its own single cause.
    pub fn causes(&self) -> &[Error] {
        match self {
            Error::Aggregate(errs) => errs,
            other => std::slice::from_ref(other),
        }
    }
}

fn join_errors(errs: &[Error]) -> String {
    match errs {
        [single] => single.to_string(),
        many => {
            let parts: Vec<String> = many.iter().map(|e| e.to_string()).collect();
            format!("[{}]", parts.join("; "))
        }
    }
}

/// Result alias used across the workspace
pub type Result<T, E = Error> = std::result::Result<T, E>;
