//! Error handling for the Aquila engine.
//!
//! This module defines the crate-wide error type and a Result alias.
//! Per-node transform failures are deliberately *not* represented here as a
//! rich taxonomy: a transform body is an opaque algorithm and its failures
//! are carried as [`anyhow::Error`] values, caught and logged at the node
//! boundary so a single node's failure never aborts a whole graph pass.

use thiserror::Error;

/// Main error type for Aquila operations.
#[derive(Error, Debug)]
pub enum AquilaError {
    /// A parameter lookup by name found nothing (throwing accessor flavor).
    #[error("Parameter not found: {0}")]
    ParamNotFound(String),

    /// A parameter lookup by index was out of bounds.
    #[error("Parameter index {index} out of bounds (node has {len})")]
    ParamIndexOutOfBounds { index: usize, len: usize },

    /// The named parameter exists but does not carry the Input capability.
    #[error("Not an input parameter: {0}")]
    NotAnInput(String),

    /// A node lookup by tree name found nothing.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The factory has no constructor registered under this type name.
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// An input binding was rejected because the source's kind is not
    /// accepted by the input.
    #[error("Incompatible binding: input '{input}' does not accept '{source_name}' of kind {kind}")]
    IncompatibleBinding {
        input: String,
        source_name: String,
        kind: String,
    },

    /// A value write did not match the parameter's declared kind.
    #[error("Kind mismatch writing '{param}': expected {expected}, got {found}")]
    KindMismatch {
        param: String,
        expected: String,
        found: String,
    },

    /// A node's transform body failed; the node's input was passed through.
    #[error("Transform error in {node}: {source}")]
    Transform {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    /// Errors related to script compilation or execution.
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to graph configuration loading/saving.
    #[error("Config error: {0}")]
    Config(String),

    /// A swap was requested while an owning stream was still processing.
    #[error("Cannot swap node '{0}': owning data stream is not paused")]
    SwapWhileRunning(String),

    /// A hot-swap handle no longer points at a live node.
    #[error("Detached node handle: {0}")]
    DetachedHandle(String),

    /// Channel communication with a stream thread failed.
    #[error("Channel disconnected")]
    ChannelDisconnected,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AquilaError>,
    },
}

impl AquilaError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AquilaError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error.
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        AquilaError::Script(err.to_string())
    }
}

/// Result type alias for Aquila operations.
pub type Result<T> = std::result::Result<T, AquilaError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AquilaError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AquilaError::from_rhai_error(e).with_context(f()))
    }
}
