//! Error types for local API misuse
//!
//! Script exceptions are not errors here: they travel through the context's
//! exception property and handler. `JscError` only reports what the engine
//! cannot see, plus [`JscError::Script`] for callers that explicitly take an
//! exception out of the slot with `JscContext::take_exception`.

use std::fmt;

use thiserror::Error;

/// Result type alias for wrapper operations
pub type JscResult<T> = Result<T, JscError>;

#[derive(Debug, Error)]
pub enum JscError {
    /// The engine refused to create a context group or global context
    #[error("Context creation failed: {message}")]
    ContextCreation { message: String },

    /// A value was handed to a context living in another virtual machine
    #[error("Value belongs to a different virtual machine than the {operation} target")]
    ForeignVirtualMachine { operation: &'static str },

    /// A thrown JavaScript value, taken out of the exception slot
    #[error("{0}")]
    Script(ScriptException),

    /// Type mismatch on an operation that needs a specific kind
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// Null pointer returned from the C API
    #[error("Internal JSC error: {operation} returned null")]
    NullPointer { operation: String },

    /// Rust string that cannot cross into the engine (interior NUL)
    #[error("String encoding error: {0}")]
    StringEncoding(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JscError {
    pub fn context_creation(message: impl Into<String>) -> Self {
        Self::ContextCreation {
            message: message.into(),
        }
    }

    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn null_pointer(operation: impl Into<String>) -> Self {
        Self::NullPointer {
            operation: operation.into(),
        }
    }

    /// True for errors that originate from a thrown JavaScript value
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::Script(_))
    }

    /// The thrown value's details, if this is a script error
    pub fn script_exception(&self) -> Option<&ScriptException> {
        match self {
            Self::Script(exception) => Some(exception),
            _ => None,
        }
    }
}

impl From<std::ffi::NulError> for JscError {
    fn from(err: std::ffi::NulError) -> Self {
        Self::StringEncoding(format!(
            "interior NUL byte at position {}",
            err.nul_position()
        ))
    }
}

/// Details extracted from a thrown JavaScript value
///
/// Error objects provide `name`, `message`, `stack` and the engine's source
/// location properties; primitive throws (`throw 42`) only have a message.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ScriptException {
    pub name: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub stack: Option<String>,
}

impl ScriptException {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Source location as `(file, line, column)`, if the engine reported one
    pub fn location(&self) -> Option<(Option<&str>, u32, Option<u32>)> {
        self.line.map(|line| (self.file.as_deref(), line, self.column))
    }
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => write!(f, " at {}:{}:{}", file, line, column),
            (Some(file), Some(line), None) => write!(f, " at {}:{}", file, line),
            (None, Some(line), Some(column)) => write!(f, " at line {}:{}", line, column),
            (None, Some(line), None) => write!(f, " at line {}", line),
            _ => Ok(()),
        }
    }
}
