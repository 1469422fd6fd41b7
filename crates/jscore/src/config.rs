//! Script evaluation options.

use crate::object::JscObject;

/// Options for [`JscContext::evaluate_script_with`](crate::JscContext::evaluate_script_with)
/// and [`JscContext::check_script_syntax_with`](crate::JscContext::check_script_syntax_with).
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Source URL reported in exceptions and stack traces.
    /// Default: none
    pub source_url: Option<String>,

    /// Line number of the script's first line.
    /// Default: 1
    pub starting_line: i32,

    /// `this` for the script's top level.
    /// Default: the global object
    pub this_object: Option<JscObject>,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            source_url: None,
            starting_line: 1,
            this_object: None,
        }
    }
}

impl ScriptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source URL.
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the starting line number.
    pub fn starting_line(mut self, line: i32) -> Self {
        self.starting_line = line;
        self
    }

    /// Evaluate with `object` as `this`.
    pub fn this_object(mut self, object: JscObject) -> Self {
        self.this_object = Some(object);
        self
    }
}
