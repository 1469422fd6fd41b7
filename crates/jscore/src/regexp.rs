//! `RegExp` objects

use std::fmt;
use std::ops::Deref;

use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::JscResult;
use crate::object::JscObject;
use crate::value::JscValue;

/// A handle to a JavaScript regular expression
#[derive(Clone)]
pub struct JscRegExp {
    object: JscObject,
    _token: InstanceToken,
}

impl JscRegExp {
    pub(crate) fn from_object(object: JscObject) -> Self {
        Self {
            object,
            _token: InstanceToken::new(InstanceKind::RegExp),
        }
    }

    /// The pattern text
    pub fn source(&self) -> Option<String> {
        self.object.get_property("source").ok()?.to_js_string()
    }

    /// The flags, e.g. `"gi"`
    pub fn flags(&self) -> Option<String> {
        self.object.get_property("flags").ok()?.to_js_string()
    }

    /// `regexp.test(input)`. Advances `lastIndex` for global and sticky
    /// expressions, as in script.
    pub fn test(&self, input: &str) -> JscResult<bool> {
        let input = self.context().string(input)?;
        Ok(self.object.invoke("test", &[input])?.to_bool())
    }

    pub fn as_object(&self) -> &JscObject {
        &self.object
    }

    pub fn into_object(self) -> JscObject {
        self.object
    }
}

impl Deref for JscRegExp {
    type Target = JscObject;

    fn deref(&self) -> &JscObject {
        &self.object
    }
}

impl From<JscRegExp> for JscValue {
    fn from(regexp: JscRegExp) -> Self {
        regexp.object.into_value()
    }
}

impl fmt::Debug for JscRegExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JscRegExp(/{}/{})",
            self.source().unwrap_or_default(),
            self.flags().unwrap_or_default()
        )
    }
}
