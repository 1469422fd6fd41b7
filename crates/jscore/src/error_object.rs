//! `Error` objects

use std::fmt;
use std::ops::Deref;

use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::ScriptException;
use crate::object::JscObject;
use crate::value::JscValue;

/// A handle to a JavaScript `Error` (or subclass) instance
#[derive(Clone)]
pub struct JscErrorObject {
    object: JscObject,
    _token: InstanceToken,
}

impl JscErrorObject {
    pub(crate) fn from_object(object: JscObject) -> Self {
        Self {
            object,
            _token: InstanceToken::new(InstanceKind::Error),
        }
    }

    pub fn name(&self) -> Option<String> {
        self.string_property("name")
    }

    pub fn message(&self) -> Option<String> {
        self.string_property("message")
    }

    pub fn stack(&self) -> Option<String> {
        self.string_property("stack")
    }

    /// Name, message, location and stack in one struct
    pub fn details(&self) -> ScriptException {
        self.object.exception_details()
    }

    fn string_property(&self, name: &str) -> Option<String> {
        let value = self.object.get_property(name).ok()?;
        if value.is_undefined() {
            return None;
        }
        value.to_js_string()
    }

    pub fn as_object(&self) -> &JscObject {
        &self.object
    }

    pub fn into_object(self) -> JscObject {
        self.object
    }
}

impl Deref for JscErrorObject {
    type Target = JscObject;

    fn deref(&self) -> &JscObject {
        &self.object
    }
}

impl From<JscErrorObject> for JscValue {
    fn from(error: JscErrorObject) -> Self {
        error.object.into_value()
    }
}

impl fmt::Debug for JscErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JscErrorObject({})", self.details())
    }
}

#[cfg(test)]
mod tests {
    use crate::JscContext;

    #[test]
    fn test_create_error() {
        let ctx = JscContext::create().unwrap();
        let error = ctx.create_error(&[ctx.string("bad input").unwrap()]).unwrap();
        assert!(error.is_error());
        assert_eq!(error.name().as_deref(), Some("Error"));
        assert_eq!(error.message().as_deref(), Some("bad input"));
    }

    #[test]
    fn test_error_without_message() {
        let ctx = JscContext::create().unwrap();
        let error = ctx.create_error(&[]).unwrap();
        assert_eq!(error.message().as_deref(), Some(""));
        assert_eq!(error.details().name, "Error");
    }

    #[test]
    fn test_subclass_downcast() {
        let ctx = JscContext::create().unwrap();
        let object = ctx
            .evaluate_script("new RangeError('out of range')")
            .unwrap()
            .as_object()
            .unwrap();
        let error = object.as_error().unwrap();
        assert_eq!(error.name().as_deref(), Some("RangeError"));
        assert!(error.stack().is_some());

        let details = error.details();
        assert!(details.to_string().starts_with("RangeError: out of range"));
    }
}
