//! `Array` objects

use std::fmt;
use std::ops::Deref;

use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::JscResult;
use crate::object::JscObject;
use crate::value::JscValue;

/// A handle to a JavaScript array
#[derive(Clone)]
pub struct JscArray {
    object: JscObject,
    _token: InstanceToken,
}

impl JscArray {
    pub(crate) fn from_object(object: JscObject) -> Self {
        Self {
            object,
            _token: InstanceToken::new(InstanceKind::Array),
        }
    }

    /// `length`
    pub fn len(&self) -> u32 {
        self.object
            .get_property("length")
            .map_or(0, |length| length.to_number() as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`; `undefined` past the end
    pub fn get(&self, index: u32) -> JscValue {
        self.object.get_at_index(index)
    }

    pub fn set(&self, index: u32, value: &JscValue) -> JscResult<()> {
        self.object.set_at_index(index, value)
    }

    /// Append `value` and return the new length
    pub fn push(&self, value: &JscValue) -> JscResult<u32> {
        let index = self.len();
        self.object.set_at_index(index, value)?;
        Ok(self.len())
    }

    /// Handles to every element, holes read as `undefined`
    pub fn to_vec(&self) -> Vec<JscValue> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    pub fn as_object(&self) -> &JscObject {
        &self.object
    }

    pub fn into_object(self) -> JscObject {
        self.object
    }
}

impl Deref for JscArray {
    type Target = JscObject;

    fn deref(&self) -> &JscObject {
        &self.object
    }
}

impl From<JscArray> for JscValue {
    fn from(array: JscArray) -> Self {
        array.object.into_value()
    }
}

impl fmt::Debug for JscArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::JscContext;

    #[test]
    fn test_create_array() {
        let ctx = JscContext::create().unwrap();
        let array = ctx
            .create_array(&[ctx.number(1.0), ctx.string("two").unwrap()])
            .unwrap();
        assert!(array.is_array());
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(1).to_js_string().as_deref(), Some("two"));
        assert!(array.get(2).is_undefined());
    }

    #[test]
    fn test_empty_array() {
        let ctx = JscContext::create().unwrap();
        let array = ctx.create_array(&[]).unwrap();
        assert!(array.is_empty());
        assert!(array.to_vec().is_empty());
    }

    #[test]
    fn test_push_and_set() {
        let ctx = JscContext::create().unwrap();
        let array = ctx.create_array(&[]).unwrap();
        assert_eq!(array.push(&ctx.number(1.0)).unwrap(), 1);
        assert_eq!(array.push(&ctx.number(2.0)).unwrap(), 2);
        array.set(0, &ctx.number(10.0)).unwrap();

        let numbers: Vec<f64> = array.to_vec().iter().map(|v| v.to_number()).collect();
        assert_eq!(numbers, vec![10.0, 2.0]);
        assert_eq!(array.to_json(0).as_deref(), Some("[10,2]"));
    }

    #[test]
    fn test_script_array_downcast() {
        let ctx = JscContext::create().unwrap();
        let object = ctx.evaluate_script("[3, , 5]").unwrap().as_object().unwrap();
        let array = object.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert!(array.get(1).is_undefined());
    }

    #[test]
    fn test_foreign_element_rejected() {
        let a = JscContext::create().unwrap();
        let b = JscContext::create().unwrap();
        assert!(a.create_array(&[b.number(1.0)]).is_err());
    }
}
