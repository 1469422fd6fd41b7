//! Object handles: property access, calls and kind downcasts

use jscore_sys::*;
use std::fmt;
use std::ops::{BitOr, BitOrAssign, Deref};
use std::ptr;
use std::rc::Rc;

use crate::array::JscArray;
use crate::context::JscContext;
use crate::date::JscDate;
use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::{JscError, JscResult};
use crate::error_object::JscErrorObject;
use crate::regexp::JscRegExp;
use crate::string::{JscString, js_string_to_rust};
use crate::value::JscValue;

/// Attributes for [`JscObject::set_property_with_attributes`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropertyAttributes(JSPropertyAttributes);

impl PropertyAttributes {
    pub const NONE: Self = Self(K_JS_PROPERTY_ATTRIBUTE_NONE);
    pub const READ_ONLY: Self = Self(K_JS_PROPERTY_ATTRIBUTE_READ_ONLY);
    pub const DONT_ENUM: Self = Self(K_JS_PROPERTY_ATTRIBUTE_DONT_ENUM);
    pub const DONT_DELETE: Self = Self(K_JS_PROPERTY_ATTRIBUTE_DONT_DELETE);

    pub fn bits(self) -> JSPropertyAttributes {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PropertyAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PropertyAttributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A handle to an engine object
///
/// Derefs to [`JscValue`]. Every engine exception raised by these methods
/// is routed to the owning context's exception handler and the method
/// returns `undefined`/`false`; `Err` is reserved for local misuse
/// (foreign-machine values, names with interior NUL).
#[derive(Clone)]
pub struct JscObject {
    value: JscValue,
    _token: InstanceToken,
}

impl JscObject {
    /// Wrap a value the caller has verified to be an object
    pub(crate) fn from_value(value: JscValue) -> Self {
        Self {
            value,
            _token: InstanceToken::new(InstanceKind::Object),
        }
    }

    pub(crate) fn from_raw(context: &Rc<JscContext>, object: JSObjectRef) -> Self {
        Self::from_value(JscValue::from_raw(context, object as JSValueRef))
    }

    /// The raw object reference
    pub fn raw_object(&self) -> JSObjectRef {
        self.value.raw() as JSObjectRef
    }

    /// The underlying value handle
    pub fn as_value(&self) -> &JscValue {
        &self.value
    }

    pub fn into_value(self) -> JscValue {
        self.value
    }

    pub fn get_property(&self, name: &str) -> JscResult<JscValue> {
        let name = JscString::new(name)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx, object and name are valid
        let value = unsafe {
            JSObjectGetProperty(self.ctx(), self.raw_object(), name.raw(), &mut exception)
        };
        Ok(self.context().value_or_notify(value, exception))
    }

    pub fn set_property(&self, name: &str, value: &JscValue) -> JscResult<()> {
        self.set_property_with_attributes(name, value, PropertyAttributes::NONE)
    }

    pub fn set_property_with_attributes(
        &self,
        name: &str,
        value: &JscValue,
        attributes: PropertyAttributes,
    ) -> JscResult<()> {
        self.context().ensure_same_vm(value, "property")?;
        let name = JscString::new(name)?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx, object, name and value are valid and share a machine
        unsafe {
            JSObjectSetProperty(
                self.ctx(),
                self.raw_object(),
                name.raw(),
                value.raw(),
                attributes.bits(),
                &mut exception,
            );
        }
        self.context().notify_exception(exception);
        Ok(())
    }

    /// `name in object`; never throws
    pub fn has_property(&self, name: &str) -> JscResult<bool> {
        let name = JscString::new(name)?;
        // SAFETY: ctx, object and name are valid
        Ok(unsafe { JSObjectHasProperty(self.ctx(), self.raw_object(), name.raw()) })
    }

    /// `delete object[name]`. False if the property is non-configurable or
    /// the deletion threw.
    pub fn delete_property(&self, name: &str) -> JscResult<bool> {
        let name = JscString::new(name)?;
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx, object and name are valid
        let deleted = unsafe {
            JSObjectDeleteProperty(self.ctx(), self.raw_object(), name.raw(), &mut exception)
        };
        if self.context().notify_exception(exception) {
            return Ok(false);
        }
        Ok(deleted)
    }

    pub fn get_at_index(&self, index: u32) -> JscValue {
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and object are valid
        let value = unsafe {
            JSObjectGetPropertyAtIndex(self.ctx(), self.raw_object(), index, &mut exception)
        };
        self.context().value_or_notify(value, exception)
    }

    pub fn set_at_index(&self, index: u32, value: &JscValue) -> JscResult<()> {
        self.context().ensure_same_vm(value, "indexed property")?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx, object and value are valid and share a machine
        unsafe {
            JSObjectSetPropertyAtIndex(
                self.ctx(),
                self.raw_object(),
                index,
                value.raw(),
                &mut exception,
            );
        }
        self.context().notify_exception(exception);
        Ok(())
    }

    /// Own and inherited enumerable property names
    pub fn property_names(&self) -> Vec<String> {
        // SAFETY: ctx and object are valid; the array is released below
        unsafe {
            let names = JSObjectCopyPropertyNames(self.ctx(), self.raw_object());
            if names.is_null() {
                return Vec::new();
            }
            let count = JSPropertyNameArrayGetCount(names);
            let result = (0..count)
                .map(|i| js_string_to_rust(JSPropertyNameArrayGetNameAtIndex(names, i)))
                .collect();
            JSPropertyNameArrayRelease(names);
            result
        }
    }

    pub fn prototype(&self) -> JscValue {
        // SAFETY: ctx and object are valid
        let proto = unsafe { JSObjectGetPrototype(self.ctx(), self.raw_object()) };
        JscValue::from_raw(self.context(), proto)
    }

    /// Set `[[Prototype]]`; `value` must be an object or `null`
    pub fn set_prototype(&self, value: &JscValue) -> JscResult<()> {
        self.context().ensure_same_vm(value, "prototype")?;
        if !value.is_object() && !value.is_null() {
            return Err(JscError::type_error("object or null", value.value_type().to_string()));
        }
        // SAFETY: ctx, object and value are valid and share a machine
        unsafe { JSObjectSetPrototype(self.ctx(), self.raw_object(), value.raw()) };
        Ok(())
    }

    pub fn is_constructor(&self) -> bool {
        // SAFETY: ctx and object are valid
        unsafe { JSObjectIsConstructor(self.ctx(), self.raw_object()) }
    }

    /// Call this object with `this` (or the global object when `None`)
    pub fn call_as_function(
        &self,
        this: Option<&JscObject>,
        args: &[JscValue],
    ) -> JscResult<JscValue> {
        if !self.is_function() {
            return Err(JscError::type_error("function", self.value_type().to_string()));
        }
        if let Some(this) = this {
            self.context().ensure_same_vm(this, "call receiver")?;
        }
        let raw_args = self.context().raw_arguments(args, "call argument")?;
        let this_obj = this.map_or(ptr::null_mut(), |o| o.raw_object());

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx, function, receiver and arguments are valid and share a machine
        let result = unsafe {
            JSObjectCallAsFunction(
                self.ctx(),
                self.raw_object(),
                this_obj,
                raw_args.len(),
                if raw_args.is_empty() {
                    ptr::null()
                } else {
                    raw_args.as_ptr()
                },
                &mut exception,
            )
        };
        Ok(self.context().value_or_notify(result, exception))
    }

    /// `new object(...args)`. `None` if construction threw.
    pub fn call_as_constructor(&self, args: &[JscValue]) -> JscResult<Option<JscObject>> {
        if !self.is_constructor() {
            return Err(JscError::type_error("constructor", self.value_type().to_string()));
        }
        let raw_args = self.context().raw_arguments(args, "constructor argument")?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx, constructor and arguments are valid and share a machine
        let object = unsafe {
            JSObjectCallAsConstructor(
                self.ctx(),
                self.raw_object(),
                raw_args.len(),
                if raw_args.is_empty() {
                    ptr::null()
                } else {
                    raw_args.as_ptr()
                },
                &mut exception,
            )
        };
        if self.context().notify_exception(exception) || object.is_null() {
            return Ok(None);
        }
        Ok(Some(JscObject::from_raw(self.context(), object)))
    }

    pub fn as_array(&self) -> Option<JscArray> {
        self.is_array().then(|| JscArray::from_object(self.clone()))
    }

    pub fn as_date(&self) -> Option<JscDate> {
        self.is_date().then(|| JscDate::from_object(self.clone()))
    }

    pub fn as_error(&self) -> Option<JscErrorObject> {
        self.is_error()
            .then(|| JscErrorObject::from_object(self.clone()))
    }

    pub fn as_regexp(&self) -> Option<JscRegExp> {
        self.is_regexp().then(|| JscRegExp::from_object(self.clone()))
    }

    /// Call the method `name` on this object
    pub(crate) fn invoke(&self, name: &str, args: &[JscValue]) -> JscResult<JscValue> {
        let method = self.get_property(name)?;
        match method.as_object() {
            Some(method) if method.is_function() => method.call_as_function(Some(self), args),
            _ => Err(JscError::type_error(
                format!("method {}", name),
                method.value_type().to_string(),
            )),
        }
    }
}

impl Deref for JscObject {
    type Target = JscValue;

    fn deref(&self) -> &JscValue {
        &self.value
    }
}

impl From<JscObject> for JscValue {
    fn from(object: JscObject) -> Self {
        object.into_value()
    }
}

impl PartialEq for JscObject {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Debug for JscObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JscObject({:?})", self.raw_object())
    }
}
