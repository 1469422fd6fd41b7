//! Value handles with automatic GC protection

use jscore_sys::*;
use std::ffi::CString;
use std::fmt;
use std::ptr;
use std::rc::{Rc, Weak};

use crate::context::JscContext;
use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::{JscError, JscResult, ScriptException};
use crate::intrinsics::Intrinsic;
use crate::object::JscObject;
use crate::string::{JscString, js_string_to_rust};
use crate::vm::JscVirtualMachine;

/// Engine-level type of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JscValueType {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Symbol,
    BigInt,
    Unknown,
}

impl From<JSType> for JscValueType {
    fn from(ty: JSType) -> Self {
        match ty {
            K_JS_TYPE_UNDEFINED => Self::Undefined,
            K_JS_TYPE_NULL => Self::Null,
            K_JS_TYPE_BOOLEAN => Self::Boolean,
            K_JS_TYPE_NUMBER => Self::Number,
            K_JS_TYPE_STRING => Self::String,
            K_JS_TYPE_OBJECT => Self::Object,
            K_JS_TYPE_SYMBOL => Self::Symbol,
            K_JS_TYPE_BIGINT => Self::BigInt,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for JscValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A handle to a value living in the engine
///
/// Every handle keeps its [`JscContext`] alive and keeps the engine value
/// protected from garbage collection. Cloning shares the handle; the value
/// is unprotected once the last clone drops. Handles are only minted by a
/// context (evaluation, factories, property reads).
///
/// `!Send` and `!Sync`: values are bound to their context's thread.
#[derive(Clone)]
pub struct JscValue {
    inner: Rc<ValueInner>,
}

pub(crate) struct ValueInner {
    raw: JSValueRef,
    context: Rc<JscContext>,
    _token: InstanceToken,
}

impl JscValue {
    /// Wrap and protect a raw value. A null `raw` (what the C API returns
    /// after an exception) becomes `undefined`.
    pub(crate) fn from_raw(context: &Rc<JscContext>, raw: JSValueRef) -> Self {
        let ctx = context.raw();
        // SAFETY: ctx is a live context; raw is null or a value of its group
        let raw = unsafe {
            let raw = if raw.is_null() {
                JSValueMakeUndefined(ctx)
            } else {
                raw
            };
            JSValueProtect(ctx, raw);
            raw
        };

        Self {
            inner: Rc::new(ValueInner {
                raw,
                context: Rc::clone(context),
                _token: InstanceToken::new(InstanceKind::Value),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ValueInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ValueInner> {
        Rc::downgrade(&self.inner)
    }

    /// The raw value reference
    pub fn raw(&self) -> JSValueRef {
        self.inner.raw
    }

    /// The context that created this value
    pub fn context(&self) -> &Rc<JscContext> {
        &self.inner.context
    }

    /// The machine this value lives in
    pub fn virtual_machine(&self) -> JscVirtualMachine {
        self.inner.context.virtual_machine()
    }

    pub(crate) fn belongs_to(&self, vm: &JscVirtualMachine) -> bool {
        self.inner.context.vm() == vm
    }

    pub(crate) fn ctx(&self) -> JSContextRef {
        self.inner.context.raw()
    }

    pub fn value_type(&self) -> JscValueType {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueGetType(self.ctx(), self.raw()) }.into()
    }

    pub fn is_undefined(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsUndefined(self.ctx(), self.raw()) }
    }

    pub fn is_null(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsNull(self.ctx(), self.raw()) }
    }

    pub fn is_boolean(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsBoolean(self.ctx(), self.raw()) }
    }

    pub fn is_number(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsNumber(self.ctx(), self.raw()) }
    }

    pub fn is_string(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsString(self.ctx(), self.raw()) }
    }

    pub fn is_symbol(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsSymbol(self.ctx(), self.raw()) }
    }

    pub fn is_object(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsObject(self.ctx(), self.raw()) }
    }

    pub fn is_array(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsArray(self.ctx(), self.raw()) }
    }

    pub fn is_function(&self) -> bool {
        // SAFETY: only objects are passed to JSObjectIsFunction
        self.is_object() && unsafe { JSObjectIsFunction(self.ctx(), self.raw() as JSObjectRef) }
    }

    /// Engine `Date` check; holds for dates made by any context of the
    /// machine
    pub fn is_date(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueIsDate(self.ctx(), self.raw()) }
    }

    /// Has `[[ErrorData]]`, i.e. was built by an `Error` constructor of any
    /// context. An error whose `Symbol.toStringTag` was replaced reads as
    /// not an error.
    pub fn is_error(&self) -> bool {
        self.is_object() && self.context().check_intrinsic(Intrinsic::IsError, self)
    }

    /// Has `[[OriginalSource]]`, i.e. was built by a `RegExp` constructor of
    /// any context
    pub fn is_regexp(&self) -> bool {
        self.is_object() && self.context().check_intrinsic(Intrinsic::IsRegExp, self)
    }

    /// ToBoolean; never throws
    pub fn to_bool(&self) -> bool {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { JSValueToBoolean(self.ctx(), self.raw()) }
    }

    /// ToNumber. NaN if the conversion threw (the exception goes to the
    /// context's handler).
    pub fn to_number(&self) -> f64 {
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and value are valid while self is alive
        let number = unsafe { JSValueToNumber(self.ctx(), self.raw(), &mut exception) };
        if self.context().notify_exception(exception) {
            return f64::NAN;
        }
        number
    }

    /// ToString. `None` if the conversion threw (e.g. a Symbol, or a
    /// throwing `toString`); the exception goes to the context's handler.
    pub fn to_js_string(&self) -> Option<String> {
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and value are valid; the returned string is owned
        let js_str = unsafe {
            JscString::from_owned(JSValueToStringCopy(self.ctx(), self.raw(), &mut exception))
        };
        if self.context().notify_exception(exception) {
            return None;
        }
        js_str.map(|s| s.to_string())
    }

    /// JSON.stringify with `indent` spaces. `None` for values JSON cannot
    /// represent (`undefined`, functions) or when serialization threw.
    pub fn to_json(&self, indent: u32) -> Option<String> {
        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and value are valid; the returned string is owned
        let js_str = unsafe {
            JscString::from_owned(JSValueCreateJSONString(
                self.ctx(),
                self.raw(),
                indent,
                &mut exception,
            ))
        };
        if self.context().notify_exception(exception) {
            return None;
        }
        js_str.map(|s| s.to_string())
    }

    /// Deserialize into a Rust type via the engine's JSON serialization
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> JscResult<T> {
        let json = self.to_json(0).ok_or_else(|| {
            JscError::type_error("JSON-serializable value", self.value_type().to_string())
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// This value as an object handle, if it already is one
    pub fn as_object(&self) -> Option<JscObject> {
        self.is_object()
            .then(|| JscObject::from_value(self.clone()))
    }

    /// ToObject: boxes primitives. `None` for `null`/`undefined`, whose
    /// TypeError goes to the context's handler.
    pub fn to_object(&self) -> Option<JscObject> {
        if self.is_object() {
            return self.as_object();
        }

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and value are valid while self is alive
        let object = unsafe { JSValueToObject(self.ctx(), self.raw(), &mut exception) };
        if self.context().notify_exception(exception) || object.is_null() {
            return None;
        }
        Some(JscObject::from_raw(self.context(), object))
    }

    /// `===`; never throws
    pub fn strict_equals(&self, other: &JscValue) -> bool {
        if !other.belongs_to(self.context().vm()) {
            return false;
        }
        // SAFETY: both values live in the same machine
        unsafe { JSValueIsStrictEqual(self.ctx(), self.raw(), other.raw()) }
    }

    /// `==`. False if the comparison threw (the exception goes to the
    /// context's handler). Values from another machine are a local error.
    pub fn loose_equals(&self, other: &JscValue) -> JscResult<bool> {
        self.context().ensure_same_vm(other, "comparison")?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: both values live in the same machine
        let equal = unsafe { JSValueIsEqual(self.ctx(), self.raw(), other.raw(), &mut exception) };
        if self.context().notify_exception(exception) {
            return Ok(false);
        }
        Ok(equal)
    }

    /// `instanceof constructor`. False if the check threw.
    pub fn is_instance_of(&self, constructor: &JscObject) -> JscResult<bool> {
        self.context().ensure_same_vm(constructor, "instanceof")?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: both values live in the same machine
        let result = unsafe {
            JSValueIsInstanceOfConstructor(
                self.ctx(),
                self.raw(),
                constructor.raw_object(),
                &mut exception,
            )
        };
        if self.context().notify_exception(exception) {
            return Ok(false);
        }
        Ok(result)
    }

    /// Name, message, location and stack of this value seen as a thrown
    /// exception. Never routes further exceptions.
    pub fn exception_details(&self) -> ScriptException {
        // SAFETY: ctx and value are valid while self is alive
        unsafe { extract_exception(self.ctx(), self.raw()) }
    }
}

impl PartialEq for JscValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) || self.strict_equals(other)
    }
}

impl fmt::Debug for JscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: ctx and value are valid; conversion exceptions are dropped
        match unsafe { value_to_string(self.ctx(), self.raw()) } {
            Some(s) => write!(f, "JscValue({}: {})", self.value_type(), s),
            None => write!(f, "JscValue({}: <opaque>)", self.value_type()),
        }
    }
}

impl Drop for ValueInner {
    fn drop(&mut self) {
        // SAFETY: raw was protected in from_raw and the context is still alive
        unsafe { JSValueUnprotect(self.context.raw(), self.raw) };
    }
}

/// Extract name, message, location and stack from a thrown value
///
/// # Safety
/// `ctx` must be a valid context and `exception` a value of its group.
pub(crate) unsafe fn extract_exception(
    ctx: JSContextRef,
    exception: JSValueRef,
) -> ScriptException {
    // SAFETY: guaranteed by the caller
    unsafe {
        if !JSValueIsObject(ctx, exception) {
            // throw "string" / throw 42
            let message =
                value_to_string(ctx, exception).unwrap_or_else(|| "Unknown error".to_string());
            return ScriptException::new("Error", message);
        }

        let obj = exception as JSObjectRef;
        let name = get_string_property(ctx, obj, "name").unwrap_or_else(|| "Error".to_string());
        let message = get_string_property(ctx, obj, "message").unwrap_or_else(|| {
            value_to_string(ctx, exception).unwrap_or_else(|| "Unknown error".to_string())
        });

        // JSC reports sourceURL/line/column; other spellings are kept for
        // errors built by script
        ScriptException {
            name,
            message,
            file: get_string_property(ctx, obj, "sourceURL")
                .or_else(|| get_string_property(ctx, obj, "fileName")),
            line: get_number_property(ctx, obj, "line")
                .or_else(|| get_number_property(ctx, obj, "lineNumber"))
                .map(|n| n as u32),
            column: get_number_property(ctx, obj, "column")
                .or_else(|| get_number_property(ctx, obj, "columnNumber"))
                .map(|n| n as u32),
            stack: get_string_property(ctx, obj, "stack"),
        }
    }
}

unsafe fn get_property_raw(ctx: JSContextRef, obj: JSObjectRef, name: &str) -> Option<JSValueRef> {
    let prop_name = CString::new(name).ok()?;
    // SAFETY: ctx and obj are valid per caller contract
    unsafe {
        let js_name = JSStringCreateWithUTF8CString(prop_name.as_ptr());
        if js_name.is_null() {
            return None;
        }

        let mut exception: JSValueRef = ptr::null_mut();
        let value = JSObjectGetProperty(ctx, obj, js_name, &mut exception);
        JSStringRelease(js_name);

        (exception.is_null() && !value.is_null() && !JSValueIsUndefined(ctx, value))
            .then_some(value)
    }
}

/// String property of an object, ignoring exceptions
pub(crate) unsafe fn get_string_property(
    ctx: JSContextRef,
    obj: JSObjectRef,
    name: &str,
) -> Option<String> {
    // SAFETY: ctx and obj are valid per caller contract
    unsafe { get_property_raw(ctx, obj, name).and_then(|value| value_to_string(ctx, value)) }
}

/// Finite number property of an object, ignoring exceptions
pub(crate) unsafe fn get_number_property(
    ctx: JSContextRef,
    obj: JSObjectRef,
    name: &str,
) -> Option<f64> {
    // SAFETY: ctx and obj are valid per caller contract
    unsafe {
        let value = get_property_raw(ctx, obj, name)?;
        if !JSValueIsNumber(ctx, value) {
            return None;
        }
        let mut exception: JSValueRef = ptr::null_mut();
        let num = JSValueToNumber(ctx, value, &mut exception);
        (exception.is_null() && !num.is_nan()).then_some(num)
    }
}

/// ToString, ignoring exceptions
pub(crate) unsafe fn value_to_string(ctx: JSContextRef, value: JSValueRef) -> Option<String> {
    // SAFETY: ctx and value are valid per caller contract
    unsafe {
        let mut exception: JSValueRef = ptr::null_mut();
        let js_str = JSValueToStringCopy(ctx, value, &mut exception);

        if js_str.is_null() || !exception.is_null() {
            return None;
        }

        let result = js_string_to_rust(js_str);
        JSStringRelease(js_str);
        Some(result)
    }
}
