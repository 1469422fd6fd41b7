//! RAII wrapper for engine strings

use jscore_sys::*;
use std::ffi::{CString, c_char};
use std::fmt;
use std::marker::PhantomData;

use crate::error::{JscError, JscResult};

/// Owned `JSStringRef`, released on drop
///
/// `!Send` and `!Sync`: engine strings stay on the thread that made them.
pub struct JscString {
    raw: JSStringRef,
    _not_send: PhantomData<*mut ()>,
}

impl JscString {
    /// Create an engine string from a Rust string
    pub fn new(s: &str) -> JscResult<Self> {
        let c_str = CString::new(s)?;
        // SAFETY: c_str is a valid null-terminated UTF-8 buffer
        let raw = unsafe { JSStringCreateWithUTF8CString(c_str.as_ptr()) };
        if raw.is_null() {
            return Err(JscError::null_pointer("JSStringCreateWithUTF8CString"));
        }
        Ok(Self {
            raw,
            _not_send: PhantomData,
        })
    }

    /// Take ownership of a string the engine handed out with a +1 count
    /// (`JSValueToStringCopy`, `JSValueCreateJSONString`).
    ///
    /// # Safety
    /// `raw` must be a valid, owned `JSStringRef` or null.
    pub(crate) unsafe fn from_owned(raw: JSStringRef) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(Self {
                raw,
                _not_send: PhantomData,
            })
        }
    }

    pub fn raw(&self) -> JSStringRef {
        self.raw
    }

    /// Length in UTF-16 code units
    pub fn len(&self) -> usize {
        // SAFETY: self.raw is valid for the lifetime of self
        unsafe { JSStringGetLength(self.raw) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for JscString {
    fn drop(&mut self) {
        // SAFETY: self.raw is owned by this wrapper
        unsafe { JSStringRelease(self.raw) };
    }
}

impl PartialEq for JscString {
    fn eq(&self, other: &Self) -> bool {
        // SAFETY: both strings are valid
        unsafe { JSStringIsEqual(self.raw, other.raw) }
    }
}

impl fmt::Display for JscString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: self.raw is valid
        f.write_str(&unsafe { js_string_to_rust(self.raw) })
    }
}

impl fmt::Debug for JscString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JscString({:?})", self.to_string())
    }
}

/// Convert a `JSStringRef` to a Rust `String`, without releasing it
///
/// # Safety
/// `js_str` must be a valid `JSStringRef` or null.
pub unsafe fn js_string_to_rust(js_str: JSStringRef) -> String {
    if js_str.is_null() {
        return String::new();
    }

    // SAFETY: js_str is valid per caller contract
    unsafe {
        let max_size = JSStringGetMaximumUTF8CStringSize(js_str);
        let mut buffer = vec![0u8; max_size];
        let written = JSStringGetUTF8CString(js_str, buffer.as_mut_ptr() as *mut c_char, max_size);

        if written > 0 {
            // written includes the null terminator
            buffer.truncate(written - 1);
            String::from_utf8_lossy(&buffer).into_owned()
        } else {
            String::new()
        }
    }
}
