//! Engine functions captured at context creation
//!
//! Kind checks and `Date` accessors call these instead of looking methods
//! up on the object, so script cannot redirect them.

use jscore_sys::*;
use std::ptr;

use crate::error::{JscError, JscResult};
use crate::string::JscString;
use crate::value::extract_exception;

const INTRINSICS_JS: &str = include_str!("intrinsics.js");

/// Index into the table returned by `intrinsics.js`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intrinsic {
    IsError = 0,
    IsRegExp = 1,
    DateTime = 2,
    DateToIsoString = 3,
}

const COUNT: usize = 4;

/// Protected references to the captured functions
pub(crate) struct Intrinsics {
    functions: [JSObjectRef; COUNT],
}

impl Intrinsics {
    /// Evaluate the intrinsics table in `ctx`
    ///
    /// # Safety
    /// `ctx` must be a live context.
    pub(crate) unsafe fn install(ctx: JSContextRef) -> JscResult<Self> {
        let script = JscString::new(INTRINSICS_JS)?;
        let source_url = JscString::new("<jscore_intrinsics>")?;

        // SAFETY: ctx is live per caller contract; the table is protected
        // while its entries are read
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let table = JSEvaluateScript(
                ctx,
                script.raw(),
                ptr::null_mut(),
                source_url.raw(),
                1,
                &mut exception,
            );
            if !exception.is_null() {
                return Err(JscError::context_creation(format!(
                    "intrinsics failed to load: {}",
                    extract_exception(ctx, exception)
                )));
            }
            if table.is_null() || !JSValueIsObject(ctx, table) {
                return Err(JscError::context_creation("intrinsics table is not an object"));
            }

            JSValueProtect(ctx, table);
            let mut functions = [ptr::null_mut(); COUNT];
            let mut complete = true;
            for (index, slot) in functions.iter_mut().enumerate() {
                let mut exception: JSValueRef = ptr::null_mut();
                let function = JSObjectGetPropertyAtIndex(
                    ctx,
                    table as JSObjectRef,
                    index as u32,
                    &mut exception,
                );
                if !exception.is_null()
                    || function.is_null()
                    || !JSValueIsObject(ctx, function)
                    || !JSObjectIsFunction(ctx, function as JSObjectRef)
                {
                    complete = false;
                    break;
                }
                *slot = function as JSObjectRef;
            }

            if complete {
                for function in functions {
                    JSValueProtect(ctx, function as JSValueRef);
                }
            }
            JSValueUnprotect(ctx, table);

            if !complete {
                return Err(JscError::context_creation("intrinsics table is incomplete"));
            }
            Ok(Self { functions })
        }
    }

    pub(crate) fn get(&self, intrinsic: Intrinsic) -> JSObjectRef {
        self.functions[intrinsic as usize]
    }

    /// Unprotect every function
    ///
    /// # Safety
    /// `ctx` must be the context the table was installed in, still alive.
    pub(crate) unsafe fn release(&self, ctx: JSContextRef) {
        for function in self.functions {
            // SAFETY: protected once in install
            unsafe { JSValueUnprotect(ctx, function as JSValueRef) };
        }
    }
}

/// Call `function(argument)`, returning the result and the exception
/// out-parameter
///
/// # Safety
/// `ctx` must be live and `function` and `argument` must belong to its
/// machine.
pub(crate) unsafe fn call(
    ctx: JSContextRef,
    function: JSObjectRef,
    argument: JSValueRef,
) -> (JSValueRef, JSValueRef) {
    let args = [argument];
    let mut exception: JSValueRef = ptr::null_mut();
    // SAFETY: guaranteed by the caller
    let result = unsafe {
        JSObjectCallAsFunction(
            ctx,
            function,
            ptr::null_mut(),
            args.len(),
            args.as_ptr(),
            &mut exception,
        )
    };
    (result, exception)
}
