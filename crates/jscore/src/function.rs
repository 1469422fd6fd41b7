//! Native functions backed by Rust closures
//!
//! Each function is an instance of a per-context `NativeFunction` class
//! whose private data owns the closure. When the engine collects the
//! function object, the class finalizer hands the closure to a per-thread
//! queue; it is dropped at the next safe point, outside the collector.

use jscore_sys::*;
use std::any::Any;
use std::cell::RefCell;
use std::ffi::CString;
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::{Rc, Weak};
use tracing::{error, trace, warn};

use crate::context::JscContext;
use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::{JscError, JscResult};
use crate::object::{JscObject, PropertyAttributes};
use crate::value::JscValue;

pub(crate) type NativeCallback =
    Box<dyn Fn(&Rc<JscContext>, Option<&JscObject>, &[JscValue]) -> Result<JscValue, JscValue>>;

struct FunctionData {
    context: Weak<JscContext>,
    name: String,
    callback: NativeCallback,
}

thread_local! {
    /// Closures released by the finalizer, waiting to be dropped
    static FINALIZED: RefCell<Vec<Box<FunctionData>>> = const { RefCell::new(Vec::new()) };
}

/// A script-callable function implemented in Rust
///
/// Created with [`JscContext::create_function`]. When script calls it:
///
/// 1. the context's exception slot is saved and cleared,
/// 2. the closure runs with the context, `this` (if any) and the arguments,
/// 3. the slot is read and the saved value restored,
/// 4. `Err(value)`, or a value left in the slot, is thrown back into
///    script; otherwise the `Ok` value is returned.
///
/// A panic in the closure is caught and thrown as an `Error`.
///
/// The closure is owned by the engine object and references its context
/// weakly. It must not capture handles of its own context, or neither will
/// ever be released.
///
/// Handles of other contexts may be captured. They are released after the
/// function is collected, at the next evaluation, collection request,
/// function creation or context release on the same thread; never from
/// inside the collector.
#[derive(Clone)]
pub struct JscFunction {
    object: JscObject,
    _token: InstanceToken,
}

impl JscFunction {
    pub(crate) fn from_object(object: JscObject) -> Self {
        Self {
            object,
            _token: InstanceToken::new(InstanceKind::Function),
        }
    }

    /// The `name` the function was created with
    pub fn name(&self) -> Option<String> {
        self.object.get_property("name").ok()?.to_js_string()
    }

    /// Call the function from Rust
    pub fn call(&self, this: Option<&JscObject>, args: &[JscValue]) -> JscResult<JscValue> {
        self.object.call_as_function(this, args)
    }

    pub fn as_object(&self) -> &JscObject {
        &self.object
    }

    pub fn into_object(self) -> JscObject {
        self.object
    }
}

impl Deref for JscFunction {
    type Target = JscObject;

    fn deref(&self) -> &JscObject {
        &self.object
    }
}

impl From<JscFunction> for JscValue {
    fn from(function: JscFunction) -> Self {
        function.object.into_value()
    }
}

impl fmt::Debug for JscFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JscFunction({:?})", self.raw_object())
    }
}

pub(crate) fn create_class() -> JSClassRef {
    let definition = JSClassDefinition {
        className: c"NativeFunction".as_ptr(),
        callAsFunction: Some(call_native_function),
        finalize: Some(finalize_native_function),
        ..Default::default()
    };
    // SAFETY: definition is fully initialized and className is 'static
    unsafe { JSClassCreate(&definition) }
}

pub(crate) fn make_function(
    context: &Rc<JscContext>,
    class: JSClassRef,
    name: &str,
    callback: NativeCallback,
) -> JscResult<JscFunction> {
    let name_value = context.string(name)?;
    let data = Box::into_raw(Box::new(FunctionData {
        context: Rc::downgrade(context),
        name: name.to_string(),
        callback,
    }));

    // SAFETY: class was created by create_class; ownership of data passes
    // to the object and comes back in finalize_native_function
    let object = unsafe { JSObjectMake(context.raw(), class, data.cast()) };
    if object.is_null() {
        // SAFETY: the engine did not take the pointer
        drop(unsafe { Box::from_raw(data) });
        return Err(JscError::null_pointer("JSObjectMake"));
    }
    let object = JscObject::from_raw(context, object);

    // `name` first: Function.prototype has a read-only `name` that would
    // shadow the assignment
    object.set_property_with_attributes(
        "name",
        &name_value,
        PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_ENUM,
    )?;
    if let Some(function_ctor) = context.global_object().get_property("Function")?.as_object() {
        let prototype = function_ctor.get_property("prototype")?;
        if prototype.is_object() {
            object.set_prototype(&prototype)?;
        }
    }

    Ok(JscFunction::from_object(object))
}

unsafe extern "C" fn call_native_function(
    ctx: JSContextRef,
    function: JSObjectRef,
    this_object: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
    exception: *mut JSValueRef,
) -> JSValueRef {
    // SAFETY: private data is set by make_function and freed only by the
    // finalizer, which cannot run while the function is being called
    let data = unsafe { JSObjectGetPrivate(function) as *const FunctionData };
    if data.is_null() {
        // SAFETY: ctx and exception come from the engine
        return unsafe { throw_error(ctx, exception, "native function has no callback") };
    }
    // SAFETY: checked non-null above
    let data = unsafe { &*data };

    let Some(context) = data.context.upgrade() else {
        // SAFETY: ctx and exception come from the engine
        return unsafe {
            throw_error(ctx, exception, "native function called after its context was released")
        };
    };

    let args: Vec<JscValue> = (0..argument_count)
        // SAFETY: the engine passes argument_count valid values
        .map(|i| JscValue::from_raw(&context, unsafe { *arguments.add(i) }))
        .collect();
    let this = (!this_object.is_null()).then(|| JscObject::from_raw(&context, this_object));

    let frame = scopeguard::guard(context.enter_callback_frame(), |saved| {
        context.leave_callback_frame(saved)
    });
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        (data.callback)(&context, this.as_ref(), &args)
    }));
    let raised = context.exception();
    drop(frame);

    let (value, throw) = match outcome {
        Ok(Ok(value)) => match raised {
            Some(raised) => (raised, true),
            None => (value, false),
        },
        Ok(Err(value)) => (value, true),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(function = %data.name, %message, "native function panicked");
            // SAFETY: ctx and exception come from the engine
            let message = format!("native function '{}' panicked: {}", data.name, message);
            return unsafe { throw_error(ctx, exception, &message) };
        }
    };

    if !value.belongs_to(context.vm()) {
        const FOREIGN: &str = "native function produced a value from another virtual machine";
        warn!(function = %data.name, "{FOREIGN}");
        // SAFETY: ctx and exception come from the engine
        return unsafe { throw_error(ctx, exception, FOREIGN) };
    }

    if throw {
        if !exception.is_null() {
            // SAFETY: exception is the engine's out-parameter
            unsafe { *exception = value.raw() };
        }
        // SAFETY: ctx comes from the engine
        return unsafe { JSValueMakeUndefined(ctx) };
    }
    value.raw()
}

unsafe extern "C" fn finalize_native_function(object: JSObjectRef) {
    // SAFETY: private data was produced by Box::into_raw in make_function
    unsafe {
        let data = JSObjectGetPrivate(object) as *mut FunctionData;
        if data.is_null() {
            return;
        }
        JSObjectSetPrivate(object, ptr::null_mut());
        let data = Box::from_raw(data);
        trace!(function = %data.name, "finalized native function");
        defer_drop(data);
    }
}

/// Queue a collected function's closure instead of dropping it in the
/// collector, where its captured handles would call back into the engine
fn defer_drop(data: Box<FunctionData>) {
    let mut data = Some(data);
    let _ = FINALIZED.try_with(|queue| {
        if let Ok(mut queue) = queue.try_borrow_mut() {
            queue.extend(data.take());
        }
    });
    // Only left over while the thread exits, when the engine may be gone too
    mem::forget(data);
}

/// Drop closures queued by the finalizer
///
/// Called at points where no engine call is in progress on this thread.
pub(crate) fn drop_finalized() {
    loop {
        let Ok(pending) = FINALIZED.try_with(|queue| {
            queue.try_borrow_mut().map(|mut queue| mem::take(&mut *queue)).unwrap_or_default()
        }) else {
            return;
        };
        if pending.is_empty() {
            return;
        }
        trace!(count = pending.len(), "dropping finalized native functions");
        drop(pending);
    }
}

/// Store a fresh `Error(message)` in `exception` and return `undefined`
unsafe fn throw_error(ctx: JSContextRef, exception: *mut JSValueRef, message: &str) -> JSValueRef {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    // SAFETY: ctx and exception come from the engine; the string is released
    unsafe {
        let js_message = JSStringCreateWithUTF8CString(message.as_ptr());
        let args = [JSValueMakeString(ctx, js_message)];
        JSStringRelease(js_message);

        let error = JSObjectMakeError(ctx, args.len(), args.as_ptr(), ptr::null_mut());
        if !exception.is_null() && !error.is_null() {
            *exception = error as JSValueRef;
        }
        JSValueMakeUndefined(ctx)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install(ctx: &Rc<JscContext>, function: &JscFunction) {
        let name = function.name().unwrap();
        ctx.global_object().set_property(&name, function).unwrap();
    }

    #[test]
    fn test_native_function_returns_value() {
        let ctx = JscContext::create().unwrap();
        let add = ctx
            .create_function("add", |ctx, _, args| {
                let sum: f64 = args.iter().map(|arg| arg.to_number()).sum();
                Ok(ctx.number(sum))
            })
            .unwrap();
        install(&ctx, &add);

        let result = ctx.evaluate_script("add(1, 2, 3)").unwrap();
        assert_eq!(result.to_number(), 6.0);
        assert!(ctx.exception().is_none());
    }

    #[test]
    fn test_native_function_looks_like_a_function() {
        let ctx = JscContext::create().unwrap();
        let noop = ctx.create_function("noop", |ctx, _, _| Ok(ctx.undefined())).unwrap();
        install(&ctx, &noop);

        assert!(noop.is_function());
        assert_eq!(noop.name().as_deref(), Some("noop"));
        let result = ctx
            .evaluate_script("typeof noop + ':' + (noop instanceof Function) + ':' + noop.name")
            .unwrap();
        assert_eq!(result.to_js_string().as_deref(), Some("function:true:noop"));
    }

    #[test]
    fn test_call_from_rust() {
        let ctx = JscContext::create().unwrap();
        let double = ctx
            .create_function("double", |ctx, _, args| {
                Ok(ctx.number(args.first().map_or(0.0, |arg| arg.to_number()) * 2.0))
            })
            .unwrap();

        let result = double.call(None, &[ctx.number(21.0)]).unwrap();
        assert_eq!(result.to_number(), 42.0);
    }

    #[test]
    fn test_receiver_is_passed() {
        let ctx = JscContext::create().unwrap();
        let get_n = ctx
            .create_function("getN", |ctx, this, _| match this {
                Some(this) => Ok(this.get_property("n").unwrap()),
                None => Ok(ctx.undefined()),
            })
            .unwrap();
        install(&ctx, &get_n);

        let result = ctx.evaluate_script("({ n: 8, getN }).getN()").unwrap();
        assert_eq!(result.to_number(), 8.0);
    }

    #[test]
    fn test_error_is_catchable_in_script() {
        let ctx = JscContext::create().unwrap();
        let fail = ctx
            .create_function("fail", |ctx, _, _| {
                Err(ctx.create_error(&[ctx.string("from rust").unwrap()]).unwrap().into())
            })
            .unwrap();
        install(&ctx, &fail);

        let result = ctx
            .evaluate_script("try { fail(); 'no' } catch (e) { e.message }")
            .unwrap();
        assert_eq!(result.to_js_string().as_deref(), Some("from rust"));
        assert!(ctx.exception().is_none());
    }

    #[test]
    fn test_uncaught_error_reaches_handler() {
        let ctx = JscContext::create().unwrap();
        let fail = ctx
            .create_function("fail", |ctx, _, _| Err(ctx.string("boom").unwrap()))
            .unwrap();
        install(&ctx, &fail);

        assert!(ctx.evaluate_script("fail()").unwrap().is_undefined());
        let exception = ctx.exception().unwrap();
        assert_eq!(exception.to_js_string().as_deref(), Some("boom"));
    }

    #[test]
    fn test_slot_is_saved_and_restored() {
        let ctx = JscContext::create().unwrap();
        let outer = ctx.string("outer").unwrap();
        ctx.set_exception(Some(&outer)).unwrap();

        let peek = ctx
            .create_function("peek", |ctx, _, _| Ok(ctx.boolean(ctx.exception().is_none())))
            .unwrap();
        install(&ctx, &peek);

        let result = peek.call(None, &[]).unwrap();
        assert!(result.to_bool());
        assert_eq!(ctx.exception(), Some(outer));
    }

    #[test]
    fn test_exception_raised_inside_callback_is_rethrown() {
        let ctx = JscContext::create().unwrap();
        let nested = ctx
            .create_function("nested", |ctx, _, _| {
                ctx.evaluate_script("throw new TypeError('inner')").unwrap();
                Ok(ctx.number(1.0))
            })
            .unwrap();
        install(&ctx, &nested);

        let result = ctx
            .evaluate_script("try { nested() } catch (e) { e.name + ': ' + e.message }")
            .unwrap();
        assert_eq!(result.to_js_string().as_deref(), Some("TypeError: inner"));
    }

    #[test]
    fn test_panic_becomes_error() {
        let ctx = JscContext::create().unwrap();
        let explode = ctx
            .create_function("explode", |_, _, _| panic!("kaboom"))
            .unwrap();
        install(&ctx, &explode);

        let result = ctx
            .evaluate_script("try { explode() } catch (e) { e instanceof Error && e.message }")
            .unwrap();
        let message = result.to_js_string().unwrap();
        assert!(message.contains("kaboom"), "{message}");
    }

    #[test]
    fn test_foreign_return_value_is_rejected() {
        let other = JscContext::create().unwrap();
        let foreign = other.number(1.0);

        let ctx = JscContext::create().unwrap();
        let leak = ctx
            .create_function("leak", move |_, _, _| Ok(foreign.clone()))
            .unwrap();
        install(&ctx, &leak);

        let result = ctx
            .evaluate_script("try { leak(); 'no' } catch (e) { 'rejected' }")
            .unwrap();
        assert_eq!(result.to_js_string().as_deref(), Some("rejected"));
    }

    #[test]
    fn test_name_with_nul_rejected() {
        let ctx = JscContext::create().unwrap();
        let err = ctx
            .create_function("bad\0name", |ctx, _, _| Ok(ctx.undefined()))
            .unwrap_err();
        assert!(matches!(err, JscError::StringEncoding(_)));
    }

    #[test]
    fn test_finalized_closure_dropped_outside_collector() {
        let marker = Rc::new(());
        let captured = Rc::clone(&marker);
        defer_drop(Box::new(FunctionData {
            context: Weak::new(),
            name: "queued".to_string(),
            callback: Box::new(move |ctx, _, _| {
                let _ = &captured;
                Ok(ctx.undefined())
            }),
        }));
        assert_eq!(Rc::strong_count(&marker), 2);

        drop_finalized();
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
