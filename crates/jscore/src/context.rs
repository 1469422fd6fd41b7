//! Execution contexts
//!
//! A [`JscContext`] owns one engine global context inside a
//! [`JscVirtualMachine`]. Everything that reaches the engine goes through
//! it: script evaluation, value and object factories, and the exception
//! routing that every other handle relies on.
//!
//! Engine exceptions never come back as `Err`. Each wrapper call that sees
//! the C API's exception out-parameter set hands the thrown value to the
//! context's exception handler; the default handler stores it in the
//! exception slot, readable with [`JscContext::exception`].

use jscore_sys::*;
use parking_lot::Mutex;
use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::mem;
use std::ptr;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

use crate::array::JscArray;
use crate::config::ScriptOptions;
use crate::date::JscDate;
use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::error::{JscError, JscResult};
use crate::error_object::JscErrorObject;
use crate::function::{self, JscFunction, NativeCallback};
use crate::intrinsics::{self, Intrinsic, Intrinsics};
use crate::object::JscObject;
use crate::regexp::JscRegExp;
use crate::string::JscString;
use crate::value::{JscValue, ValueInner};
use crate::vm::JscVirtualMachine;

/// Global lock for context creation.
/// JSC global context setup is not fully thread-safe, so creation is
/// serialized across the process.
static CONTEXT_CREATION_LOCK: Mutex<()> = Mutex::new(());

/// Hook invoked with every uncaught exception raised through the wrapper
///
/// The handler receives the context as an argument; capturing an
/// `Rc<JscContext>` (or any value of it) inside the handler would keep the
/// context alive forever.
pub type ExceptionHandler = Rc<dyn Fn(&Rc<JscContext>, &JscValue)>;

type RawObjectMaker = unsafe extern "C" fn(
    JSContextRef,
    usize,
    *const JSValueRef,
    *mut JSValueRef,
) -> JSObjectRef;

/// The "last uncaught exception" slot
///
/// `value` is weak so the context never owns a value handle (values own
/// their context). `root` is a protected raw reference kept for exceptions
/// stored while routing an engine exception, so they outlive the call that
/// raised them.
#[derive(Default)]
pub(crate) struct ExceptionSlot {
    value: Weak<ValueInner>,
    root: Option<JSValueRef>,
}

/// State saved around a native callback
pub(crate) struct CallbackFrame {
    slot: ExceptionSlot,
    routing: bool,
}

/// A JavaScript execution context
///
/// Only obtainable as `Rc<JscContext>` from [`JscContext::create`] or
/// [`JscContext::create_in`]. Every value handed out holds a strong
/// reference back, so the engine context is released only after the last
/// value is gone.
pub struct JscContext {
    vm: JscVirtualMachine,
    ctx: JSGlobalContextRef,
    exception: RefCell<ExceptionSlot>,
    exception_handler: RefCell<Option<ExceptionHandler>>,
    function_class: OnceCell<JSClassRef>,
    intrinsics: Intrinsics,
    /// Set while the exception handler runs
    routing: Cell<bool>,
    _token: InstanceToken,
}

impl JscContext {
    /// Create a context in a fresh virtual machine
    pub fn create() -> JscResult<Rc<Self>> {
        let vm = JscVirtualMachine::new()?;
        Self::create_in(&vm)
    }

    /// Create a context in an existing virtual machine
    pub fn create_in(vm: &JscVirtualMachine) -> JscResult<Rc<Self>> {
        let ctx = {
            let _guard = CONTEXT_CREATION_LOCK.lock();
            // SAFETY: vm.raw() is a live context group; a null class gives
            // the default global object
            unsafe { JSGlobalContextCreateInGroup(vm.raw(), ptr::null_mut()) }
        };

        if ctx.is_null() {
            return Err(JscError::context_creation(
                "JSGlobalContextCreateInGroup returned null",
            ));
        }

        // SAFETY: ctx was just created and has run no script
        let intrinsics = match unsafe { Intrinsics::install(ctx) } {
            Ok(intrinsics) => intrinsics,
            Err(err) => {
                // SAFETY: ctx is released once, nothing else references it
                unsafe { JSGlobalContextRelease(ctx) };
                return Err(err);
            }
        };

        debug!(?ctx, group = ?vm.raw(), "created context");
        Ok(Rc::new(Self {
            vm: vm.clone(),
            ctx,
            exception: RefCell::new(ExceptionSlot::default()),
            exception_handler: RefCell::new(Some(default_exception_handler())),
            function_class: OnceCell::new(),
            intrinsics,
            routing: Cell::new(false),
            _token: InstanceToken::new(InstanceKind::Context),
        }))
    }

    /// Evaluate a script and return its completion value
    ///
    /// If the script throws, the exception goes to the exception handler
    /// and `undefined` is returned. `Err` only for script text that cannot
    /// be handed to the engine.
    pub fn evaluate_script(self: &Rc<Self>, script: &str) -> JscResult<JscValue> {
        self.evaluate_script_with(script, &ScriptOptions::default())
    }

    /// Evaluate a script with a source URL, starting line and `this`
    pub fn evaluate_script_with(
        self: &Rc<Self>,
        script: &str,
        options: &ScriptOptions,
    ) -> JscResult<JscValue> {
        let script = JscString::new(script)?;
        let source_url = options
            .source_url
            .as_deref()
            .map(JscString::new)
            .transpose()?;
        let this_object = match &options.this_object {
            Some(object) => {
                self.ensure_same_vm(object, "script receiver")?;
                object.raw_object()
            }
            None => ptr::null_mut(),
        };

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: context, script, url and receiver are valid for the call
        let result = unsafe {
            JSEvaluateScript(
                self.raw(),
                script.raw(),
                this_object,
                source_url.as_ref().map_or(ptr::null_mut(), |url| url.raw()),
                options.starting_line,
                &mut exception,
            )
        };

        let value = self.value_or_notify(result, exception);
        function::drop_finalized();
        Ok(value)
    }

    /// Parse without executing. A syntax error goes to the exception
    /// handler and `false` is returned.
    pub fn check_script_syntax(self: &Rc<Self>, script: &str) -> JscResult<bool> {
        self.check_script_syntax_with(script, &ScriptOptions::default())
    }

    /// [`check_script_syntax`](Self::check_script_syntax) with a source URL
    /// and starting line; `this_object` is ignored
    pub fn check_script_syntax_with(
        self: &Rc<Self>,
        script: &str,
        options: &ScriptOptions,
    ) -> JscResult<bool> {
        let script = JscString::new(script)?;
        let source_url = options
            .source_url
            .as_deref()
            .map(JscString::new)
            .transpose()?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: context, script and url are valid for the call
        let valid = unsafe {
            JSCheckScriptSyntax(
                self.raw(),
                script.raw(),
                source_url.as_ref().map_or(ptr::null_mut(), |url| url.raw()),
                options.starting_line,
                &mut exception,
            )
        };

        if self.notify_exception(exception) {
            return Ok(false);
        }
        Ok(valid)
    }

    pub fn global_object(self: &Rc<Self>) -> JscObject {
        // SAFETY: ctx is a live context
        let global = unsafe { JSContextGetGlobalObject(self.raw()) };
        JscObject::from_raw(self, global)
    }

    /// The last uncaught exception, if the slot holds one that is still
    /// alive
    pub fn exception(self: &Rc<Self>) -> Option<JscValue> {
        let root = {
            let slot = self.exception.borrow();
            if let Some(inner) = slot.value.upgrade() {
                return Some(JscValue::from_inner(inner));
            }
            slot.root?
        };

        let value = JscValue::from_raw(self, root);
        self.exception.borrow_mut().value = value.downgrade();
        Some(value)
    }

    /// Store `value` in the exception slot, or clear it with `None`
    ///
    /// The slot only observes the value: it reads back as `None` once the
    /// caller's last handle is dropped.
    pub fn set_exception(&self, value: Option<&JscValue>) -> JscResult<()> {
        if let Some(value) = value {
            self.ensure_same_vm(value, "exception slot")?;
        }

        let slot = ExceptionSlot {
            value: value.map_or_else(Weak::new, JscValue::downgrade),
            root: None,
        };
        let previous = self.exception.replace(slot);
        self.release_root(previous);
        Ok(())
    }

    /// Take the exception out of the slot as a [`JscError::Script`]
    pub fn take_exception(self: &Rc<Self>) -> JscResult<()> {
        let exception = self.exception();
        self.set_exception(None)?;
        match exception {
            Some(value) => Err(JscError::Script(value.exception_details())),
            None => Ok(()),
        }
    }

    /// The installed exception handler; `None` when exceptions are
    /// discarded
    pub fn exception_handler(&self) -> Option<ExceptionHandler> {
        self.exception_handler.borrow().clone()
    }

    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: Fn(&Rc<JscContext>, &JscValue) + 'static,
    {
        self.replace_exception_handler(Some(Rc::new(handler)));
    }

    /// Install `handler` (or discard exceptions with `None`) and return the
    /// previous one
    pub fn replace_exception_handler(
        &self,
        handler: Option<ExceptionHandler>,
    ) -> Option<ExceptionHandler> {
        self.exception_handler.replace(handler)
    }

    /// Discard uncaught exceptions from now on
    pub fn clear_exception_handler(&self) {
        self.replace_exception_handler(None);
    }

    /// Restore the default handler, which stores into the exception slot
    pub fn reset_exception_handler(&self) {
        self.replace_exception_handler(Some(default_exception_handler()));
    }

    /// Route an exception out-parameter to the handler. Returns whether
    /// there was one.
    ///
    /// Exceptions raised by the handler itself are discarded, so a handler
    /// converting a value whose conversion throws does not recurse.
    pub(crate) fn notify_exception(self: &Rc<Self>, exception: JSValueRef) -> bool {
        if exception.is_null() {
            return false;
        }
        if self.routing.get() {
            trace!(?exception, "discarding exception raised inside the exception handler");
            return true;
        }

        let value = JscValue::from_raw(self, exception);
        let Some(handler) = self.exception_handler() else {
            trace!(?exception, "discarding uncaught exception");
            return true;
        };

        debug!(?exception, "routing uncaught exception to handler");
        {
            self.routing.set(true);
            let _routing = scopeguard::guard((), |_| self.routing.set(false));
            handler(self, &value);
        }
        self.pin_if_current(&value);
        true
    }

    /// Wrap `value`, or route `exception` and return `undefined`
    pub(crate) fn value_or_notify(
        self: &Rc<Self>,
        value: JSValueRef,
        exception: JSValueRef,
    ) -> JscValue {
        if self.notify_exception(exception) {
            return self.undefined();
        }
        JscValue::from_raw(self, value)
    }

    fn pin_if_current(&self, value: &JscValue) {
        let mut slot = self.exception.borrow_mut();
        if slot.root.is_some() || !Weak::ptr_eq(&slot.value, &value.downgrade()) {
            return;
        }
        // SAFETY: the value is alive and belongs to this context's machine
        unsafe { JSValueProtect(self.raw(), value.raw()) };
        slot.root = Some(value.raw());
    }

    fn release_root(&self, slot: ExceptionSlot) {
        if let Some(root) = slot.root {
            // SAFETY: root was protected by pin_if_current
            unsafe { JSValueUnprotect(self.raw(), root) };
        }
    }

    /// Save and clear the exception slot before running a native callback
    ///
    /// Routing is re-enabled inside the callback even when it was called
    /// from the exception handler.
    pub(crate) fn enter_callback_frame(&self) -> CallbackFrame {
        CallbackFrame {
            slot: self.exception.take(),
            routing: self.routing.replace(false),
        }
    }

    /// Restore the state saved by
    /// [`enter_callback_frame`](Self::enter_callback_frame)
    pub(crate) fn leave_callback_frame(&self, saved: CallbackFrame) {
        let during = mem::replace(&mut *self.exception.borrow_mut(), saved.slot);
        self.release_root(during);
        self.routing.set(saved.routing);
    }

    /// Run a kind check captured at creation; never routes exceptions
    pub(crate) fn check_intrinsic(&self, intrinsic: Intrinsic, value: &JscValue) -> bool {
        // SAFETY: the intrinsic and value share this context's machine
        unsafe {
            let (result, exception) =
                intrinsics::call(self.raw(), self.intrinsics.get(intrinsic), value.raw());
            exception.is_null() && !result.is_null() && JSValueToBoolean(self.raw(), result)
        }
    }

    /// Call an intrinsic on `value`, routing a thrown exception
    pub(crate) fn call_intrinsic(
        self: &Rc<Self>,
        intrinsic: Intrinsic,
        value: &JscValue,
    ) -> JscValue {
        // SAFETY: the intrinsic and value share this context's machine
        let (result, exception) = unsafe {
            intrinsics::call(self.raw(), self.intrinsics.get(intrinsic), value.raw())
        };
        self.value_or_notify(result, exception)
    }

    pub(crate) fn ensure_same_vm(
        &self,
        value: &JscValue,
        operation: &'static str,
    ) -> JscResult<()> {
        if value.belongs_to(&self.vm) {
            Ok(())
        } else {
            Err(JscError::ForeignVirtualMachine { operation })
        }
    }

    pub(crate) fn raw_arguments(
        &self,
        args: &[JscValue],
        operation: &'static str,
    ) -> JscResult<Vec<JSValueRef>> {
        args.iter()
            .map(|arg| {
                self.ensure_same_vm(arg, operation)?;
                Ok(arg.raw())
            })
            .collect()
    }

    /// The owning virtual machine
    pub fn virtual_machine(&self) -> JscVirtualMachine {
        self.vm.clone()
    }

    pub(crate) fn vm(&self) -> &JscVirtualMachine {
        &self.vm
    }

    pub fn raw(&self) -> JSContextRef {
        self.ctx
    }

    pub fn raw_global(&self) -> JSGlobalContextRef {
        self.ctx
    }

    /// Ask the engine to collect garbage
    pub fn garbage_collect(&self) {
        // SAFETY: ctx is a live context
        unsafe { JSGarbageCollect(self.raw()) };
        function::drop_finalized();
    }

    pub fn undefined(self: &Rc<Self>) -> JscValue {
        // SAFETY: ctx is a live context
        JscValue::from_raw(self, unsafe { JSValueMakeUndefined(self.raw()) })
    }

    pub fn null(self: &Rc<Self>) -> JscValue {
        // SAFETY: ctx is a live context
        JscValue::from_raw(self, unsafe { JSValueMakeNull(self.raw()) })
    }

    pub fn boolean(self: &Rc<Self>, value: bool) -> JscValue {
        // SAFETY: ctx is a live context
        JscValue::from_raw(self, unsafe { JSValueMakeBoolean(self.raw(), value) })
    }

    pub fn number(self: &Rc<Self>, value: f64) -> JscValue {
        // SAFETY: ctx is a live context
        JscValue::from_raw(self, unsafe { JSValueMakeNumber(self.raw(), value) })
    }

    pub fn string(self: &Rc<Self>, value: &str) -> JscResult<JscValue> {
        let js_str = JscString::new(value)?;
        // SAFETY: ctx and string are valid; the engine copies the string
        Ok(JscValue::from_raw(self, unsafe {
            JSValueMakeString(self.raw(), js_str.raw())
        }))
    }

    /// Parse JSON text into an engine value
    pub fn value_from_json(self: &Rc<Self>, json: &str) -> JscResult<JscValue> {
        let js_str = JscString::new(json)?;
        // SAFETY: ctx and string are valid
        let value = unsafe { JSValueMakeFromJSONString(self.raw(), js_str.raw()) };
        if value.is_null() {
            return Err(JscError::type_error("JSON text", "unparseable input"));
        }
        Ok(JscValue::from_raw(self, value))
    }

    /// Convert any serializable Rust value through JSON
    pub fn value_from_serializable<T: serde::Serialize + ?Sized>(
        self: &Rc<Self>,
        value: &T,
    ) -> JscResult<JscValue> {
        let json = serde_json::to_string(value)?;
        self.value_from_json(&json)
    }

    /// A fresh `{}`
    pub fn create_object(self: &Rc<Self>) -> JscObject {
        // SAFETY: ctx is a live context; a null class makes a plain object
        let object = unsafe { JSObjectMake(self.raw(), ptr::null_mut(), ptr::null_mut()) };
        JscObject::from_raw(self, object)
    }

    pub fn create_array(self: &Rc<Self>, elements: &[JscValue]) -> JscResult<JscArray> {
        self.make_object(elements, "JSObjectMakeArray", JSObjectMakeArray)
            .map(JscArray::from_object)
    }

    /// `new Date()`
    pub fn create_date(self: &Rc<Self>) -> JscResult<JscDate> {
        self.create_date_with(&[])
    }

    /// `new Date(...args)`
    pub fn create_date_with(self: &Rc<Self>, args: &[JscValue]) -> JscResult<JscDate> {
        self.make_object(args, "JSObjectMakeDate", JSObjectMakeDate)
            .map(JscDate::from_object)
    }

    /// `new Error(...args)`
    pub fn create_error(self: &Rc<Self>, args: &[JscValue]) -> JscResult<JscErrorObject> {
        self.make_object(args, "JSObjectMakeError", JSObjectMakeError)
            .map(JscErrorObject::from_object)
    }

    /// `new RegExp(...args)`. An invalid pattern throws a SyntaxError,
    /// which goes to the exception handler before `Err` is returned.
    pub fn create_regexp(self: &Rc<Self>, args: &[JscValue]) -> JscResult<JscRegExp> {
        self.make_object(args, "JSObjectMakeRegExp", JSObjectMakeRegExp)
            .map(JscRegExp::from_object)
    }

    /// Expose a Rust closure to script as a function named `name`
    ///
    /// See [`JscFunction`] for the calling protocol.
    pub fn create_function<F>(self: &Rc<Self>, name: &str, callback: F) -> JscResult<JscFunction>
    where
        F: Fn(&Rc<JscContext>, Option<&JscObject>, &[JscValue]) -> Result<JscValue, JscValue>
            + 'static,
    {
        function::drop_finalized();
        let class = *self.function_class.get_or_init(function::create_class);
        let callback: NativeCallback = Box::new(callback);
        function::make_function(self, class, name, callback)
    }

    fn make_object(
        self: &Rc<Self>,
        args: &[JscValue],
        operation: &'static str,
        make: RawObjectMaker,
    ) -> JscResult<JscObject> {
        let raw_args = self.raw_arguments(args, "constructor argument")?;

        let mut exception: JSValueRef = ptr::null_mut();
        // SAFETY: ctx and arguments are valid and share a machine
        let object = unsafe {
            make(
                self.raw(),
                raw_args.len(),
                if raw_args.is_empty() {
                    ptr::null()
                } else {
                    raw_args.as_ptr()
                },
                &mut exception,
            )
        };

        if self.notify_exception(exception) || object.is_null() {
            return Err(JscError::null_pointer(operation));
        }
        Ok(JscObject::from_raw(self, object))
    }

    /// Contexts constructed so far (since the last
    /// [`diagnostics::reset`](crate::diagnostics::reset))
    #[cfg(feature = "diagnostics")]
    pub fn ctor_counter() -> u64 {
        crate::diagnostics::counts(InstanceKind::Context).constructed
    }

    /// Contexts destroyed so far (since the last
    /// [`diagnostics::reset`](crate::diagnostics::reset))
    #[cfg(feature = "diagnostics")]
    pub fn dtor_counter() -> u64 {
        crate::diagnostics::counts(InstanceKind::Context).destroyed
    }
}

fn default_exception_handler() -> ExceptionHandler {
    Rc::new(|ctx: &Rc<JscContext>, value: &JscValue| {
        if let Err(err) = ctx.set_exception(Some(value)) {
            warn!(%err, "failed to store uncaught exception");
        }
    })
}

impl From<&JscContext> for JSGlobalContextRef {
    fn from(context: &JscContext) -> Self {
        context.raw_global()
    }
}

impl fmt::Debug for JscContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JscContext")
            .field("ctx", &self.ctx)
            .field("vm", &self.vm)
            .finish()
    }
}

impl Drop for JscContext {
    fn drop(&mut self) {
        debug!(ctx = ?self.ctx, "releasing context");
        let slot = self.exception.take();
        self.release_root(slot);

        // SAFETY: the intrinsics, class and context were created by this
        // context and are released once
        unsafe {
            self.intrinsics.release(self.ctx);
            if let Some(class) = self.function_class.take() {
                JSClassRelease(class);
            }
            JSGlobalContextRelease(self.ctx);
        }
        function::drop_finalized();
    }
}
