// Allow raw pointer arguments in safe functions - handles expose their raw
// engine references for interop and never dereference caller pointers.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

//! Reference-counted handles over JavaScriptCore.
//!
//! The engine does all parsing, execution and garbage collection; this
//! crate makes its C API safe to drive from Rust:
//!
//! - [`JscVirtualMachine`]: an isolated object space (context group)
//! - [`JscContext`]: an execution environment inside a machine, handed out
//!   as `Rc<JscContext>`
//! - [`JscValue`] / [`JscObject`]: GC-protected handles that keep their
//!   context alive
//! - [`JscDate`], [`JscArray`], [`JscErrorObject`], [`JscRegExp`],
//!   [`JscFunction`]: object kinds, created only through a context
//!
//! # Example
//!
//! ```
//! use jscore::JscContext;
//!
//! let ctx = JscContext::create().unwrap();
//! let result = ctx.evaluate_script("1 + 1").unwrap();
//! assert_eq!(result.to_number(), 2.0);
//! ```
//!
//! # Exceptions
//!
//! JavaScript exceptions are not Rust errors. When an engine call made
//! through any handle throws, the thrown value is passed to the context's
//! exception handler, which by default stores it in the exception slot:
//!
//! ```
//! use jscore::JscContext;
//!
//! let ctx = JscContext::create().unwrap();
//! let result = ctx.evaluate_script("throw new TypeError('nope')").unwrap();
//! assert!(result.is_undefined());
//!
//! let thrown = ctx.exception().unwrap();
//! assert_eq!(thrown.exception_details().name, "TypeError");
//! ```
//!
//! [`JscError`] covers misuse the engine cannot see: strings with interior
//! NUL bytes, values from a different virtual machine, kind mismatches.
//!
//! # Thread Safety
//!
//! All handle types are `!Send` and `!Sync`: JavaScriptCore contexts and
//! values must stay on the thread that created them.
//!
//! ```compile_fail
//! use jscore::JscContext;
//! use std::thread;
//!
//! let ctx = JscContext::create().unwrap();
//! thread::spawn(move || {
//!     ctx.evaluate_script("1 + 1"); // Error: Rc<JscContext> is !Send
//! });
//! ```
//!
//! ```compile_fail
//! use jscore::JscContext;
//! use std::thread;
//!
//! let ctx = JscContext::create().unwrap();
//! let value = ctx.evaluate_script("42").unwrap();
//! thread::spawn(move || {
//!     let _ = value.to_number(); // Error: JscValue is !Send
//! });
//! ```
//!
//! ```compile_fail
//! use jscore::JscVirtualMachine;
//! use std::thread;
//!
//! let vm = JscVirtualMachine::new().unwrap();
//! thread::spawn(move || {
//!     let _ = vm.raw(); // Error: JscVirtualMachine is !Send
//! });
//! ```

mod array;
pub mod config;
mod context;
mod date;
pub mod diagnostics;
mod error;
mod error_object;
mod function;
mod intrinsics;
mod object;
mod regexp;
pub mod string;
mod value;
mod vm;

pub use array::JscArray;
pub use config::ScriptOptions;
pub use context::{ExceptionHandler, JscContext};
pub use date::JscDate;
pub use error::{JscError, JscResult, ScriptException};
pub use error_object::JscErrorObject;
pub use function::JscFunction;
pub use object::{JscObject, PropertyAttributes};
pub use regexp::JscRegExp;
pub use string::{JscString, js_string_to_rust};
pub use value::{JscValue, JscValueType};
pub use vm::JscVirtualMachine;

// Re-export the raw bindings for interop at the boundary
pub use jscore_sys as sys;
