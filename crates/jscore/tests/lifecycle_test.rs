//! Construction/destruction counters
//!
//! Counters are process-wide, so every test resets them and runs serially.

#![cfg(feature = "diagnostics")]

use jscore::diagnostics::{self, InstanceKind};
use jscore::{JscContext, JscVirtualMachine};
use serial_test::serial;

#[test]
#[serial]
fn test_contexts_are_destroyed() {
    diagnostics::reset();
    let ctor_before = JscContext::ctor_counter();
    let dtor_before = JscContext::dtor_counter();

    const N: u64 = 5;
    let contexts: Vec<_> = (0..N).map(|_| JscContext::create().unwrap()).collect();
    assert_eq!(JscContext::ctor_counter() - ctor_before, N);
    assert_eq!(JscContext::dtor_counter() - dtor_before, 0);

    drop(contexts);
    assert_eq!(JscContext::dtor_counter() - dtor_before, N);
}

#[test]
#[serial]
fn test_values_keep_context_alive() {
    diagnostics::reset();

    let ctx = JscContext::create().unwrap();
    let value = ctx.evaluate_script("[1, 2, 3]").unwrap();
    drop(ctx);
    assert_eq!(JscContext::dtor_counter(), 0);

    drop(value);
    assert_eq!(JscContext::dtor_counter(), 1);
    assert_eq!(diagnostics::counts(InstanceKind::Value).alive(), 0);
}

#[test]
#[serial]
fn test_exception_slot_does_not_keep_context_alive() {
    diagnostics::reset();

    let ctx = JscContext::create().unwrap();
    ctx.evaluate_script("throw new Error('pinned')").unwrap();
    assert!(ctx.exception().is_some());
    drop(ctx);

    assert_eq!(JscContext::dtor_counter(), 1);
    assert_eq!(diagnostics::counts(InstanceKind::Context).alive(), 0);
}

#[test]
#[serial]
fn test_native_function_does_not_keep_context_alive() {
    diagnostics::reset();

    let ctx = JscContext::create().unwrap();
    let function = ctx
        .create_function("noop", |ctx, _, _| Ok(ctx.undefined()))
        .unwrap();
    ctx.global_object().set_property("noop", &function).unwrap();
    drop(function);
    drop(ctx);

    assert_eq!(JscContext::dtor_counter(), 1);
    assert_eq!(diagnostics::counts(InstanceKind::Function).alive(), 0);
}

#[test]
#[serial]
fn test_vm_outlives_its_contexts() {
    diagnostics::reset();

    let vm = JscVirtualMachine::new().unwrap();
    let a = JscContext::create_in(&vm).unwrap();
    let b = JscContext::create_in(&vm).unwrap();
    drop(vm);
    assert_eq!(diagnostics::counts(InstanceKind::VirtualMachine).alive(), 1);

    drop(a);
    drop(b);
    assert_eq!(diagnostics::counts(InstanceKind::VirtualMachine).alive(), 0);
    assert_eq!(diagnostics::counts(InstanceKind::Context).destroyed, 2);
}

#[test]
#[serial]
fn test_object_kinds_are_counted() {
    diagnostics::reset();

    let ctx = JscContext::create().unwrap();
    {
        let _date = ctx.create_date().unwrap();
        let _array = ctx.create_array(&[]).unwrap();
        let _error = ctx.create_error(&[]).unwrap();
        let _regexp = ctx.create_regexp(&[ctx.string("a").unwrap()]).unwrap();

        for kind in [
            InstanceKind::Date,
            InstanceKind::Array,
            InstanceKind::Error,
            InstanceKind::RegExp,
        ] {
            assert_eq!(diagnostics::counts(kind).alive(), 1, "{kind:?}");
        }
    }

    for kind in InstanceKind::ALL {
        if kind != InstanceKind::Context && kind != InstanceKind::VirtualMachine {
            assert_eq!(diagnostics::counts(kind).alive(), 0, "{kind:?}");
        }
    }
}
