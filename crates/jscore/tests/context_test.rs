//! Behavior of contexts as seen from outside the crate

use jscore::{JscContext, JscError, JscValue, JscVirtualMachine, ScriptOptions};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_context_reports_supplied_vm() {
    let vm = JscVirtualMachine::new().unwrap();
    let ctx = JscContext::create_in(&vm).unwrap();
    assert_eq!(ctx.virtual_machine(), vm);

    let value = ctx.number(1.0);
    assert_eq!(value.virtual_machine(), vm);
}

#[test]
fn test_fresh_context_gets_fresh_vm() {
    let a = JscContext::create().unwrap();
    let b = JscContext::create().unwrap();
    assert_ne!(a.virtual_machine(), b.virtual_machine());
}

#[test]
fn test_thrown_value_is_stored() {
    let ctx = JscContext::create().unwrap();
    ctx.evaluate_script("var thrown = { marker: 1 }").unwrap();
    ctx.evaluate_script("throw thrown").unwrap();

    let expected = ctx.global_object().get_property("thrown").unwrap();
    assert_eq!(ctx.exception(), Some(expected));
}

#[test]
fn test_noop_handler_leaves_slot_alone() {
    let ctx = JscContext::create().unwrap();
    let marker = ctx.string("before").unwrap();
    ctx.set_exception(Some(&marker)).unwrap();

    ctx.set_exception_handler(|_, _| {});
    ctx.evaluate_script("throw new Error('ignored')").unwrap();
    assert_eq!(ctx.exception(), Some(marker.clone()));

    ctx.clear_exception_handler();
    ctx.evaluate_script("throw new Error('ignored too')").unwrap();
    assert_eq!(ctx.exception(), Some(marker));
}

#[test]
fn test_handler_sees_exceptions_from_every_entry_point() {
    let ctx = JscContext::create().unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    ctx.set_exception_handler(move |_, value| {
        log.borrow_mut().push(value.exception_details().message);
    });

    ctx.evaluate_script("throw new Error('eval')").unwrap();

    let obj = ctx
        .evaluate_script("({ get bad() { throw new Error('getter') } })")
        .unwrap()
        .as_object()
        .unwrap();
    assert!(obj.get_property("bad").unwrap().is_undefined());

    let func = ctx
        .evaluate_script("(function () { throw new Error('call') })")
        .unwrap()
        .as_object()
        .unwrap();
    func.call_as_function(None, &[]).unwrap();

    let throwing = ctx
        .evaluate_script("({ toString() { throw new Error('convert') } })")
        .unwrap();
    assert_eq!(throwing.to_js_string(), None);

    assert_eq!(*seen.borrow(), vec!["eval", "getter", "call", "convert"]);
}

#[test]
fn test_handler_can_inspect_context() {
    let ctx = JscContext::create().unwrap();
    ctx.set_exception_handler(|ctx, value| {
        ctx.global_object().set_property("lastError", value).unwrap();
    });

    ctx.evaluate_script("throw 'recorded'").unwrap();
    let recorded = ctx.evaluate_script("lastError").unwrap();
    assert_eq!(recorded.to_js_string().as_deref(), Some("recorded"));
}

#[test]
fn test_foreign_exception_rejected() {
    let a = JscContext::create().unwrap();
    let b = JscContext::create().unwrap();
    let value = a.string("from a").unwrap();

    let err = b.set_exception(Some(&value)).unwrap_err();
    assert!(matches!(err, JscError::ForeignVirtualMachine { .. }));
    assert!(b.exception().is_none());
}

#[test]
fn test_values_move_between_contexts_of_one_vm() {
    let vm = JscVirtualMachine::new().unwrap();
    let a = JscContext::create_in(&vm).unwrap();
    let b = JscContext::create_in(&vm).unwrap();

    let value = a.string("shared").unwrap();
    b.set_exception(Some(&value)).unwrap();
    b.global_object().set_property("shared", &value).unwrap();

    let read = b.evaluate_script("shared").unwrap();
    assert_eq!(read.to_js_string().as_deref(), Some("shared"));
}

#[test]
fn test_object_kinds_move_between_contexts_of_one_vm() {
    let vm = JscVirtualMachine::new().unwrap();
    let a = JscContext::create_in(&vm).unwrap();
    let b = JscContext::create_in(&vm).unwrap();

    let date = a.create_date_with(&[a.number(0.0)]).unwrap();
    let array = a.create_array(&[a.number(1.0), a.number(2.0)]).unwrap();
    let error = a.create_error(&[a.string("x").unwrap()]).unwrap();
    let pattern = a
        .create_regexp(&[a.string("a+").unwrap(), a.string("g").unwrap()])
        .unwrap();
    let twice = a
        .create_function("twice", |ctx, _, args| {
            Ok(ctx.number(args.first().map_or(0.0, |arg| arg.to_number()) * 2.0))
        })
        .unwrap();
    let type_error = a.evaluate_script("new TypeError('y')").unwrap();

    let global = b.global_object();
    global.set_property("date", &date).unwrap();
    global.set_property("array", &array).unwrap();
    global.set_property("error", &error).unwrap();
    global.set_property("pattern", &pattern).unwrap();
    global.set_property("twice", &twice).unwrap();
    global.set_property("typeError", &type_error).unwrap();

    let read = |name: &str| b.evaluate_script(name).unwrap().as_object().unwrap();

    let date = read("date").as_date().unwrap();
    assert_eq!(date.time_value(), 0.0);
    assert_eq!(date.to_iso_string().as_deref(), Some("1970-01-01T00:00:00.000Z"));

    let array = read("array").as_array().unwrap();
    assert_eq!(array.len(), 2);
    assert_eq!(array.get(1).to_number(), 2.0);

    let error = read("error").as_error().unwrap();
    assert_eq!(error.message().as_deref(), Some("x"));
    let type_error = read("typeError").as_error().unwrap();
    assert_eq!(type_error.name().as_deref(), Some("TypeError"));

    let pattern = read("pattern").as_regexp().unwrap();
    assert_eq!(pattern.source().as_deref(), Some("a+"));
    assert!(pattern.test("caat").unwrap());

    assert!(read("twice").is_function());
    assert_eq!(b.evaluate_script("twice(4)").unwrap().to_number(), 8.0);
    assert!(b.exception().is_none());
}

#[test]
fn test_function_outliving_its_context_throws() {
    let vm = JscVirtualMachine::new().unwrap();
    let b = JscContext::create_in(&vm).unwrap();
    {
        let a = JscContext::create_in(&vm).unwrap();
        let orphan = a
            .create_function("orphan", |ctx, _, _| Ok(ctx.number(1.0)))
            .unwrap();
        b.global_object().set_property("orphan", &orphan).unwrap();
    }

    let result = b
        .evaluate_script("try { orphan(); 'called' } catch (e) { e.message }")
        .unwrap();
    let message = result.to_js_string().unwrap();
    assert!(message.contains("context was released"), "{message}");
    assert!(b.exception().is_none());
}

#[test]
fn test_foreign_argument_rejected() {
    let a = JscContext::create().unwrap();
    let b = JscContext::create().unwrap();
    let func = a
        .evaluate_script("(function (x) { return x; })")
        .unwrap()
        .as_object()
        .unwrap();

    let err = func.call_as_function(None, &[b.number(1.0)]).unwrap_err();
    assert!(matches!(err, JscError::ForeignVirtualMachine { .. }));
}

#[test]
fn test_date_without_arguments_matches_empty_arguments() {
    let ctx = JscContext::create().unwrap();
    let implicit = ctx.create_date().unwrap();
    let explicit = ctx.create_date_with(&[]).unwrap();

    assert!(implicit.is_date());
    assert!(explicit.is_date());
    assert!((implicit.time_value() - explicit.time_value()).abs() < 1_000.0);
    assert_eq!(implicit.prototype(), explicit.prototype());
}

#[test]
fn test_callback_error_is_catchable() {
    let ctx = JscContext::create().unwrap();
    let check = ctx
        .create_function("check", |ctx, _, args| match args.first() {
            Some(arg) if arg.is_number() => Ok(ctx.boolean(true)),
            _ => Err(ctx
                .create_error(&[ctx.string("expected a number").unwrap()])
                .unwrap()
                .into()),
        })
        .unwrap();
    ctx.global_object().set_property("check", &check).unwrap();

    let result = ctx
        .evaluate_script("try { check('x') } catch (e) { 'caught: ' + e.message }")
        .unwrap();
    assert_eq!(result.to_js_string().as_deref(), Some("caught: expected a number"));
    assert!(ctx.evaluate_script("check(1)").unwrap().to_bool());
}

#[test]
fn test_callback_sees_empty_slot_and_restores_it() {
    let ctx = JscContext::create().unwrap();
    let prior = ctx.string("prior").unwrap();
    ctx.set_exception(Some(&prior)).unwrap();

    let inside: Rc<RefCell<Option<bool>>> = Rc::new(RefCell::new(None));
    let record = Rc::clone(&inside);
    let observe = ctx
        .create_function("observe", move |ctx, _, _| {
            *record.borrow_mut() = Some(ctx.exception().is_none());
            Ok(ctx.undefined())
        })
        .unwrap();
    ctx.global_object().set_property("observe", &observe).unwrap();

    ctx.evaluate_script("observe()").unwrap();
    assert_eq!(*inside.borrow(), Some(true));
    assert_eq!(ctx.exception(), Some(prior));
}

#[test]
fn test_take_exception_reports_location() {
    let ctx = JscContext::create().unwrap();
    let options = ScriptOptions::new().source_url("lib.js");
    ctx.evaluate_script_with("undefinedFunction()", &options)
        .unwrap();

    let err = ctx.take_exception().unwrap_err();
    let exception = err.script_exception().unwrap();
    assert_eq!(exception.name, "ReferenceError");
    assert_eq!(exception.file.as_deref(), Some("lib.js"));
    assert_eq!(exception.line, Some(1));
    assert!(ctx.take_exception().is_ok());
}

#[test]
fn test_value_outlives_caller_context_handle() {
    let value: JscValue = {
        let ctx = JscContext::create().unwrap();
        ctx.evaluate_script("({ answer: 42 })").unwrap()
    };

    let object = value.as_object().unwrap();
    assert_eq!(object.get_property("answer").unwrap().to_number(), 42.0);
    assert_eq!(Rc::strong_count(value.context()), 1);
}
