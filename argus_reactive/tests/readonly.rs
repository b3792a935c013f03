#![cfg(not(feature = "ssr"))]

use argus_reactive::{
    create_effect, is_proxy, is_reactive, is_readonly, is_shallow, object, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, Proxy, Value,
};
use std::{cell::RefCell, rc::Rc};

fn as_proxy(value: &Value) -> Proxy {
    value.as_proxy().expect("expected a proxy").clone()
}

#[test]
fn writes_are_refused_and_reported_successful() {
    let guarded = as_proxy(&readonly(object! { "a" => 1 }));

    assert!(guarded.set("a", 2));
    assert_eq!(guarded.get("a"), Value::Int(1));

    assert!(guarded.delete("a"));
    assert_eq!(guarded.get("a"), Value::Int(1));
}

#[test]
fn readonly_reads_do_not_subscribe() {
    let target = object! { "a" => 1 };
    let guarded = as_proxy(&readonly(target.clone()));
    let live = as_proxy(&reactive(target));

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (guarded, runs) = (guarded.clone(), runs.clone());
        move || {
            guarded.get("a");
            *runs.borrow_mut() += 1;
        }
    });

    live.set("a", 2);
    assert_eq!(*runs.borrow(), 1);
}

#[test]
fn readonly_over_reactive_still_tracks() {
    let live = as_proxy(&reactive(object! { "a" => 1 }));
    let guarded = as_proxy(&readonly(Value::Proxy(live.clone())));

    let seen = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (guarded, seen) = (guarded.clone(), seen.clone());
        move || seen.borrow_mut().push(guarded.get("a"))
    });
    assert_eq!(seen.borrow().as_slice(), [Value::Int(1)]);

    live.set("a", 2);
    assert_eq!(seen.borrow().as_slice(), [Value::Int(1), Value::Int(2)]);

    // and the layered view is reactive by the recursive raw query
    let layered = Value::Proxy(guarded);
    assert!(is_readonly(&layered));
    assert!(is_reactive(&layered));
}

#[test]
fn layered_raw_unwraps_to_the_original_target() {
    let target = object! { "a" => 1 };
    let live = reactive(target.clone());
    let guarded = readonly(live.clone());
    assert_ne!(guarded, live);
    assert_eq!(to_raw(&guarded), Value::Target(target));
}

#[test]
fn deep_readonly_propagates() {
    let guarded = as_proxy(&readonly(object! { "inner" => object! { "n" => 1 } }));
    let inner = guarded.get("inner");
    assert!(is_readonly(&inner));
    as_proxy(&inner).set("n", 2);
    assert_eq!(as_proxy(&inner).get("n"), Value::Int(1));
}

#[test]
fn shallow_flavors_stop_at_the_root() {
    let shallow = as_proxy(&shallow_reactive(object! { "inner" => object! {} }));
    assert!(is_shallow(&Value::Proxy(shallow.clone())));
    assert!(!is_proxy(&shallow.get("inner")));

    let shallow_ro = as_proxy(&shallow_readonly(object! { "inner" => object! {} }));
    assert!(!is_proxy(&shallow_ro.get("inner")));
    // root writes refused, nested structure untouched by the wrapper
    shallow_ro.set("inner", 1);
    assert!(shallow_ro.get("inner").as_target().is_some());
}
