#![cfg(not(feature = "ssr"))]

use argus_reactive::{
    create_custom_ref, create_effect, create_ref, create_shallow_ref, is_reactive, is_ref,
    object, reactive, trigger_ref, unref, Proxy, Value,
};
use std::{cell::RefCell, rc::Rc};

fn as_proxy(value: &Value) -> Proxy {
    value.as_proxy().expect("expected a proxy").clone()
}

#[test]
fn ref_reads_subscribe_and_writes_notify() {
    let count = create_ref(0);

    let seen = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (count, seen) = (count.clone(), seen.clone());
        move || seen.borrow_mut().push(count.get())
    });
    assert_eq!(seen.borrow().as_slice(), [Value::Int(0)]);

    count.set(1);
    assert_eq!(seen.borrow().as_slice(), [Value::Int(0), Value::Int(1)]);

    count.set(1);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn deep_refs_wrap_structured_values() {
    let state = create_ref(object! { "n" => 1 });
    assert!(is_reactive(&state.get()));

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (state, runs) = (state.clone(), runs.clone());
        move || {
            as_proxy(&state.get()).get("n");
            *runs.borrow_mut() += 1;
        }
    });

    as_proxy(&state.get()).set("n", 2);
    assert_eq!(*runs.borrow(), 2);
}

#[test]
fn shallow_refs_only_observe_whole_assignments() {
    let state = create_shallow_ref(object! { "n" => 1 });
    assert!(!is_reactive(&state.get()));

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (state, runs) = (state.clone(), runs.clone());
        move || {
            state.get();
            *runs.borrow_mut() += 1;
        }
    });

    // in-place mutation of the held target is invisible...
    state.get().as_target().unwrap().raw_set("n", 2);
    assert_eq!(*runs.borrow(), 1);

    // ...until forced
    trigger_ref(&state);
    assert_eq!(*runs.borrow(), 2);

    state.set(object! { "n" => 3 });
    assert_eq!(*runs.borrow(), 3);
}

#[test]
fn refs_unwrap_inside_deep_proxies() {
    let count = create_ref(5);
    let raw = object! {};
    raw.raw_set("count", count.clone());
    let state = as_proxy(&reactive(raw));

    assert_eq!(state.get("count"), Value::Int(5));

    let seen = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (state, seen) = (state.clone(), seen.clone());
        move || seen.borrow_mut().push(state.get("count"))
    });

    // a plain write over a stored ref assigns through it
    state.set("count", 6);
    assert_eq!(count.get(), Value::Int(6));
    assert_eq!(seen.borrow().as_slice(), [Value::Int(5), Value::Int(6)]);
}

#[test]
fn unref_reads_through() {
    let count = create_ref(3);
    assert!(is_ref(&Value::Ref(count.clone())));
    assert_eq!(unref(&Value::Ref(count)), Value::Int(3));
    assert_eq!(unref(&Value::Int(7)), Value::Int(7));
}

#[test]
fn custom_refs_control_their_own_tracking() {
    let stored = Rc::new(RefCell::new(Value::Int(0)));
    let writes = Rc::new(RefCell::new(0));

    let cell = create_custom_ref({
        let stored = stored.clone();
        let writes = writes.clone();
        move |track, trigger| {
            let read = stored.clone();
            let write = stored.clone();
            (
                Box::new(move || {
                    track();
                    read.borrow().clone()
                }),
                Box::new(move |value| {
                    *write.borrow_mut() = value;
                    *writes.borrow_mut() += 1;
                    trigger();
                }),
            )
        }
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (cell, seen) = (cell.clone(), seen.clone());
        move || seen.borrow_mut().push(cell.get())
    });
    assert_eq!(seen.borrow().as_slice(), [Value::Int(0)]);

    cell.set(4);
    assert_eq!(*writes.borrow(), 1);
    assert_eq!(seen.borrow().as_slice(), [Value::Int(0), Value::Int(4)]);
}
