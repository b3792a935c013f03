#![cfg(not(feature = "ssr"))]

use argus_reactive::{
    create_computed, create_effect, create_ref, create_writable_computed, is_readonly, is_ref,
    Value,
};
use std::{cell::RefCell, rc::Rc};

fn int(value: &Value) -> i64 {
    value.as_int().expect("expected an int")
}

#[test]
fn computed_chain_propagates() {
    let a = create_ref(1);
    let b = create_computed({
        let a = a.clone();
        move || Value::Int(int(&a.get()) + 1)
    });
    let c = create_computed({
        let b = b.clone();
        move || Value::Int(int(&b.get()) * 10)
    });

    let runs = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (c, runs) = (c.clone(), runs.clone());
        move || runs.borrow_mut().push(c.get())
    });
    assert_eq!(runs.borrow().as_slice(), [Value::Int(20)]);

    a.set(2);
    assert_eq!(runs.borrow().last(), Some(&Value::Int(30)));
}

#[test]
fn unobserved_computed_stays_lazy() {
    let a = create_ref(1);
    let evaluations = Rc::new(RefCell::new(0));

    let doubled = create_computed({
        let a = a.clone();
        let evaluations = evaluations.clone();
        move || {
            *evaluations.borrow_mut() += 1;
            Value::Int(int(&a.get()) * 2)
        }
    });

    // never read: never evaluated
    assert_eq!(*evaluations.borrow(), 0);

    assert_eq!(doubled.get(), Value::Int(2));
    assert_eq!(*evaluations.borrow(), 1);

    // no subscriber, so an upstream change only marks it dirty
    a.set(5);
    assert_eq!(*evaluations.borrow(), 1);

    assert_eq!(doubled.get(), Value::Int(10));
    assert_eq!(*evaluations.borrow(), 2);
}

#[test]
fn clean_reads_reuse_the_cached_value() {
    let a = create_ref(1);
    let evaluations = Rc::new(RefCell::new(0));

    let doubled = create_computed({
        let a = a.clone();
        let evaluations = evaluations.clone();
        move || {
            *evaluations.borrow_mut() += 1;
            Value::Int(int(&a.get()) * 2)
        }
    });

    assert_eq!(doubled.get(), Value::Int(2));
    assert_eq!(doubled.get(), Value::Int(2));
    assert_eq!(*evaluations.borrow(), 1);
}

#[test]
fn dependents_always_observe_consistent_state() {
    let a = create_ref(1);
    let tenfold = create_computed({
        let a = a.clone();
        move || Value::Int(int(&a.get()) * 10)
    });

    let pairs = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (a, tenfold, pairs) = (a.clone(), tenfold.clone(), pairs.clone());
        move || {
            let base = int(&a.get());
            let derived = int(&tenfold.get());
            pairs.borrow_mut().push((base, derived));
        }
    });

    a.set(2);
    a.set(3);

    // the computed is marked dirty before any plain effect runs, so every
    // observation is internally consistent
    for (base, derived) in pairs.borrow().iter() {
        assert_eq!(*derived, base * 10);
    }
    assert_eq!(pairs.borrow().last(), Some(&(3, 30)));
}

#[test]
fn writable_computed_routes_through_its_setter() {
    let celsius = create_ref(0);
    let fahrenheit = create_writable_computed(
        {
            let celsius = celsius.clone();
            move || Value::Int(int(&celsius.get()) * 9 / 5 + 32)
        },
        {
            let celsius = celsius.clone();
            move |value| {
                celsius.set((value.as_int().unwrap_or(32) - 32) * 5 / 9);
            }
        },
    );

    assert_eq!(fahrenheit.get(), Value::Int(32));
    assert!(!is_readonly(&Value::from(fahrenheit.clone())));

    fahrenheit.set(212);
    assert_eq!(celsius.get(), Value::Int(100));
    assert_eq!(fahrenheit.get(), Value::Int(212));
}

#[test]
fn readonly_computed_ignores_writes() {
    let doubled = create_computed(|| Value::Int(4));
    assert!(is_readonly(&Value::from(doubled.clone())));
    doubled.set(9);
    assert_eq!(doubled.get(), Value::Int(4));
}

#[test]
fn computed_is_ref_shaped() {
    let doubled = create_computed(|| Value::Int(2));
    assert!(is_ref(&Value::from(doubled)));
}
