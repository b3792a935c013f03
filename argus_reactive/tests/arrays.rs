#![cfg(not(feature = "ssr"))]

use argus_reactive::{array, create_effect, create_ref, reactive, Proxy, Target, Value};
use std::{cell::RefCell, rc::Rc};

fn as_proxy(value: &Value) -> Proxy {
    value.as_proxy().expect("expected a proxy").clone()
}

#[test]
fn push_notifies_length_readers() {
    let items = as_proxy(&reactive(array![1, 2, 3]));

    let lengths = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (items, lengths) = (items.clone(), lengths.clone());
        move || lengths.borrow_mut().push(items.len())
    });
    assert_eq!(lengths.borrow().as_slice(), [3]);

    assert_eq!(items.push(4), 4);
    assert_eq!(lengths.borrow().as_slice(), [3, 4]);
}

#[test]
fn pop_notifies_index_and_length() {
    let items = as_proxy(&reactive(array![1, 2]));

    let last = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (items, last) = (items.clone(), last.clone());
        move || {
            let len = items.len();
            last.borrow_mut()
                .push(if len == 0 { Value::Null } else { items.get(len - 1) });
        }
    });
    assert_eq!(last.borrow().as_slice(), [Value::Int(2)]);

    assert_eq!(items.pop(), Value::Int(2));
    assert_eq!(last.borrow().as_slice(), [Value::Int(2), Value::Int(1)]);
}

#[test]
fn shrinking_length_notifies_truncated_indices() {
    let items = as_proxy(&reactive(array![1, 2, 3]));

    let seen = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (items, seen) = (items.clone(), seen.clone());
        move || seen.borrow_mut().push(items.get(2))
    });
    assert_eq!(seen.borrow().as_slice(), [Value::Int(3)]);

    items.set_length(1);
    assert_eq!(seen.borrow().as_slice(), [Value::Int(3), Value::Null]);
}

#[test]
fn shift_and_unshift_renumber() {
    let items = as_proxy(&reactive(array!["a", "b"]));

    let first = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (items, first) = (items.clone(), first.clone());
        move || first.borrow_mut().push(items.get(0))
    });
    assert_eq!(first.borrow().as_slice(), [Value::from("a")]);

    assert_eq!(items.shift(), Value::from("a"));
    assert_eq!(first.borrow().last(), Some(&Value::from("b")));

    items.unshift("z");
    assert_eq!(first.borrow().last(), Some(&Value::from("z")));
}

#[test]
fn splice_returns_removed_and_triggers_changed_indices() {
    let items = as_proxy(&reactive(array![1, 2, 3, 4]));

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (items, runs) = (items.clone(), runs.clone());
        move || {
            items.get(1);
            *runs.borrow_mut() += 1;
        }
    });

    let removed = items.splice(1, 2, vec![Value::Int(9)]);
    assert_eq!(removed, vec![Value::Int(2), Value::Int(3)]);
    assert_eq!(*runs.borrow(), 2);
    assert_eq!(items.get(1), Value::Int(9));
    assert_eq!(items.len(), 3);
}

#[test]
fn includes_finds_raw_through_a_proxy_argument() {
    let element = Target::object();
    let items = as_proxy(&reactive(Target::array_from([Value::Target(
        element.clone(),
    )])));

    // reading through the proxy yields a wrapped element; searching with it
    // must still find the raw entry
    let wrapped = items.get(0);
    assert!(argus_reactive::is_reactive(&wrapped));
    assert!(items.includes(&wrapped));
    assert!(items.includes(&Value::Target(element)));
    assert_eq!(items.index_of(&Value::Int(42)), None);
}

#[test]
fn search_tracks_every_index() {
    let items = as_proxy(&reactive(array![1, 2]));

    let hits = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (items, hits) = (items.clone(), hits.clone());
        move || hits.borrow_mut().push(items.index_of(&Value::Int(2)))
    });
    assert_eq!(hits.borrow().as_slice(), [Some(1)]);

    items.set(0, 2);
    assert_eq!(hits.borrow().as_slice(), [Some(1), Some(0)]);
}

#[test]
fn integer_indices_do_not_unwrap_refs() {
    let cell = create_ref(5);
    let raw = Target::array_from([Value::Ref(cell.clone())]);
    let items = as_proxy(&reactive(raw));

    match items.get(0) {
        Value::Ref(inner) => assert_eq!(inner.get(), Value::Int(5)),
        other => panic!("expected the ref itself, got {other:?}"),
    }
}
