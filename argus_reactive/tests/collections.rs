#![cfg(not(feature = "ssr"))]

use argus_reactive::{
    create_effect, is_reactive, reactive, readonly, Key, Proxy, Target, Value,
};
use std::{cell::RefCell, rc::Rc};

fn as_proxy(value: &Value) -> Proxy {
    value.as_proxy().expect("expected a proxy").clone()
}

#[test]
fn map_reads_and_writes_are_keyed() {
    let map = as_proxy(&reactive(Target::map()));

    let seen = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (map, seen) = (map.clone(), seen.clone());
        move || seen.borrow_mut().push(map.get("k"))
    });
    assert_eq!(seen.borrow().as_slice(), [Value::Null]);

    map.set("k", 1);
    assert_eq!(seen.borrow().as_slice(), [Value::Null, Value::Int(1)]);

    // same value: no notification
    map.set("k", 1);
    assert_eq!(seen.borrow().len(), 2);

    // an unrelated key: no notification either
    map.set("other", 5);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn size_tracks_additions_and_clear() {
    let map = as_proxy(&reactive(Target::map()));

    let sizes = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (map, sizes) = (map.clone(), sizes.clone());
        move || sizes.borrow_mut().push(map.size())
    });
    assert_eq!(sizes.borrow().as_slice(), [0]);

    map.set("a", 1);
    map.set("b", 2);
    assert_eq!(sizes.borrow().as_slice(), [0, 1, 2]);

    // a changed value notifies iteration
    map.set("a", 9);
    assert_eq!(sizes.borrow().as_slice(), [0, 1, 2, 2]);

    map.clear();
    assert_eq!(sizes.borrow().last(), Some(&0));
}

#[test]
fn key_iteration_ignores_value_only_writes() {
    let map = as_proxy(&reactive(Target::map()));
    map.set("a", 1);

    let key_lists = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (map, key_lists) = (map.clone(), key_lists.clone());
        move || key_lists.borrow_mut().push(map.keys().len())
    });
    assert_eq!(key_lists.borrow().as_slice(), [1]);

    map.set("a", 2);
    assert_eq!(key_lists.borrow().len(), 1);

    map.set("b", 1);
    assert_eq!(key_lists.borrow().as_slice(), [1, 2]);

    map.delete("a");
    assert_eq!(key_lists.borrow().as_slice(), [1, 2, 1]);
}

#[test]
fn for_each_wraps_values_and_tracks_iteration() {
    let map = as_proxy(&reactive(Target::map()));
    map.set("inner", Target::object());

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (map, runs) = (map.clone(), runs.clone());
        move || {
            map.for_each(|value, _key| {
                assert!(is_reactive(value));
            });
            *runs.borrow_mut() += 1;
        }
    });
    assert_eq!(*runs.borrow(), 1);

    map.set("another", Target::object());
    assert_eq!(*runs.borrow(), 2);
}

#[test]
fn lookups_work_with_raw_or_reactive_keys() {
    let key_target = Target::object();
    let reactive_key = reactive(key_target.clone());

    let map = as_proxy(&reactive(Target::map()));
    map.set(Key::from_value(&reactive_key), 1);

    assert_eq!(map.get(key_target.clone()), Value::Int(1));
    assert_eq!(map.get(Key::from_value(&reactive_key)), Value::Int(1));
    assert!(map.has(key_target));
}

#[test]
fn sets_add_delete_and_membership() {
    let set = as_proxy(&reactive(Target::set()));

    let membership = Rc::new(RefCell::new(Vec::new()));
    create_effect({
        let (set, membership) = (set.clone(), membership.clone());
        move || membership.borrow_mut().push(set.has("x"))
    });
    assert_eq!(membership.borrow().as_slice(), [false]);

    set.add("x");
    assert_eq!(membership.borrow().as_slice(), [false, true]);

    // re-adding an existing element is silent
    set.add("x");
    assert_eq!(membership.borrow().len(), 2);

    set.delete(&Key::from("x"));
    assert_eq!(membership.borrow().as_slice(), [false, true, false]);
}

#[test]
fn readonly_collections_refuse_writes() {
    let raw = Target::map();
    raw.raw_set("k", 1);
    let guarded = as_proxy(&readonly(raw));

    guarded.set("k", 2);
    assert_eq!(guarded.get("k"), Value::Int(1));
    guarded.clear();
    assert_eq!(guarded.get("k"), Value::Int(1));
}

#[test]
fn weak_maps_hold_entries_while_keys_live() {
    let weak = as_proxy(&reactive(Target::weak_map()));

    let key = Target::object();
    weak.set(key.clone(), 1);
    assert_eq!(weak.get(key.clone()), Value::Int(1));

    drop(key);
    // the entry's key is gone; lookups with a fresh target miss
    let other = Target::object();
    assert_eq!(weak.get(other), Value::Null);
}
