#![cfg(not(feature = "ssr"))]

// Host integration points: queue overrides and scope registration.

use argus_reactive::{
    create_ref, set_queue_hooks, set_scope_hooks, watch, Effect, FlushMode, ScopeHooks,
    WatchOptions,
};
use std::{cell::RefCell, rc::Rc};

#[test]
fn queue_hooks_take_over_scheduling() {
    let handed_off = Rc::new(RefCell::new(Vec::new()));
    set_queue_hooks(
        Some(Rc::new({
            let handed_off = handed_off.clone();
            move |job: argus_reactive::Job| {
                handed_off.borrow_mut().push(job);
            }
        })),
        None,
    );

    let count = create_ref(0);
    let calls = Rc::new(RefCell::new(0));
    watch(
        &count,
        {
            let calls = calls.clone();
            move |_, _, _| *calls.borrow_mut() += 1
        },
        WatchOptions::default(),
    );

    count.set(1);
    // the job went to the host, not the built-in queue
    assert_eq!(handed_off.borrow().len(), 1);
    assert_eq!(*calls.borrow(), 0);
    assert!(handed_off.borrow()[0].pre);

    handed_off.borrow()[0].invoke();
    assert_eq!(*calls.borrow(), 1);

    set_queue_hooks(None, None);
}

#[test]
fn scope_hooks_observe_watcher_lifecycles() {
    let registered: Rc<RefCell<Vec<Effect>>> = Rc::new(RefCell::new(Vec::new()));
    let unregistered: Rc<RefCell<Vec<Effect>>> = Rc::new(RefCell::new(Vec::new()));
    set_scope_hooks(Some(ScopeHooks {
        register: Rc::new({
            let registered = registered.clone();
            move |effect| registered.borrow_mut().push(effect)
        }),
        unregister: Rc::new({
            let unregistered = unregistered.clone();
            move |effect| unregistered.borrow_mut().push(effect)
        }),
    }));

    let count = create_ref(0);
    let stop = watch(
        &count,
        |_, _, _| {},
        WatchOptions {
            flush: FlushMode::Sync,
            ..Default::default()
        },
    );
    assert_eq!(registered.borrow().len(), 1);
    assert!(unregistered.borrow().is_empty());

    stop();
    assert_eq!(unregistered.borrow().len(), 1);
    assert_eq!(registered.borrow()[0], unregistered.borrow()[0]);
    assert!(!unregistered.borrow()[0].is_active());

    set_scope_hooks(None);
}
