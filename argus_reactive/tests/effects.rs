#![cfg(not(feature = "ssr"))]

use argus_reactive::{
    create_effect, create_effect_with_options, create_ref, pause_tracking, reset_tracking, stop,
    untrack, Effect, EffectOptions, Value,
};
use std::{cell::{Cell, RefCell}, rc::Rc};

#[test]
fn stop_detaches_and_is_idempotent() {
    let count = create_ref(0);

    let runs = Rc::new(RefCell::new(0));
    let runner = create_effect({
        let (count, runs) = (count.clone(), runs.clone());
        move || {
            count.get();
            *runs.borrow_mut() += 1;
        }
    });
    assert_eq!(*runs.borrow(), 1);

    stop(runner);
    stop(runner);

    count.set(1);
    assert_eq!(*runs.borrow(), 1);

    // a stopped runner still evaluates, without subscribing
    runner.run();
    assert_eq!(*runs.borrow(), 2);
    count.set(2);
    assert_eq!(*runs.borrow(), 2);
}

#[test]
fn on_stop_fires_once() {
    let stops = Rc::new(RefCell::new(0));
    let runner = create_effect_with_options(
        || Value::Null,
        EffectOptions {
            on_stop: Some(Box::new({
                let stops = stops.clone();
                move || *stops.borrow_mut() += 1
            })),
            ..Default::default()
        },
    );

    runner.stop();
    runner.stop();
    assert_eq!(*stops.borrow(), 1);
}

#[test]
fn untrack_hides_reads() {
    let tracked = create_ref(0);
    let hidden = create_ref(0);

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (tracked, hidden, runs) = (tracked.clone(), hidden.clone(), runs.clone());
        move || {
            tracked.get();
            untrack(|| hidden.get());
            *runs.borrow_mut() += 1;
        }
    });
    assert_eq!(*runs.borrow(), 1);

    hidden.set(1);
    assert_eq!(*runs.borrow(), 1);

    tracked.set(1);
    assert_eq!(*runs.borrow(), 2);
}

#[test]
fn pause_and_reset_nest_and_balance() {
    let cell = create_ref(0);

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (cell, runs) = (cell.clone(), runs.clone());
        move || {
            pause_tracking();
            pause_tracking();
            cell.get();
            reset_tracking();
            cell.get();
            reset_tracking();
            // balanced: tracking is restored here
            cell.get();
            *runs.borrow_mut() += 1;
        }
    });

    cell.set(1);
    assert_eq!(*runs.borrow(), 2);
}

#[test]
fn an_effect_is_not_rescheduled_by_its_own_write() {
    let count = create_ref(0);

    let runs = Rc::new(RefCell::new(0));
    create_effect({
        let (count, runs) = (count.clone(), runs.clone());
        move || {
            *runs.borrow_mut() += 1;
            let next = count.get().as_int().unwrap_or(0) + 1;
            count.set(next);
        }
    });

    // ran once, wrote once, and did not chase its own tail
    assert_eq!(*runs.borrow(), 1);
    assert_eq!(count.get(), Value::Int(1));

    // an outside write still reschedules it
    count.set(10);
    assert_eq!(*runs.borrow(), 2);
    assert_eq!(count.get(), Value::Int(11));
}

#[test]
fn allow_recurse_reaches_the_scheduler() {
    let count = create_ref(0);

    let scheduled = Rc::new(RefCell::new(0));
    let make = |allow_recurse: bool| {
        let count = count.clone();
        let scheduled = scheduled.clone();
        create_effect_with_options(
            {
                let count = count.clone();
                move || {
                    let next = count.get().as_int().unwrap_or(0) + 1;
                    count.set(next);
                    Value::Null
                }
            },
            EffectOptions {
                allow_recurse,
                scheduler: Some(Rc::new(move |_| *scheduled.borrow_mut() += 1)),
                ..Default::default()
            },
        )
    };

    let guarded = make(false);
    assert_eq!(*scheduled.borrow(), 0);
    guarded.stop();

    let recursing = make(true);
    assert_eq!(*scheduled.borrow(), 1);
    recursing.stop();
}

#[test]
fn stopping_a_running_effect_is_deferred() {
    let count = create_ref(0);
    let slot: Rc<Cell<Option<Effect>>> = Rc::new(Cell::new(None));

    let runs = Rc::new(RefCell::new(0));
    let runner = create_effect({
        let (count, slot, runs) = (count.clone(), slot.clone(), runs.clone());
        move || {
            count.get();
            *runs.borrow_mut() += 1;
            if let Some(me) = slot.get() {
                me.stop();
                // still running: the teardown lands after this body returns
                assert!(me.is_active());
            }
        }
    });
    slot.set(Some(runner));

    count.set(1);
    assert_eq!(*runs.borrow(), 2);
    assert!(!runner.is_active());

    count.set(2);
    assert_eq!(*runs.borrow(), 2);
}

#[test]
fn runner_returns_the_body_value() {
    let cell = create_ref(2);
    let runner = create_effect_with_options(
        {
            let cell = cell.clone();
            move || cell.get()
        },
        EffectOptions::default(),
    );
    assert_eq!(runner.run(), Value::Int(2));
    cell.set(7);
    assert_eq!(runner.run(), Value::Int(7));
}
