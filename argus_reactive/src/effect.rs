use crate::{
    diagnostics::{TrackEvent, TriggerEvent},
    runtime::{with_runtime, DepId, EffectId},
    Value,
};
use rustc_hash::FxHashMap;
use std::{cell::RefCell, rc::Rc};

/// Options accepted by [`create_effect_with_options`].
#[derive(Default)]
pub struct EffectOptions {
    /// Skip the initial run; the effect tracks nothing until `run()` is
    /// called.
    pub lazy: bool,
    /// When present, triggers invoke the scheduler instead of re-running the
    /// effect directly.
    pub scheduler: Option<Rc<dyn Fn(Effect)>>,
    /// Permit the effect to be re-scheduled by its own trigger.
    pub allow_recurse: bool,
    /// Invoked once when the effect is stopped.
    pub on_stop: Option<Box<dyn FnOnce()>>,
    pub on_track: Option<Rc<dyn Fn(&TrackEvent)>>,
    pub on_trigger: Option<Rc<dyn Fn(&TriggerEvent)>>,
}

pub(crate) struct EffectState {
    pub f: Rc<RefCell<dyn FnMut() -> Value>>,
    pub scheduler: Option<Rc<dyn Fn(Effect)>>,
    pub on_stop: Option<Box<dyn FnOnce()>>,
    pub on_track: Option<Rc<dyn Fn(&TrackEvent)>>,
    pub on_trigger: Option<Rc<dyn Fn(&TriggerEvent)>>,
    pub active: bool,
    pub running: bool,
    pub defer_stop: bool,
    pub allow_recurse: bool,
    /// Computed-backing effects are notified ahead of plain effects.
    pub computed: bool,
    pub parent: Option<EffectId>,
    pub run_epoch: u64,
    /// Deps this effect subscribes to, stamped with the epoch of the run
    /// that last read them.
    pub deps: FxHashMap<DepId, u64>,
}

/// Handle to a tracked computation.
///
/// Cheap to copy; the state lives in the runtime arena. Stopping an effect
/// detaches it from every dependency, after which `run()` still evaluates
/// the body but tracks nothing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Effect {
    pub(crate) id: EffectId,
}

impl Effect {
    /// Evaluates the effect body, re-collecting its dependencies.
    pub fn run(&self) -> Value {
        with_runtime(|runtime| runtime.run_effect(self.id))
    }

    /// Detaches the effect from all dependencies. Idempotent; a stop issued
    /// while the effect is running takes hold when the run finishes.
    pub fn stop(&self) {
        with_runtime(|runtime| runtime.stop_effect(self.id));
    }

    pub fn is_active(&self) -> bool {
        with_runtime(|runtime| {
            runtime
                .effects
                .borrow()
                .get(self.id)
                .map(|e| e.active)
                .unwrap_or(false)
        })
    }

    /// Stops the effect and releases its state from the runtime arena.
    /// Further calls through this handle are no-ops.
    pub fn dispose(self) {
        self.stop();
        // take the state out before dropping it, in case the body owns
        // other reactive handles whose drops re-enter the runtime
        let state = with_runtime(|runtime| runtime.effects.borrow_mut().remove(self.id));
        drop(state);
    }
}

/// Creates an effect that re-runs whenever a reactive value it reads
/// changes, and runs it once immediately.
///
/// ```
/// use argus_reactive::{create_effect, create_ref};
/// use std::{cell::RefCell, rc::Rc};
///
/// let count = create_ref(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// create_effect({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || seen.borrow_mut().push(count.get())
/// });
///
/// count.set(1);
/// # #[cfg(not(feature = "ssr"))]
/// assert_eq!(seen.borrow().len(), 2);
/// ```
pub fn create_effect(mut f: impl FnMut() + 'static) -> Effect {
    create_effect_with_options(
        move || {
            f();
            Value::Null
        },
        EffectOptions::default(),
    )
}

/// Creates an effect from a value-returning body; `run()` yields the value
/// of the latest evaluation.
pub fn create_effect_with_options(
    f: impl FnMut() -> Value + 'static,
    options: EffectOptions,
) -> Effect {
    let effect = make_effect(f, options, false);
    cfg_if::cfg_if! {
        if #[cfg(not(feature = "ssr"))] {
            if !effect.1 {
                effect.0.run();
            }
        }
    }
    effect.0
}

/// Stops an effect runner; equivalent to [`Effect::stop`].
pub fn stop(effect: Effect) {
    effect.stop();
}

pub(crate) fn make_effect(
    f: impl FnMut() -> Value + 'static,
    options: EffectOptions,
    computed: bool,
) -> (Effect, bool) {
    let lazy = options.lazy;
    let id = with_runtime(|runtime| {
        runtime.effects.borrow_mut().insert(EffectState {
            f: Rc::new(RefCell::new(f)),
            scheduler: options.scheduler,
            on_stop: options.on_stop,
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            active: !cfg!(feature = "ssr") || !computed,
            running: false,
            defer_stop: false,
            allow_recurse: options.allow_recurse,
            computed,
            parent: None,
            run_epoch: 0,
            deps: FxHashMap::default(),
        })
    });
    (Effect { id }, lazy)
}

/// Suspends dependency tracking until the matching [`reset_tracking`].
pub fn pause_tracking() {
    with_runtime(|runtime| runtime.pause_tracking());
}

/// Restores the tracking state saved by the matching [`pause_tracking`].
pub fn reset_tracking() {
    with_runtime(|runtime| runtime.reset_tracking());
}

/// Runs `f` with tracking paused, restoring the previous state on the way
/// out even if `f` panics.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _guard = PauseGuard::new();
    f()
}

/// Pauses tracking for its lifetime; drop restores.
pub(crate) struct PauseGuard;

impl PauseGuard {
    pub fn new() -> Self {
        pause_tracking();
        PauseGuard
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        reset_tracking();
    }
}
