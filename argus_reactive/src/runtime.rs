use crate::{
    diagnostics::{TrackEvent, TriggerEvent},
    effect::EffectState,
    errors::{self, ErrorCode},
    value::{Key, Target, TargetInner},
    Effect, Value,
};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use std::{
    cell::{Cell, RefCell},
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Weak,
};

new_key_type! {
    /// Unique ID assigned to a dependency set.
    pub struct DepId;

    /// Unique ID assigned to an effect.
    pub struct EffectId;
}

/// The kind of read being tracked.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// The kind of write being triggered.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

/// The key a dependency is registered under.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DepKey {
    /// An ordinary property or collection key.
    Key(Key),
    /// The array length pseudo-key.
    Length,
    /// Sentinel for iteration (`own_keys`, `size`, `for_each`, entries).
    Iterate,
    /// Sentinel for map key iteration, which `SET` must not disturb.
    MapKeyIterate,
}

/// The set of effects subscribed to one (target, key) pair.
pub(crate) struct Dep {
    /// Insertion-ordered; notification walks this order.
    pub subscribers: IndexSet<EffectId>,
    pub version: u64,
}

impl Dep {
    fn new() -> Self {
        Dep {
            subscribers: IndexSet::new(),
            version: 0,
        }
    }
}

pub(crate) struct TargetDeps {
    pub target: Weak<TargetInner>,
    pub keys: FxHashMap<DepKey, DepId>,
}

pub(crate) struct Runtime {
    pub effects: RefCell<SlotMap<EffectId, EffectState>>,
    pub deps: RefCell<SlotMap<DepId, Dep>>,
    pub targets: RefCell<FxHashMap<u64, TargetDeps>>,
    /// Top of the active-effect stack; the chain continues through each
    /// effect's `parent` link.
    pub observer: Cell<Option<EffectId>>,
    pub tracking: Cell<bool>,
    pub track_stack: RefCell<Vec<bool>>,
    pub epoch: Cell<u64>,
    sweep_at: Cell<usize>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

pub(crate) fn with_runtime<T>(f: impl FnOnce(&Runtime) -> T) -> T {
    RUNTIME.with(f)
}

/// Same as [`with_runtime`] but survives thread teardown; used from `Drop`
/// impls.
pub(crate) fn try_with_runtime<T>(f: impl FnOnce(&Runtime) -> T) -> Option<T> {
    RUNTIME.try_with(f).ok()
}

impl Runtime {
    fn new() -> Self {
        Runtime {
            effects: RefCell::new(SlotMap::with_key()),
            deps: RefCell::new(SlotMap::with_key()),
            targets: RefCell::new(FxHashMap::default()),
            observer: Cell::new(None),
            tracking: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
            epoch: Cell::new(0),
            sweep_at: Cell::new(64),
        }
    }

    pub fn pause_tracking(&self) {
        self.track_stack.borrow_mut().push(self.tracking.get());
        self.tracking.set(false);
    }

    pub fn reset_tracking(&self) {
        let prev = self.track_stack.borrow_mut().pop().unwrap_or(true);
        self.tracking.set(prev);
    }

    /// Looks up or creates the dep for `(target, key)`.
    fn dep_for(&self, target: &Target, key: DepKey) -> DepId {
        let mut targets = self.targets.borrow_mut();
        if targets.len() >= self.sweep_at.get() {
            self.sweep_dead_targets(&mut targets);
        }
        let entry = targets.entry(target.id()).or_insert_with(|| TargetDeps {
            target: target.downgrade(),
            keys: FxHashMap::default(),
        });
        *entry
            .keys
            .entry(key)
            .or_insert_with(|| self.deps.borrow_mut().insert(Dep::new()))
    }

    /// Drops registry entries whose target has been collected, detaching any
    /// effects still subscribed to them.
    fn sweep_dead_targets(&self, targets: &mut FxHashMap<u64, TargetDeps>) {
        let mut dead_deps = Vec::new();
        targets.retain(|_, entry| {
            if entry.target.strong_count() > 0 {
                true
            } else {
                dead_deps.extend(entry.keys.values().copied());
                false
            }
        });
        if !dead_deps.is_empty() {
            let mut deps = self.deps.borrow_mut();
            let mut effects = self.effects.borrow_mut();
            for dep_id in dead_deps {
                if let Some(dep) = deps.remove(dep_id) {
                    for effect_id in dep.subscribers {
                        if let Some(effect) = effects.get_mut(effect_id) {
                            effect.deps.remove(&dep_id);
                        }
                    }
                }
            }
        }
        self.sweep_at.set((targets.len() * 2).max(64));
    }

    /// Records an edge from the running effect onto `(target, key)`.
    pub fn track(&self, target: &Target, op: TrackOp, key: DepKey) {
        if !self.tracking.get() || self.observer.get().is_none() {
            return;
        }
        let dep_id = self.dep_for(target, key.clone());
        self.track_dep(dep_id, Some(target.id()), op, key);
    }

    /// The dep-level half of [`track`], shared with reference cells (whose
    /// dep has no registry entry).
    pub fn track_dep(&self, dep_id: DepId, target: Option<u64>, op: TrackOp, key: DepKey) {
        if !self.tracking.get() {
            return;
        }
        let Some(observer) = self.observer.get() else {
            return;
        };
        let newly_tracked = {
            let mut effects = self.effects.borrow_mut();
            let Some(effect) = effects.get_mut(observer) else {
                return;
            };
            let epoch = effect.run_epoch;
            effect.deps.insert(dep_id, epoch) != Some(epoch)
        };
        let version = {
            let mut deps = self.deps.borrow_mut();
            let Some(dep) = deps.get_mut(dep_id) else {
                return;
            };
            dep.subscribers.insert(observer);
            dep.version
        };
        if newly_tracked {
            let hook = self
                .effects
                .borrow()
                .get(observer)
                .and_then(|e| e.on_track.clone());
            if let Some(hook) = hook {
                hook(&TrackEvent {
                    effect: Effect { id: observer },
                    target,
                    op,
                    key,
                    dep_version: version,
                });
            }
        }
    }

    pub(crate) fn create_dep(&self) -> DepId {
        self.deps.borrow_mut().insert(Dep::new())
    }

    /// Removes a dep from the arena, detaching subscribed effects. Called
    /// when a reference cell is dropped.
    pub(crate) fn drop_dep(&self, dep_id: DepId) {
        let dep = self.deps.borrow_mut().remove(dep_id);
        if let Some(dep) = dep {
            let mut effects = self.effects.borrow_mut();
            for effect_id in dep.subscribers {
                if let Some(effect) = effects.get_mut(effect_id) {
                    effect.deps.remove(&dep_id);
                }
            }
        }
    }

    /// Collects and notifies every effect affected by a write to
    /// `(target, key)`.
    pub fn trigger(
        &self,
        target: &Target,
        op: TriggerOp,
        key: Option<DepKey>,
        new_value: Option<Value>,
        old_value: Option<Value>,
    ) {
        let mut dep_ids: Vec<DepId> = Vec::new();
        {
            let targets = self.targets.borrow();
            let Some(entry) = targets.get(&target.id()) else {
                return;
            };
            if op == TriggerOp::Clear {
                // everything the target has ever been tracked by
                dep_ids.extend(entry.keys.values().copied());
            } else if op == TriggerOp::Set && key == Some(DepKey::Length) {
                // array length write: the length dep plus every index at or
                // past the new length
                let new_len = new_value.as_ref().and_then(Value::as_int).unwrap_or(0);
                dep_ids.extend(entry.keys.get(&DepKey::Length).copied());
                for (dep_key, dep) in &entry.keys {
                    if let DepKey::Key(Key::Int(i)) = dep_key {
                        if *i >= new_len {
                            dep_ids.push(*dep);
                        }
                    }
                }
            } else {
                if let Some(key) = &key {
                    dep_ids.extend(entry.keys.get(key).copied());
                }
                match op {
                    TriggerOp::Add | TriggerOp::Delete => {
                        if !target.is_array() {
                            dep_ids.extend(entry.keys.get(&DepKey::Iterate).copied());
                            if target.is_map() {
                                dep_ids.extend(entry.keys.get(&DepKey::MapKeyIterate).copied());
                            }
                        } else if matches!(&key, Some(DepKey::Key(Key::Int(_)))) {
                            dep_ids.extend(entry.keys.get(&DepKey::Length).copied());
                        }
                    }
                    TriggerOp::Set => {
                        if target.is_map() {
                            dep_ids.extend(entry.keys.get(&DepKey::Iterate).copied());
                        }
                    }
                    TriggerOp::Clear => unreachable!(),
                }
            }
        }
        self.notify_deps(dep_ids, Some(target.id()), op, key, new_value, old_value);
    }

    /// The dep-level half of [`trigger`], shared with reference cells.
    pub fn trigger_dep(
        &self,
        dep_id: DepId,
        target: Option<u64>,
        op: TriggerOp,
        key: Option<DepKey>,
        new_value: Option<Value>,
        old_value: Option<Value>,
    ) {
        self.notify_deps(vec![dep_id], target, op, key, new_value, old_value);
    }

    fn notify_deps(
        &self,
        dep_ids: Vec<DepId>,
        target: Option<u64>,
        op: TriggerOp,
        key: Option<DepKey>,
        new_value: Option<Value>,
        old_value: Option<Value>,
    ) {
        // Flatten to a unique effect list, computed effects first so their
        // dirty bit is set before anything downstream reads them.
        let mut scheduled: IndexSet<EffectId> = IndexSet::new();
        let mut computed_effects = Vec::new();
        let mut plain_effects = Vec::new();
        {
            let mut deps = self.deps.borrow_mut();
            let effects = self.effects.borrow();
            for dep_id in dep_ids {
                let Some(dep) = deps.get_mut(dep_id) else {
                    continue;
                };
                dep.version += 1;
                for &effect_id in &dep.subscribers {
                    if !scheduled.insert(effect_id) {
                        continue;
                    }
                    if let Some(effect) = effects.get(effect_id) {
                        if effect.computed {
                            computed_effects.push(effect_id);
                        } else {
                            plain_effects.push(effect_id);
                        }
                    }
                }
            }
        }
        for effect_id in computed_effects.into_iter().chain(plain_effects) {
            self.notify_effect(effect_id, target, op, &key, &new_value, &old_value);
        }
    }

    fn notify_effect(
        &self,
        effect_id: EffectId,
        target: Option<u64>,
        op: TriggerOp,
        key: &Option<DepKey>,
        new_value: &Option<Value>,
        old_value: &Option<Value>,
    ) {
        let Some((active, allow_recurse, scheduler, on_trigger)) =
            self.effects.borrow().get(effect_id).map(|e| {
                (
                    e.active,
                    e.allow_recurse,
                    e.scheduler.clone(),
                    e.on_trigger.clone(),
                )
            })
        else {
            return;
        };
        if !active {
            return;
        }
        // an effect is never re-entered by its own trigger
        if self.observer.get() == Some(effect_id) && !allow_recurse {
            return;
        }
        if let Some(hook) = on_trigger {
            hook(&TriggerEvent {
                effect: Effect { id: effect_id },
                target,
                op,
                key: key.clone(),
                new_value: new_value.clone(),
                old_value: old_value.clone(),
            });
        }
        match scheduler {
            Some(scheduler) => {
                // best effort: one throwing scheduler must not starve the
                // rest of the batch
                let result = catch_unwind(AssertUnwindSafe(|| scheduler(Effect { id: effect_id })));
                if let Err(payload) = result {
                    errors::report_panic(ErrorCode::Scheduler, payload);
                }
            }
            None => {
                self.run_effect(effect_id);
            }
        }
    }

    /// Executes an effect body while tracking its reads.
    pub fn run_effect(&self, effect_id: EffectId) -> Value {
        let Some((f, active, allow_recurse)) = self
            .effects
            .borrow()
            .get(effect_id)
            .map(|e| (e.f.clone(), e.active, e.allow_recurse))
        else {
            return Value::Null;
        };
        if !active {
            // stopped runners still evaluate, without tracking
            return (&mut *f.borrow_mut())();
        }
        {
            // cycle guard: refuse to re-enter an effect already on the stack
            let effects = self.effects.borrow();
            let mut cursor = self.observer.get();
            while let Some(running) = cursor {
                if running == effect_id {
                    if !allow_recurse {
                        return Value::Null;
                    }
                    break;
                }
                cursor = effects.get(running).and_then(|e| e.parent);
            }
        }
        let prev_observer = self.observer.replace(Some(effect_id));
        let prev_tracking = self.tracking.replace(true);
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        {
            let mut effects = self.effects.borrow_mut();
            if let Some(effect) = effects.get_mut(effect_id) {
                effect.parent = prev_observer;
                effect.run_epoch = epoch;
                effect.running = true;
            }
        }
        let guard = RunGuard {
            runtime: self,
            effect_id,
            prev_observer,
            prev_tracking,
        };
        let value = (&mut *f.borrow_mut())();
        drop(guard);
        value
    }

    /// Post-run bookkeeping: restore is handled by [`RunGuard`]; this sweeps
    /// deps the run did not re-stamp and honors a deferred stop.
    fn finish_run(&self, effect_id: EffectId) {
        let (stale, defer_stop) = {
            let mut effects = self.effects.borrow_mut();
            let Some(effect) = effects.get_mut(effect_id) else {
                return;
            };
            effect.running = false;
            effect.parent = None;
            let epoch = effect.run_epoch;
            let mut stale = Vec::new();
            effect.deps.retain(|dep_id, stamp| {
                if *stamp == epoch {
                    true
                } else {
                    stale.push(*dep_id);
                    false
                }
            });
            (stale, effect.defer_stop)
        };
        if !stale.is_empty() {
            let mut deps = self.deps.borrow_mut();
            for dep_id in stale {
                if let Some(dep) = deps.get_mut(dep_id) {
                    dep.subscribers.shift_remove(&effect_id);
                }
            }
        }
        if defer_stop {
            self.stop_effect(effect_id);
        }
    }

    /// Detaches an effect from every dep and deactivates it. Idempotent;
    /// a stop issued mid-run is deferred to the end of that run.
    pub fn stop_effect(&self, effect_id: EffectId) {
        let (dep_ids, on_stop) = {
            let mut effects = self.effects.borrow_mut();
            let Some(effect) = effects.get_mut(effect_id) else {
                return;
            };
            if effect.running {
                effect.defer_stop = true;
                return;
            }
            if !effect.active {
                return;
            }
            effect.active = false;
            effect.defer_stop = false;
            let dep_ids: Vec<DepId> = effect.deps.drain().map(|(dep, _)| dep).collect();
            (dep_ids, effect.on_stop.take())
        };
        {
            let mut deps = self.deps.borrow_mut();
            for dep_id in dep_ids {
                if let Some(dep) = deps.get_mut(dep_id) {
                    dep.subscribers.shift_remove(&effect_id);
                }
            }
        }
        if let Some(on_stop) = on_stop {
            on_stop();
        }
    }
}

/// Restores the observer stack and tracking flag on every exit path.
struct RunGuard<'a> {
    runtime: &'a Runtime,
    effect_id: EffectId,
    prev_observer: Option<EffectId>,
    prev_tracking: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runtime.observer.set(self.prev_observer);
        self.runtime.tracking.set(self.prev_tracking);
        self.runtime.finish_run(self.effect_id);
    }
}
