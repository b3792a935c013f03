use crate::{
    computed::Computed,
    diagnostics::{TrackEvent, TriggerEvent},
    effect::{make_effect, EffectOptions},
    errors::{call_user, ErrorCode},
    macros::debug_warn,
    proxy::Proxy,
    reference::Ref,
    scheduler::{self, queue_job, queue_post, Job},
    value::{same_value, TargetType},
    Effect, Value,
};
use rustc_hash::FxHashSet;
use slotmap::Key as _;
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

/// When a watcher's callback runs relative to the host's flush points.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum FlushMode {
    /// Queued for the host's pre-render flush (the default).
    #[default]
    Pre,
    /// Queued for the host's post-render flush.
    Post,
    /// Runs inline, inside the mutating call.
    Sync,
}

/// Options accepted by [`watch`].
#[derive(Default)]
pub struct WatchOptions {
    /// Fire the callback once immediately on creation.
    pub immediate: bool,
    /// Recursively read the source so any nested change fires the callback.
    pub deep: bool,
    pub flush: FlushMode,
    pub on_track: Option<Rc<dyn Fn(&TrackEvent)>>,
    pub on_trigger: Option<Rc<dyn Fn(&TriggerEvent)>>,
}

/// A normalized watch source.
pub enum WatchSource {
    Ref(Ref),
    Proxy(Proxy),
    Getter(Box<dyn FnMut() -> Value>),
    Many(Vec<WatchSource>),
    Invalid,
}

impl WatchSource {
    /// Watches the value produced by a closure.
    pub fn getter(f: impl FnMut() -> Value + 'static) -> Self {
        WatchSource::Getter(Box::new(f))
    }
}

impl From<Ref> for WatchSource {
    fn from(cell: Ref) -> Self {
        WatchSource::Ref(cell)
    }
}

impl From<&Ref> for WatchSource {
    fn from(cell: &Ref) -> Self {
        WatchSource::Ref(cell.clone())
    }
}

impl From<Computed> for WatchSource {
    fn from(computed: Computed) -> Self {
        WatchSource::Ref(computed.to_ref())
    }
}

impl From<&Computed> for WatchSource {
    fn from(computed: &Computed) -> Self {
        WatchSource::Ref(computed.to_ref())
    }
}

impl From<Proxy> for WatchSource {
    fn from(proxy: Proxy) -> Self {
        WatchSource::Proxy(proxy)
    }
}

impl From<&Proxy> for WatchSource {
    fn from(proxy: &Proxy) -> Self {
        WatchSource::Proxy(proxy.clone())
    }
}

impl From<Vec<WatchSource>> for WatchSource {
    fn from(sources: Vec<WatchSource>) -> Self {
        WatchSource::Many(sources)
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        match value {
            Value::Ref(cell) => WatchSource::Ref(cell),
            Value::Proxy(proxy) => WatchSource::Proxy(proxy),
            other => {
                debug_warn!(
                    "invalid watch source: {other:?} (expected a ref, a reactive proxy, \
                     a getter, or a list of these)"
                );
                WatchSource::Invalid
            }
        }
    }
}

struct NormalizedSource {
    getter: Box<dyn FnMut() -> Value>,
    force_trigger: bool,
    multi: bool,
    force_deep: bool,
}

fn normalize_source(source: WatchSource) -> NormalizedSource {
    match source {
        WatchSource::Ref(cell) => NormalizedSource {
            force_trigger: cell.is_shallow(),
            getter: Box::new(move || cell.get()),
            multi: false,
            force_deep: false,
        },
        WatchSource::Proxy(proxy) => NormalizedSource {
            getter: Box::new(move || Value::Proxy(proxy.clone())),
            force_trigger: false,
            multi: false,
            force_deep: true,
        },
        WatchSource::Getter(mut f) => NormalizedSource {
            getter: Box::new(move || {
                call_user(ErrorCode::WatchGetter, || f()).unwrap_or(Value::Null)
            }),
            force_trigger: false,
            multi: false,
            force_deep: false,
        },
        WatchSource::Many(sources) => {
            let mut force_trigger = false;
            let mut getters: Vec<Box<dyn FnMut() -> Value>> = Vec::with_capacity(sources.len());
            for source in sources {
                match source {
                    WatchSource::Ref(cell) => {
                        force_trigger |= cell.is_shallow();
                        getters.push(Box::new(move || cell.get()));
                    }
                    WatchSource::Proxy(proxy) => {
                        force_trigger = true;
                        getters.push(Box::new(move || traverse(Value::Proxy(proxy.clone()))));
                    }
                    WatchSource::Getter(mut f) => {
                        getters.push(Box::new(move || {
                            call_user(ErrorCode::WatchGetter, || f()).unwrap_or(Value::Null)
                        }));
                    }
                    WatchSource::Many(_) | WatchSource::Invalid => {
                        debug_warn!("invalid element in multi-source watch");
                        getters.push(Box::new(|| Value::Null));
                    }
                }
            }
            NormalizedSource {
                getter: Box::new(move || {
                    Value::Target(crate::Target::array_from(
                        getters.iter_mut().map(|getter| getter()),
                    ))
                }),
                force_trigger,
                multi: true,
                force_deep: false,
            }
        }
        WatchSource::Invalid => NormalizedSource {
            getter: Box::new(|| Value::Null),
            force_trigger: false,
            multi: false,
            force_deep: false,
        },
    }
}

fn job_id(owner: Option<u64>, effect: Option<Effect>) -> u64 {
    owner
        .or_else(|| effect.map(|e| e.id.data().as_ffi()))
        .unwrap_or(0)
}

fn flush_scheduler(
    flush: FlushMode,
    owner: Option<u64>,
    effect_slot: Rc<Cell<Option<Effect>>>,
    job: Rc<dyn Fn()>,
) -> Rc<dyn Fn(Effect)> {
    match flush {
        FlushMode::Sync => Rc::new(move |_| job()),
        FlushMode::Post => Rc::new(move |_| {
            queue_post(Job::new(job_id(owner, effect_slot.get()), false, job.clone()));
        }),
        FlushMode::Pre => Rc::new(move |_| {
            queue_job(Job::new(job_id(owner, effect_slot.get()), true, job.clone()));
        }),
    }
}

fn cleanup_runner(cleanup: &Rc<RefCell<Option<Box<dyn FnOnce()>>>>) -> Box<dyn FnOnce()> {
    let cleanup = cleanup.clone();
    Box::new(move || {
        if let Some(pending) = cleanup.borrow_mut().take() {
            call_user(ErrorCode::WatchCleanup, pending);
        }
    })
}

fn elements_same(old: &Value, new: &Value) -> bool {
    match (old.as_target(), new.as_target()) {
        (Some(old), Some(new)) => {
            let old = old.array_snapshot();
            let new = new.array_snapshot();
            old.len() == new.len() && old.iter().zip(&new).all(|(a, b)| same_value(a, b))
        }
        _ => false,
    }
}

/// Watches a source and invokes `callback(new, old, on_cleanup)` when it
/// changes. `old` is `None` on an immediate first call. Returns a stop
/// handle.
///
/// ```
/// use argus_reactive::{watch, create_ref, FlushMode, WatchOptions};
/// use std::{cell::RefCell, rc::Rc};
///
/// let count = create_ref(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let stop = watch(
///     &count,
///     {
///         let log = log.clone();
///         move |new, old, _on_cleanup| {
///             log.borrow_mut().push(format!("{old:?} -> {new:?}"));
///         }
///     },
///     WatchOptions {
///         flush: FlushMode::Sync,
///         ..Default::default()
///     },
/// );
///
/// count.set(1);
/// assert_eq!(log.borrow().as_slice(), ["Some(0) -> 1"]);
///
/// stop();
/// count.set(2);
/// assert_eq!(log.borrow().len(), 1);
/// ```
pub fn watch(
    source: impl Into<WatchSource>,
    callback: impl FnMut(&Value, Option<&Value>, &dyn Fn(Box<dyn FnOnce()>)) + 'static,
    options: WatchOptions,
) -> impl Fn() + Clone {
    let WatchOptions {
        immediate,
        deep,
        flush,
        on_track,
        on_trigger,
    } = options;
    let normalized = normalize_source(source.into());
    let multi = normalized.multi;
    let force_trigger = normalized.force_trigger;
    let deep = deep || normalized.force_deep;
    let mut getter = normalized.getter;

    let body: Box<dyn FnMut() -> Value> = if deep {
        Box::new(move || traverse(getter()))
    } else {
        getter
    };

    let cleanup: Rc<RefCell<Option<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(None));
    let old_value: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let callback = Rc::new(RefCell::new(callback));
    let effect_slot: Rc<Cell<Option<Effect>>> = Rc::new(Cell::new(None));

    let job: Rc<dyn Fn()> = {
        let effect_slot = effect_slot.clone();
        let cleanup = cleanup.clone();
        let old_value = old_value.clone();
        let callback = Rc::clone(&callback);
        Rc::new(move || {
            let Some(effect) = effect_slot.get() else {
                return;
            };
            if !effect.is_active() {
                return;
            }
            let new_value = effect.run();
            let changed = deep
                || force_trigger
                || match old_value.borrow().as_ref() {
                    None => true,
                    Some(old) if multi => !elements_same(old, &new_value),
                    Some(old) => !same_value(old, &new_value),
                };
            if !changed {
                return;
            }
            if let Some(pending) = cleanup.borrow_mut().take() {
                call_user(ErrorCode::WatchCleanup, pending);
            }
            let previous = old_value.borrow_mut().replace(new_value.clone());
            let register = {
                let cleanup = cleanup.clone();
                move |f: Box<dyn FnOnce()>| {
                    *cleanup.borrow_mut() = Some(f);
                }
            };
            call_user(ErrorCode::WatchCallback, || {
                (*callback.borrow_mut())(&new_value, previous.as_ref(), &register)
            });
        })
    };

    let owner = scheduler::current_instance();
    let (effect, _) = make_effect(
        body,
        EffectOptions {
            lazy: true,
            scheduler: Some(flush_scheduler(
                flush,
                owner,
                effect_slot.clone(),
                job.clone(),
            )),
            allow_recurse: false,
            on_stop: Some(cleanup_runner(&cleanup)),
            on_track,
            on_trigger,
        },
        false,
    );
    effect_slot.set(Some(effect));
    scheduler::scope_register(effect);

    if immediate {
        job();
    } else {
        *old_value.borrow_mut() = Some(effect.run());
    }

    move || {
        effect.stop();
        scheduler::scope_unregister(effect);
    }
}

fn build_effect_watcher(
    body: Box<dyn FnMut(&dyn Fn(Box<dyn FnOnce()>))>,
    flush: FlushMode,
) -> impl Fn() + Clone {
    let cleanup: Rc<RefCell<Option<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(None));
    let body = Rc::new(RefCell::new(body));

    let effect_body: Box<dyn FnMut() -> Value> = {
        let cleanup = cleanup.clone();
        let body = body.clone();
        Box::new(move || {
            if let Some(pending) = cleanup.borrow_mut().take() {
                call_user(ErrorCode::WatchCleanup, pending);
            }
            let register = {
                let cleanup = cleanup.clone();
                move |f: Box<dyn FnOnce()>| {
                    *cleanup.borrow_mut() = Some(f);
                }
            };
            call_user(ErrorCode::WatchCallback, || {
                (*body.borrow_mut())(&register)
            });
            Value::Null
        })
    };

    let effect_slot: Rc<Cell<Option<Effect>>> = Rc::new(Cell::new(None));
    let job: Rc<dyn Fn()> = {
        let effect_slot = effect_slot.clone();
        Rc::new(move || {
            if let Some(effect) = effect_slot.get() {
                if effect.is_active() {
                    effect.run();
                }
            }
        })
    };

    let owner = scheduler::current_instance();
    let (effect, _) = make_effect(
        effect_body,
        EffectOptions {
            lazy: true,
            scheduler: Some(flush_scheduler(
                flush,
                owner,
                effect_slot.clone(),
                job.clone(),
            )),
            on_stop: Some(cleanup_runner(&cleanup)),
            ..Default::default()
        },
        false,
    );
    effect_slot.set(Some(effect));
    scheduler::scope_register(effect);

    if flush == FlushMode::Post {
        queue_post(Job::new(
            job_id(owner, Some(effect)),
            false,
            Rc::new(move || {
                effect.run();
            }),
        ));
    } else {
        effect.run();
    }

    move || {
        effect.stop();
        scheduler::scope_unregister(effect);
    }
}

/// Runs `f` immediately and re-runs it whenever anything it read changes,
/// at the pre-flush point. `f` receives an `on_cleanup` registrar invoked
/// before each re-run and on stop. Returns a stop handle.
pub fn watch_effect(
    f: impl FnMut(&dyn Fn(Box<dyn FnOnce()>)) + 'static,
) -> impl Fn() + Clone {
    build_effect_watcher(Box::new(f), FlushMode::Pre)
}

/// [`watch_effect`] scheduled at the host's post-flush point, including its
/// first run.
pub fn watch_post(f: impl FnMut(&dyn Fn(Box<dyn FnOnce()>)) + 'static) -> impl Fn() + Clone {
    build_effect_watcher(Box::new(f), FlushMode::Post)
}

/// [`watch_effect`] that re-runs synchronously, inside the mutating call.
pub fn watch_sync(f: impl FnMut(&dyn Fn(Box<dyn FnOnce()>)) + 'static) -> impl Fn() + Clone {
    build_effect_watcher(Box::new(f), FlushMode::Sync)
}

/// Recursively reads every property, element, and entry reachable from
/// `value` so a deep watcher subscribes to all of it. Cycles are broken
/// with a seen-set; traversal stops at `mark_raw`ed targets and does not
/// enter weak collections.
pub(crate) fn traverse(value: Value) -> Value {
    let mut seen = FxHashSet::default();
    traverse_inner(&value, &mut seen);
    value
}

fn traverse_inner(value: &Value, seen: &mut FxHashSet<usize>) {
    match value {
        Value::Ref(cell) => {
            if seen.insert(Rc::as_ptr(&cell.inner) as usize) {
                traverse_inner(&cell.get(), seen);
            }
        }
        Value::Proxy(proxy) => {
            let raw = proxy.raw();
            if raw.is_marked_raw() || !seen.insert(Rc::as_ptr(&raw.inner) as usize) {
                return;
            }
            match proxy.target_type() {
                TargetType::Object => {
                    for key in proxy.own_keys() {
                        traverse_inner(&proxy.get(key), seen);
                    }
                }
                TargetType::Array => {
                    for i in 0..proxy.len() {
                        traverse_inner(&proxy.get(i), seen);
                    }
                }
                TargetType::Map => {
                    for (_, entry_value) in proxy.entries() {
                        traverse_inner(&entry_value, seen);
                    }
                }
                TargetType::Set => {
                    for item in proxy.values() {
                        traverse_inner(&item, seen);
                    }
                }
                TargetType::WeakMap | TargetType::WeakSet => {}
            }
        }
        Value::Target(target) => {
            // plain structures track nothing, but may hold refs worth
            // subscribing to
            if target.is_marked_raw()
                || target.is_weak()
                || !seen.insert(Rc::as_ptr(&target.inner) as usize)
            {
                return;
            }
            for (_, entry_value) in target.raw_entries() {
                traverse_inner(&entry_value, seen);
            }
        }
        _ => {}
    }
}
