use crate::{
    computed::ComputedState,
    proxy::to_reactive,
    runtime::{try_with_runtime, with_runtime, DepId, DepKey, TrackOp, TriggerOp},
    value::{same_value, Key},
    Value,
};
use std::{
    cell::{Cell, RefCell},
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

pub(crate) enum RefKind {
    Plain {
        value: RefCell<Value>,
        raw_value: RefCell<Value>,
    },
    Custom {
        get: Box<dyn Fn() -> Value>,
        set: Box<dyn Fn(Value)>,
    },
    Computed(ComputedState),
}

pub(crate) struct RefInner {
    pub shallow: bool,
    pub dep: Cell<Option<DepId>>,
    pub kind: RefKind,
}

impl Drop for RefInner {
    fn drop(&mut self) {
        if let Some(dep) = self.dep.get() {
            let _ = try_with_runtime(|rt| rt.drop_dep(dep));
        }
        if let RefKind::Computed(state) = &self.kind {
            if let Some(effect) = state.effect.get() {
                // take the state out before dropping it so a closure that
                // owns other refs can re-enter the runtime
                let removed = try_with_runtime(|rt| {
                    rt.stop_effect(effect);
                    rt.effects.borrow_mut().remove(effect)
                });
                drop(removed);
            }
        }
    }
}

/// A single-slot observable.
///
/// Reading through [`Ref::get`] subscribes the running effect; writing a
/// changed value (NaN-aware comparison against the raw previous value)
/// notifies dependents. Deep refs wrap structured values reactively; shallow
/// refs store exactly what they are given.
///
/// ```
/// use argus_reactive::{create_ref, Value};
///
/// let name = create_ref("ada");
/// assert_eq!(name.get(), Value::from("ada"));
/// name.set("grace");
/// assert_eq!(name.get(), Value::from("grace"));
/// ```
#[derive(Clone)]
pub struct Ref {
    pub(crate) inner: Rc<RefInner>,
}

impl Ref {
    pub(crate) fn from_kind(kind: RefKind, shallow: bool) -> Ref {
        Ref {
            inner: Rc::new(RefInner {
                shallow,
                dep: Cell::new(None),
                kind,
            }),
        }
    }

    /// Reads the current value, tracking the access.
    pub fn get(&self) -> Value {
        match &self.inner.kind {
            RefKind::Plain { value, .. } => {
                track_ref_inner(&self.inner);
                value.borrow().clone()
            }
            RefKind::Custom { get, .. } => get(),
            RefKind::Computed(_) => crate::computed::read(&self.inner),
        }
    }

    /// Writes a value, triggering dependents when it actually changed.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        match &self.inner.kind {
            RefKind::Plain {
                value: slot,
                raw_value,
            } => {
                let direct =
                    self.inner.shallow || crate::is_shallow(&value) || crate::is_readonly(&value);
                let new_raw = if direct {
                    value.clone()
                } else {
                    crate::to_raw(&value)
                };
                let changed = !same_value(&new_raw, &raw_value.borrow());
                if changed {
                    let old = raw_value.borrow().clone();
                    *raw_value.borrow_mut() = new_raw.clone();
                    *slot.borrow_mut() = if direct { value } else { to_reactive(new_raw.clone()) };
                    trigger_ref_inner(&self.inner, Some(new_raw), Some(old));
                }
            }
            RefKind::Custom { set, .. } => set(value),
            RefKind::Computed(_) => crate::computed::write(&self.inner, value),
        }
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    /// Computed cells without a setter refuse writes.
    pub(crate) fn is_readonly(&self) -> bool {
        match &self.inner.kind {
            RefKind::Computed(state) => state.setter.is_none(),
            _ => false,
        }
    }

}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            RefKind::Plain { value, .. } => write!(f, "Ref({:?})", value.borrow()),
            RefKind::Custom { .. } => write!(f, "CustomRef"),
            RefKind::Computed(_) => write!(f, "Computed"),
        }
    }
}

/// Creates a deep reference cell: structured values are stored reactive.
pub fn create_ref(value: impl Into<Value>) -> Ref {
    let value = value.into();
    Ref::from_kind(
        RefKind::Plain {
            raw_value: RefCell::new(crate::to_raw(&value)),
            value: RefCell::new(to_reactive(value)),
        },
        false,
    )
}

/// Creates a shallow reference cell: the value is stored untouched and only
/// whole-value assignment is observable.
pub fn create_shallow_ref(value: impl Into<Value>) -> Ref {
    let value = value.into();
    Ref::from_kind(
        RefKind::Plain {
            raw_value: RefCell::new(value.clone()),
            value: RefCell::new(value),
        },
        true,
    )
}

/// Creates a reference cell whose tracking is under caller control.
///
/// The factory receives `track` and `trigger` handles and returns the
/// getter/setter pair.
///
/// ```
/// use argus_reactive::{create_custom_ref, Value};
/// use std::{cell::RefCell, rc::Rc};
///
/// let stored = Rc::new(RefCell::new(Value::Int(0)));
/// let cell = create_custom_ref(|track, trigger| {
///     let read = stored.clone();
///     let write = stored.clone();
///     (
///         Box::new(move || {
///             track();
///             read.borrow().clone()
///         }),
///         Box::new(move |value| {
///             *write.borrow_mut() = value;
///             trigger();
///         }),
///     )
/// });
/// cell.set(2);
/// assert_eq!(cell.get(), Value::Int(2));
/// ```
pub fn create_custom_ref<F>(factory: F) -> Ref
where
    F: FnOnce(Rc<dyn Fn()>, Rc<dyn Fn()>) -> (Box<dyn Fn() -> Value>, Box<dyn Fn(Value)>),
{
    let inner = Rc::new_cyclic(|weak: &std::rc::Weak<RefInner>| {
        let track = {
            let weak = weak.clone();
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    track_ref_inner(&inner);
                }
            }) as Rc<dyn Fn()>
        };
        let trigger = {
            let weak = weak.clone();
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    trigger_ref_inner(&inner, None, None);
                }
            }) as Rc<dyn Fn()>
        };
        let (get, set) = factory(track, trigger);
        RefInner {
            shallow: false,
            dep: Cell::new(None),
            kind: RefKind::Custom { get, set },
        }
    });
    Ref { inner }
}

/// Whether a value is a reference cell (computed cells included).
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// Returns the inner value of a ref (tracked), or the value itself.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

/// Forces a ref's dependents to re-run, regardless of value comparison.
/// Useful after mutating the inner value of a shallow ref in place.
pub fn trigger_ref(cell: &Ref) {
    trigger_ref_inner(&cell.inner, None, None);
}

/// Subscribes the running effect to a ref's private dep.
pub(crate) fn track_ref_inner(inner: &Rc<RefInner>) {
    with_runtime(|rt| {
        if !rt.tracking.get() || rt.observer.get().is_none() {
            return;
        }
        let dep = match inner.dep.get() {
            Some(dep) => dep,
            None => {
                let dep = rt.create_dep();
                inner.dep.set(Some(dep));
                dep
            }
        };
        rt.track_dep(dep, None, TrackOp::Get, DepKey::Key(Key::from("value")));
    });
}

/// Notifies everything subscribed to a ref's private dep.
pub(crate) fn trigger_ref_inner(inner: &Rc<RefInner>, new_value: Option<Value>, old_value: Option<Value>) {
    if let Some(dep) = inner.dep.get() {
        with_runtime(|rt| {
            rt.trigger_dep(
                dep,
                None,
                TriggerOp::Set,
                Some(DepKey::Key(Key::from("value"))),
                new_value,
                old_value,
            );
        });
    }
}
