use crate::{
    diagnostics::{TrackEvent, TriggerEvent},
    effect::{make_effect, EffectOptions},
    macros::debug_warn,
    reference::{track_ref_inner, trigger_ref_inner, Ref, RefInner, RefKind},
    runtime::{with_runtime, EffectId},
    Effect, Value,
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

pub(crate) struct ComputedState {
    pub effect: Cell<Option<EffectId>>,
    pub value: RefCell<Value>,
    pub dirty: Cell<bool>,
    /// False under SSR, where every read recomputes.
    pub cacheable: bool,
    pub setter: Option<Box<dyn Fn(Value)>>,
}

/// Options accepted by [`create_computed_with_options`].
#[derive(Default)]
pub struct ComputedOptions {
    /// Makes the cell writable.
    pub setter: Option<Box<dyn Fn(Value)>>,
    pub on_track: Option<Rc<dyn Fn(&TrackEvent)>>,
    pub on_trigger: Option<Rc<dyn Fn(&TriggerEvent)>>,
}

/// A lazily recomputed observable derived from other observables.
///
/// The getter does not run until the value is read, and runs again only
/// after an upstream dependency has changed. A computed cell is ref-shaped:
/// it can be stored in reactive structures and is unwrapped like any
/// [`Ref`](crate::Ref).
#[derive(Clone)]
pub struct Computed {
    cell: Ref,
}

impl Computed {
    /// Reads the value, recomputing if an upstream change has landed since
    /// the last read.
    pub fn get(&self) -> Value {
        self.cell.get()
    }

    /// Invokes the setter; warns when the cell has none.
    pub fn set(&self, value: impl Into<Value>) {
        self.cell.set(value);
    }

    /// The cell as a plain [`Ref`], e.g. for storing inside reactive
    /// structures.
    pub fn to_ref(&self) -> Ref {
        self.cell.clone()
    }

    /// Handle to the inner effect.
    pub fn effect(&self) -> Effect {
        let RefKind::Computed(state) = &self.cell.inner.kind else {
            unreachable!("computed cell holds a computed kind");
        };
        Effect {
            id: state.effect.get().expect("computed effect is set at construction"),
        }
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Computed")
    }
}

impl From<Computed> for Value {
    fn from(computed: Computed) -> Self {
        Value::Ref(computed.cell)
    }
}

/// Creates a readonly computed cell from a getter.
///
/// ```
/// use argus_reactive::{create_computed, create_ref, Value};
///
/// let base = create_ref(2);
/// let doubled = create_computed({
///     let base = base.clone();
///     move || Value::Int(base.get().as_int().unwrap_or(0) * 2)
/// });
/// assert_eq!(doubled.get(), Value::Int(4));
/// base.set(5);
/// assert_eq!(doubled.get(), Value::Int(10));
/// ```
pub fn create_computed(getter: impl FnMut() -> Value + 'static) -> Computed {
    create_computed_with_options(getter, ComputedOptions::default())
}

/// Creates a computed cell with a write path.
pub fn create_writable_computed(
    getter: impl FnMut() -> Value + 'static,
    setter: impl Fn(Value) + 'static,
) -> Computed {
    create_computed_with_options(
        getter,
        ComputedOptions {
            setter: Some(Box::new(setter)),
            ..Default::default()
        },
    )
}

pub fn create_computed_with_options(
    getter: impl FnMut() -> Value + 'static,
    options: ComputedOptions,
) -> Computed {
    let cell = Ref::from_kind(
        RefKind::Computed(ComputedState {
            effect: Cell::new(None),
            value: RefCell::new(Value::Null),
            dirty: Cell::new(true),
            cacheable: !cfg!(feature = "ssr"),
            setter: options.setter,
        }),
        false,
    );
    // the scheduler flips the dirty bit and re-notifies subscribers; only
    // the clean -> dirty edge notifies
    let scheduler: Rc<dyn Fn(Effect)> = {
        let weak = Rc::downgrade(&cell.inner);
        Rc::new(move |_| {
            if let Some(inner) = weak.upgrade() {
                let RefKind::Computed(state) = &inner.kind else {
                    return;
                };
                if !state.dirty.get() {
                    state.dirty.set(true);
                    trigger_ref_inner(&inner, None, None);
                }
            }
        })
    };
    let (effect, _) = make_effect(
        getter,
        EffectOptions {
            lazy: true,
            scheduler: Some(scheduler),
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            ..Default::default()
        },
        true,
    );
    let RefKind::Computed(state) = &cell.inner.kind else {
        unreachable!();
    };
    state.effect.set(Some(effect.id));
    Computed { cell }
}

/// Tracked read of a computed cell: recomputes when dirty or uncacheable.
pub(crate) fn read(inner: &Rc<RefInner>) -> Value {
    track_ref_inner(inner);
    let RefKind::Computed(state) = &inner.kind else {
        unreachable!("read() is only called for computed cells");
    };
    if state.dirty.get() || !state.cacheable {
        state.dirty.set(false);
        if let Some(effect) = state.effect.get() {
            let value = with_runtime(|rt| rt.run_effect(effect));
            *state.value.borrow_mut() = value;
        }
    }
    state.value.borrow().clone()
}

pub(crate) fn write(inner: &Rc<RefInner>, value: Value) {
    let RefKind::Computed(state) = &inner.kind else {
        unreachable!("write() is only called for computed cells");
    };
    match &state.setter {
        Some(setter) => setter(value),
        None => debug_warn!("write to a computed cell without a setter was ignored"),
    }
}
