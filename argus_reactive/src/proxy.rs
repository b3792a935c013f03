use crate::{
    collections,
    effect::PauseGuard,
    macros::debug_warn,
    runtime::{with_runtime, DepKey, TrackOp, TriggerOp},
    value::{same_value, Key, Target},
    Value,
};
use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

/// Reserved flag keys, readable through any proxy's `get` trap. The prefix
/// keeps them out of the way of user keys.
pub const FLAG_SKIP: &str = "__r_skip";
pub const FLAG_IS_REACTIVE: &str = "__r_isReactive";
pub const FLAG_IS_READONLY: &str = "__r_isReadonly";
pub const FLAG_IS_SHALLOW: &str = "__r_isShallow";
pub const FLAG_RAW: &str = "__r_raw";

/// The four handler flavors. Every trap dispatches on this.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Flavor {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl Flavor {
    pub(crate) fn readonly(self) -> bool {
        matches!(self, Flavor::Readonly | Flavor::ShallowReadonly)
    }

    pub(crate) fn shallow(self) -> bool {
        matches!(self, Flavor::ShallowReactive | Flavor::ShallowReadonly)
    }

    fn cache_index(self) -> usize {
        match self {
            Flavor::Reactive => 0,
            Flavor::ShallowReactive => 1,
            Flavor::Readonly => 2,
            Flavor::ShallowReadonly => 3,
        }
    }

    /// Index into the wrapper cache of a base proxy (readonly flavors only).
    fn wrapper_index(self) -> usize {
        match self {
            Flavor::Readonly => 0,
            Flavor::ShallowReadonly => 1,
            _ => unreachable!("only readonly flavors wrap other proxies"),
        }
    }
}

pub(crate) struct ProxyInner {
    pub target: Target,
    /// Set when this proxy wraps another proxy (a readonly view of a
    /// reactive one); reads delegate through it so tracking still happens.
    pub base: Option<Proxy>,
    pub flavor: Flavor,
    /// Weak cache slots for readonly wrappers built over this proxy.
    pub wrappers: RefCell<[Option<Weak<ProxyInner>>; 2]>,
}

/// A reactive (or readonly) view over a [`Target`].
///
/// All reads through a proxy are tracked against the running effect and all
/// writes trigger dependents, per the proxy's flavor. Proxies are deduped:
/// wrapping the same target in the same flavor twice yields the same proxy.
#[derive(Clone)]
pub struct Proxy {
    pub(crate) inner: Rc<ProxyInner>,
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.inner.flavor, self.inner.target)
    }
}

/// Returns a deep mutable proxy over `value`. Non-target input is returned
/// unchanged with a dev warning; an existing proxy is returned as-is.
///
/// ```
/// use argus_reactive::{object, reactive, Value};
///
/// let state = reactive(object! { "count" => 0 });
/// let state = state.as_proxy().unwrap();
/// state.set("count", 1);
/// assert_eq!(state.get("count"), Value::Int(1));
/// ```
pub fn reactive(value: impl Into<Value>) -> Value {
    create_proxy(value.into(), Flavor::Reactive)
}

/// Like [`reactive`], but nested structures are not wrapped on read.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
    create_proxy(value.into(), Flavor::ShallowReactive)
}

/// Returns a deep readonly proxy. Writes warn and are ignored. A readonly
/// view of a reactive proxy still tracks reads through the inner proxy.
pub fn readonly(value: impl Into<Value>) -> Value {
    create_proxy(value.into(), Flavor::Readonly)
}

/// Like [`readonly`], but only the root level is protected.
pub fn shallow_readonly(value: impl Into<Value>) -> Value {
    create_proxy(value.into(), Flavor::ShallowReadonly)
}

fn create_proxy(value: Value, flavor: Flavor) -> Value {
    match value {
        Value::Target(target) => {
            if target.is_marked_raw() {
                return Value::Target(target);
            }
            Value::Proxy(proxy_for_target(target, flavor))
        }
        Value::Proxy(proxy) => {
            if flavor.readonly() && !proxy.inner.flavor.readonly() {
                Value::Proxy(wrap_readonly(&proxy, flavor))
            } else {
                Value::Proxy(proxy)
            }
        }
        other => {
            debug_warn!("value cannot be made reactive: {other:?}");
            other
        }
    }
}

fn proxy_for_target(target: Target, flavor: Flavor) -> Proxy {
    let index = flavor.cache_index();
    if let Some(existing) = target.inner.proxies.borrow()[index]
        .as_ref()
        .and_then(Weak::upgrade)
    {
        return Proxy { inner: existing };
    }
    let inner = Rc::new(ProxyInner {
        target: target.clone(),
        base: None,
        flavor,
        wrappers: RefCell::new([None, None]),
    });
    target.inner.proxies.borrow_mut()[index] = Some(Rc::downgrade(&inner));
    Proxy { inner }
}

fn wrap_readonly(base: &Proxy, flavor: Flavor) -> Proxy {
    let index = flavor.wrapper_index();
    if let Some(existing) = base.inner.wrappers.borrow()[index]
        .as_ref()
        .and_then(Weak::upgrade)
    {
        return Proxy { inner: existing };
    }
    let inner = Rc::new(ProxyInner {
        target: base.raw(),
        base: Some(base.clone()),
        flavor,
        wrappers: RefCell::new([None, None]),
    });
    base.inner.wrappers.borrow_mut()[index] = Some(Rc::downgrade(&inner));
    Proxy { inner }
}

/// Whether a value is a mutable reactive proxy (looking through readonly
/// wrappers).
pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => {
            if p.get(FLAG_IS_READONLY).as_bool().unwrap_or(false) {
                is_reactive(&p.get(FLAG_RAW))
            } else {
                p.get(FLAG_IS_REACTIVE).as_bool().unwrap_or(false)
            }
        }
        _ => false,
    }
}

/// Whether a value refuses writes: a readonly proxy, or a computed cell
/// without a setter.
pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.get(FLAG_IS_READONLY).as_bool().unwrap_or(false),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

/// Whether a value is a shallow proxy or a shallow reference cell.
pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.get(FLAG_IS_SHALLOW).as_bool().unwrap_or(false),
        Value::Ref(r) => r.is_shallow(),
        _ => false,
    }
}

/// Whether a value is a proxy of any flavor.
pub fn is_proxy(value: &Value) -> bool {
    is_reactive(value) || is_readonly(value)
}

/// Follows the raw flag all the way down to the original value.
pub fn to_raw(value: &Value) -> Value {
    if let Value::Proxy(p) = value {
        let raw = p.get(FLAG_RAW);
        if !raw.is_null() {
            return to_raw(&raw);
        }
    }
    value.clone()
}

/// Marks a target opaque: it will never be wrapped by [`reactive`] or
/// [`readonly`], and deep traversal stops at it.
pub fn mark_raw(value: Value) -> Value {
    if let Value::Target(t) = &value {
        t.mark_skip();
    }
    value
}

pub(crate) fn to_reactive(value: Value) -> Value {
    match value {
        v @ (Value::Target(_) | Value::Proxy(_)) => reactive(v),
        v => v,
    }
}

pub(crate) fn to_readonly(value: Value) -> Value {
    match value {
        v @ (Value::Target(_) | Value::Proxy(_)) => readonly(v),
        v => v,
    }
}

impl Proxy {
    /// The ultimate raw target behind this proxy.
    pub fn raw(&self) -> Target {
        self.inner.target.clone()
    }

    pub fn target_type(&self) -> crate::TargetType {
        self.inner.target.ty()
    }

    pub fn is_readonly_flavor(&self) -> bool {
        self.inner.flavor.readonly()
    }

    pub(crate) fn flavor(&self) -> Flavor {
        self.inner.flavor
    }

    /// Wraps a value produced by a deep read, per this proxy's flavor.
    pub(crate) fn wrap_nested(&self, value: Value) -> Value {
        if self.inner.flavor.shallow() {
            value
        } else if self.inner.flavor.readonly() {
            to_readonly(value)
        } else {
            to_reactive(value)
        }
    }

    fn cache_slot_matches(&self) -> bool {
        match &self.inner.base {
            None => self.inner.target.inner.proxies.borrow()[self.inner.flavor.cache_index()]
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|cached| Rc::ptr_eq(&cached, &self.inner))
                .unwrap_or(false),
            Some(base) => base.inner.wrappers.borrow()[self.inner.flavor.wrapper_index()]
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|cached| Rc::ptr_eq(&cached, &self.inner))
                .unwrap_or(false),
        }
    }

    fn flag_lookup(&self, key: &Key) -> Option<Value> {
        match key.as_str()? {
            FLAG_SKIP => Some(Value::Bool(self.inner.target.is_marked_raw())),
            FLAG_IS_REACTIVE => Some(Value::Bool(!self.inner.flavor.readonly())),
            FLAG_IS_READONLY => Some(Value::Bool(self.inner.flavor.readonly())),
            FLAG_IS_SHALLOW => Some(Value::Bool(self.inner.flavor.shallow())),
            FLAG_RAW => {
                // only answer the canonical proxy for this flavor
                if self.cache_slot_matches() {
                    Some(match &self.inner.base {
                        Some(base) => Value::Proxy(base.clone()),
                        None => Value::Target(self.inner.target.clone()),
                    })
                } else {
                    Some(Value::Null)
                }
            }
            _ => None,
        }
    }

    /// Reads a property or collection entry, tracking the access.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        if let Some(flag) = self.flag_lookup(&key) {
            return flag;
        }
        if let Some(base) = &self.inner.base {
            return self.wrap_nested(base.get(key));
        }
        if self.inner.target.is_collection() {
            collections::get(self, &key)
        } else {
            base::get(self, key)
        }
    }

    /// Writes a property or map entry. On readonly proxies the write is
    /// ignored with a dev warning, and reported as successful.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.inner.flavor.readonly() {
            debug_warn!("set of key {key:?} on readonly {self:?} was ignored");
            return true;
        }
        if self.inner.target.is_collection() {
            collections::map_set(self, key, value.into())
        } else {
            base::set(self, key, value.into())
        }
    }

    /// Membership test, tracked unless the key is a reserved flag.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.flag_lookup(&key).is_some() {
            return false;
        }
        if let Some(base) = &self.inner.base {
            return base.has(key);
        }
        if self.inner.target.is_collection() {
            collections::has(self, &key)
        } else {
            base::has(self, key)
        }
    }

    /// Deletes a property or collection entry.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.inner.flavor.readonly() {
            debug_warn!("delete of key {key:?} on readonly {self:?} was ignored");
            return true;
        }
        if self.inner.target.is_collection() {
            collections::delete(self, &key)
        } else {
            base::delete(self, key)
        }
    }

    /// Lists the target's own keys, tracking iteration.
    pub fn own_keys(&self) -> Vec<Key> {
        if let Some(base) = &self.inner.base {
            return base.own_keys();
        }
        let target = &self.inner.target;
        if !self.inner.flavor.readonly() {
            let dep_key = if target.is_array() {
                DepKey::Length
            } else if target.is_map() {
                DepKey::MapKeyIterate
            } else {
                DepKey::Iterate
            };
            with_runtime(|rt| rt.track(target, TrackOp::Iterate, dep_key));
        }
        target.raw_keys()
    }

    /// Array length or collection size, tracked.
    pub fn len(&self) -> usize {
        if let Some(base) = &self.inner.base {
            return base.len();
        }
        let target = &self.inner.target;
        match target.ty() {
            crate::TargetType::Array => {
                if !self.inner.flavor.readonly() {
                    with_runtime(|rt| rt.track(target, TrackOp::Get, DepKey::Length));
                }
                target.raw_len()
            }
            crate::TargetType::Map | crate::TargetType::Set => self.size(),
            other => panic!("len() is not defined for {other:?} targets"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes an array's length directly, truncating or null-filling.
    pub fn set_length(&self, new_len: usize) -> bool {
        self.expect_array("set_length");
        if self.inner.flavor.readonly() {
            debug_warn!("set_length on readonly {self:?} was ignored");
            return true;
        }
        base::set_length(self, new_len)
    }

    // -- array method shims ------------------------------------------------

    /// Appends an element; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.expect_array("push");
        if self.inner.flavor.readonly() {
            debug_warn!("push on readonly {self:?} was ignored");
            return self.inner.target.raw_len();
        }
        base::mutate(self, base::ArrayMethod::Push(value.into())).1
    }

    /// Removes and returns the last element, or null when empty.
    pub fn pop(&self) -> Value {
        self.expect_array("pop");
        if self.inner.flavor.readonly() {
            debug_warn!("pop on readonly {self:?} was ignored");
            return Value::Null;
        }
        base::mutate(self, base::ArrayMethod::Pop).0
    }

    /// Removes and returns the first element, or null when empty.
    pub fn shift(&self) -> Value {
        self.expect_array("shift");
        if self.inner.flavor.readonly() {
            debug_warn!("shift on readonly {self:?} was ignored");
            return Value::Null;
        }
        base::mutate(self, base::ArrayMethod::Shift).0
    }

    /// Prepends an element; returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        self.expect_array("unshift");
        if self.inner.flavor.readonly() {
            debug_warn!("unshift on readonly {self:?} was ignored");
            return self.inner.target.raw_len();
        }
        base::mutate(self, base::ArrayMethod::Unshift(value.into())).1
    }

    /// Removes `delete_count` elements at `start`, inserting `items` in
    /// their place; returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        self.expect_array("splice");
        if self.inner.flavor.readonly() {
            debug_warn!("splice on readonly {self:?} was ignored");
            return Vec::new();
        }
        base::splice(self, start, delete_count, items)
    }

    /// Identity-aware membership test; tracks every element.
    pub fn includes(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    /// First index holding `value`, searching raw contents; a proxy argument
    /// that misses is retried with its raw target.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.expect_array("index_of");
        if let Some(base) = &self.inner.base {
            return base.index_of(value);
        }
        base::search(self, value, false)
    }

    /// Last index holding `value`.
    pub fn last_index_of(&self, value: &Value) -> Option<usize> {
        self.expect_array("last_index_of");
        if let Some(base) = &self.inner.base {
            return base.last_index_of(value);
        }
        base::search(self, value, true)
    }

    pub(crate) fn expect_array(&self, method: &str) {
        assert!(
            self.inner.target.is_array(),
            "{method} called on a {:?} target",
            self.inner.target.ty()
        );
    }

    pub(crate) fn expect_kind(&self, wanted: &str, ok: bool, method: &str) {
        assert!(
            ok,
            "{method} requires a {wanted} target, got {:?}",
            self.inner.target.ty()
        );
    }
}

/// Handlers for plain objects and arrays.
mod base {
    use super::*;

    fn track(target: &Target, op: TrackOp, key: DepKey) {
        with_runtime(|rt| rt.track(target, op, key));
    }

    fn trigger(
        target: &Target,
        op: TriggerOp,
        key: Option<DepKey>,
        new_value: Option<Value>,
        old_value: Option<Value>,
    ) {
        with_runtime(|rt| rt.trigger(target, op, key, new_value, old_value));
    }

    /// Deep flavors store raw values; shallow flavors store what they get.
    /// Shallow or readonly values are kept as-is so their own wrapping
    /// survives.
    fn normalize_written(proxy: &Proxy, value: Value) -> Value {
        if proxy.flavor().shallow() || super::is_shallow(&value) || super::is_readonly(&value) {
            value
        } else {
            super::to_raw(&value)
        }
    }

    pub(super) fn get(proxy: &Proxy, key: Key) -> Value {
        let target = proxy.raw();
        let flavor = proxy.flavor();
        if target.is_array() && key.as_str() == Some("length") {
            if !flavor.readonly() {
                track(&target, TrackOp::Get, DepKey::Length);
            }
            return Value::Int(target.raw_len() as i64);
        }
        if !flavor.readonly() {
            track(&target, TrackOp::Get, DepKey::Key(key.clone()));
        }
        let result = target.raw_get(&key).unwrap_or(Value::Null);
        if let Value::Ref(r) = &result {
            // auto-unwrap, except for integer indices into arrays
            let skip_unwrap = target.is_array() && matches!(key, Key::Int(_));
            if !flavor.shallow() && !skip_unwrap {
                return r.get();
            }
        }
        proxy.wrap_nested(result)
    }

    pub(super) fn set(proxy: &Proxy, key: Key, value: Value) -> bool {
        let target = proxy.raw();
        let flavor = proxy.flavor();
        if target.is_array() && key.as_str() == Some("length") {
            let new_len = value.as_int().unwrap_or(0).max(0) as usize;
            return set_length(proxy, new_len);
        }
        let mut value = value;
        let mut old = target.raw_get(&key);
        if !flavor.shallow() {
            if !super::is_shallow(&value) && !super::is_readonly(&value) {
                if let Some(o) = &old {
                    old = Some(super::to_raw(o));
                }
                value = super::to_raw(&value);
            }
            if !target.is_array() {
                // writing a plain value over a stored ref assigns through it
                if let Some(Value::Ref(r)) = &old {
                    if !matches!(value, Value::Ref(_)) {
                        r.set(value);
                        return true;
                    }
                }
            }
        }
        let had = match (&key, target.is_array()) {
            (Key::Int(_), true) => key
                .as_index()
                .map(|i| i < target.raw_len())
                .unwrap_or(false),
            _ => target.raw_has(&key),
        };
        target.raw_set(key.clone(), value.clone());
        if !had {
            trigger(
                &target,
                TriggerOp::Add,
                Some(DepKey::Key(key)),
                Some(value),
                None,
            );
        } else if old.as_ref().map(|o| !same_value(o, &value)).unwrap_or(true) {
            trigger(
                &target,
                TriggerOp::Set,
                Some(DepKey::Key(key)),
                Some(value),
                old,
            );
        }
        true
    }

    pub(super) fn delete(proxy: &Proxy, key: Key) -> bool {
        let target = proxy.raw();
        let had = target.raw_has(&key);
        if !had {
            return true;
        }
        let old = target.raw_get(&key);
        let removed = target.raw_delete(&key);
        if removed {
            trigger(&target, TriggerOp::Delete, Some(DepKey::Key(key)), None, old);
        }
        removed
    }

    pub(super) fn has(proxy: &Proxy, key: Key) -> bool {
        let target = proxy.raw();
        if !proxy.flavor().readonly() {
            track(&target, TrackOp::Has, DepKey::Key(key.clone()));
        }
        target.raw_has(&key)
    }

    pub(super) fn set_length(proxy: &Proxy, new_len: usize) -> bool {
        let target = proxy.raw();
        let old_len = target.raw_len();
        if new_len == old_len {
            return true;
        }
        target.with_array(|items| items.resize(new_len, Value::Null));
        trigger(
            &target,
            TriggerOp::Set,
            Some(DepKey::Length),
            Some(Value::Int(new_len as i64)),
            Some(Value::Int(old_len as i64)),
        );
        true
    }

    /// Identity of the structural array mutators; each pauses tracking for
    /// the duration of the raw mutation.
    pub(super) enum ArrayMethod {
        Push(Value),
        Pop,
        Shift,
        Unshift(Value),
    }

    /// Runs a structural mutator. Returns the removed value (pop/shift) and
    /// the new length.
    pub(super) fn mutate(proxy: &Proxy, method: ArrayMethod) -> (Value, usize) {
        let target = proxy.raw();
        let before = target.array_snapshot();
        let (removed, new_len) = {
            let _guard = PauseGuard::new();
            match method {
                ArrayMethod::Push(value) => {
                    let value = normalize_written(proxy, value);
                    target.with_array(|items| {
                        items.push(value);
                        (None, items.len())
                    })
                }
                ArrayMethod::Pop => target.with_array(|items| (items.pop(), items.len())),
                ArrayMethod::Shift => target.with_array(|items| {
                    if items.is_empty() {
                        (None, 0)
                    } else {
                        (Some(items.remove(0)), items.len())
                    }
                }),
                ArrayMethod::Unshift(value) => {
                    let value = normalize_written(proxy, value);
                    target.with_array(|items| {
                        items.insert(0, value);
                        (None, items.len())
                    })
                }
            }
        };
        let after = target.array_snapshot();
        diff_triggers(&target, &before, &after);
        (removed.unwrap_or(Value::Null), new_len)
    }

    pub(super) fn splice(
        proxy: &Proxy,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Vec<Value> {
        let target = proxy.raw();
        let before = target.array_snapshot();
        let removed = {
            let _guard = PauseGuard::new();
            let items: Vec<Value> = items
                .into_iter()
                .map(|v| normalize_written(proxy, v))
                .collect();
            target.with_array(|vec| {
                let start = start.min(vec.len());
                let end = (start + delete_count).min(vec.len());
                vec.splice(start..end, items).collect::<Vec<Value>>()
            })
        };
        let after = target.array_snapshot();
        diff_triggers(&target, &before, &after);
        removed
    }

    /// Emits per-index SET/ADD/DELETE triggers for a structural mutation,
    /// comparing snapshots.
    fn diff_triggers(target: &Target, before: &[Value], after: &[Value]) {
        let common = before.len().min(after.len());
        for i in 0..common {
            if !same_value(&before[i], &after[i]) {
                trigger(
                    target,
                    TriggerOp::Set,
                    Some(DepKey::Key(Key::Int(i as i64))),
                    Some(after[i].clone()),
                    Some(before[i].clone()),
                );
            }
        }
        if after.len() > before.len() {
            for (i, item) in after.iter().enumerate().skip(before.len()) {
                trigger(
                    target,
                    TriggerOp::Add,
                    Some(DepKey::Key(Key::Int(i as i64))),
                    Some(item.clone()),
                    None,
                );
            }
        } else {
            for (i, item) in before.iter().enumerate().skip(after.len()) {
                trigger(
                    target,
                    TriggerOp::Delete,
                    Some(DepKey::Key(Key::Int(i as i64))),
                    None,
                    Some(item.clone()),
                );
            }
        }
    }

    /// Identity search backing `includes`/`index_of`/`last_index_of`:
    /// tracks the length and every index, then looks for `value`, retrying
    /// with the raw form of a proxy argument.
    pub(super) fn search(proxy: &Proxy, value: &Value, from_end: bool) -> Option<usize> {
        let target = proxy.raw();
        let items = target.array_snapshot();
        if !proxy.flavor().readonly() {
            track(&target, TrackOp::Get, DepKey::Length);
            for i in 0..items.len() {
                track(&target, TrackOp::Get, DepKey::Key(Key::Int(i as i64)));
            }
        }
        let position = |needle: &Value| {
            if from_end {
                items.iter().rposition(|item| same_value(item, needle))
            } else {
                items.iter().position(|item| same_value(item, needle))
            }
        };
        position(value).or_else(|| {
            let raw = super::to_raw(value);
            if same_value(&raw, value) {
                None
            } else {
                position(&raw)
            }
        })
    }
}
