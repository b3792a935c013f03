//! Method shims for keyed collections (maps, sets, and their weak
//! variants). Collection mutation happens through methods rather than
//! property writes, so each shim tracks or triggers explicitly and wraps
//! yielded values per the proxy's flavor.

use crate::{
    macros::debug_warn,
    runtime::{with_runtime, DepKey, TrackOp, TriggerOp},
    value::{same_value, Key, Target, TargetType},
    Proxy, Value,
};

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

fn normalize_written(proxy: &Proxy, value: Value) -> Value {
    if proxy.flavor().shallow() || crate::is_shallow(&value) || crate::is_readonly(&value) {
        value
    } else {
        crate::to_raw(&value)
    }
}

/// `get` on a map: tracks the key and wraps the result.
pub(crate) fn get(proxy: &Proxy, key: &Key) -> Value {
    let target = proxy.raw();
    proxy.expect_kind(
        "map",
        matches!(target.ty(), TargetType::Map | TargetType::WeakMap),
        "get",
    );
    if !proxy.flavor().readonly() {
        track(&target, TrackOp::Get, DepKey::Key(key.clone()));
    }
    let result = target.raw_get(key).unwrap_or(Value::Null);
    proxy.wrap_nested(result)
}

/// `set` on a map: add vs. set by pre-existence, NaN-aware change check.
pub(crate) fn map_set(proxy: &Proxy, key: Key, value: Value) -> bool {
    let target = proxy.raw();
    proxy.expect_kind(
        "map",
        matches!(target.ty(), TargetType::Map | TargetType::WeakMap),
        "set",
    );
    let value = normalize_written(proxy, value);
    let old = target.raw_get(&key);
    target.raw_set(key.clone(), value.clone());
    match old {
        None => trigger(
            &target,
            TriggerOp::Add,
            Some(DepKey::Key(key)),
            Some(value),
            None,
        ),
        Some(old) if !same_value(&old, &value) => trigger(
            &target,
            TriggerOp::Set,
            Some(DepKey::Key(key)),
            Some(value),
            Some(old),
        ),
        Some(_) => {}
    }
    true
}

pub(crate) fn has(proxy: &Proxy, key: &Key) -> bool {
    let target = proxy.raw();
    if !proxy.flavor().readonly() {
        track(&target, TrackOp::Has, DepKey::Key(key.clone()));
    }
    target.raw_has(key)
}

pub(crate) fn delete(proxy: &Proxy, key: &Key) -> bool {
    let target = proxy.raw();
    if !target.raw_has(key) {
        return false;
    }
    let old = target.raw_get(key);
    let removed = target.raw_delete(key);
    if removed {
        trigger(
            &target,
            TriggerOp::Delete,
            Some(DepKey::Key(key.clone())),
            None,
            old,
        );
    }
    removed
}

impl Proxy {
    /// Number of entries, tracked against iteration.
    pub fn size(&self) -> usize {
        if let Some(base) = &self.inner.base {
            return base.size();
        }
        let target = self.raw();
        self.expect_kind(
            "map or set",
            matches!(target.ty(), TargetType::Map | TargetType::Set),
            "size",
        );
        if !self.flavor().readonly() {
            track(&target, TrackOp::Iterate, DepKey::Iterate);
        }
        target.raw_len()
    }

    /// Adds an element to a set.
    pub fn add(&self, value: impl Into<Value>) -> Proxy {
        let target = self.raw();
        self.expect_kind(
            "set",
            matches!(target.ty(), TargetType::Set | TargetType::WeakSet),
            "add",
        );
        if self.flavor().readonly() {
            debug_warn!("add on readonly {self:?} was ignored");
            return self.clone();
        }
        let value = normalize_written(self, value.into());
        let key = Key::from_value(&value);
        if !target.raw_has(&key) {
            target.raw_add(value.clone());
            trigger(
                &target,
                TriggerOp::Add,
                Some(DepKey::Key(key)),
                Some(value),
                None,
            );
        }
        self.clone()
    }

    /// Removes every entry, notifying all of the target's deps.
    pub fn clear(&self) {
        let target = self.raw();
        self.expect_kind(
            "map or set",
            matches!(target.ty(), TargetType::Map | TargetType::Set),
            "clear",
        );
        if self.flavor().readonly() {
            debug_warn!("clear on readonly {self:?} was ignored");
            return;
        }
        if target.raw_len() == 0 {
            return;
        }
        let old_entries = Value::Target(match target.ty() {
            TargetType::Map => Target::object_from(target.raw_entries()),
            _ => Target::array_from(target.raw_keys().into_iter().map(Value::from)),
        });
        for key in target.raw_keys() {
            target.raw_delete(&key);
        }
        trigger(&target, TriggerOp::Clear, None, None, Some(old_entries));
    }

    /// Visits every entry in insertion order, tracking iteration. Yields
    /// `(value, key)` pairs, wrapped per flavor.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        self.for_each_dyn(&mut f);
    }

    fn for_each_dyn(&self, f: &mut dyn FnMut(&Value, &Value)) {
        if let Some(base) = &self.inner.base {
            let wrapper = self.clone();
            let mut wrapped = |value: &Value, key: &Value| {
                f(
                    &wrapper.wrap_nested(value.clone()),
                    &wrapper.wrap_nested(key.clone()),
                )
            };
            return base.for_each_dyn(&mut wrapped);
        }
        let target = self.raw();
        self.expect_kind(
            "map or set",
            matches!(target.ty(), TargetType::Map | TargetType::Set),
            "for_each",
        );
        if !self.flavor().readonly() {
            track(&target, TrackOp::Iterate, DepKey::Iterate);
        }
        for (key, value) in target.raw_entries() {
            let key = self.wrap_nested(Value::from(key));
            let value = self.wrap_nested(value);
            f(&value, &key);
        }
    }

    /// Snapshot of the keys as values, wrapped per flavor. On maps this
    /// tracks key iteration, which value-only writes do not disturb.
    pub fn keys(&self) -> Vec<Value> {
        if let Some(base) = &self.inner.base {
            return base
                .keys()
                .into_iter()
                .map(|v| self.wrap_nested(v))
                .collect();
        }
        let target = self.raw();
        self.expect_kind(
            "map or set",
            matches!(target.ty(), TargetType::Map | TargetType::Set),
            "keys",
        );
        if !self.flavor().readonly() {
            let dep_key = if target.is_map() {
                DepKey::MapKeyIterate
            } else {
                DepKey::Iterate
            };
            track(&target, TrackOp::Iterate, dep_key);
        }
        target
            .raw_keys()
            .into_iter()
            .map(|k| self.wrap_nested(Value::from(k)))
            .collect()
    }

    /// Snapshot of the values, wrapped per flavor.
    pub fn values(&self) -> Vec<Value> {
        if let Some(base) = &self.inner.base {
            return base
                .values()
                .into_iter()
                .map(|v| self.wrap_nested(v))
                .collect();
        }
        let target = self.raw();
        self.expect_kind(
            "map or set",
            matches!(target.ty(), TargetType::Map | TargetType::Set),
            "values",
        );
        if !self.flavor().readonly() {
            track(&target, TrackOp::Iterate, DepKey::Iterate);
        }
        target
            .raw_entries()
            .into_iter()
            .map(|(_, v)| self.wrap_nested(v))
            .collect()
    }

    /// Snapshot of `(key, value)` pairs, wrapped per flavor.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        if let Some(base) = &self.inner.base {
            return base
                .entries()
                .into_iter()
                .map(|(k, v)| (self.wrap_nested(k), self.wrap_nested(v)))
                .collect();
        }
        let target = self.raw();
        self.expect_kind(
            "map or set",
            matches!(target.ty(), TargetType::Map | TargetType::Set),
            "entries",
        );
        if !self.flavor().readonly() {
            track(&target, TrackOp::Iterate, DepKey::Iterate);
        }
        target
            .raw_entries()
            .into_iter()
            .map(|(k, v)| (self.wrap_nested(Value::from(k)), self.wrap_nested(v)))
            .collect()
    }
}
