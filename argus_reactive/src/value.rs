use crate::{proxy::ProxyInner, reference::Ref, Proxy};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use std::{
    cell::{Cell, RefCell},
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

thread_local! {
    static NEXT_TARGET_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_target_id() -> u64 {
    NEXT_TARGET_ID.with(|id| {
        let next = id.get();
        id.set(next + 1);
        next
    })
}

/// A dynamic value: the currency of the reactive system.
///
/// Scalars are stored inline; structured data lives behind a [`Target`]
/// handle, and reactive views of it behind a [`Proxy`]. A [`Ref`] stored as a
/// value is what enables automatic ref unwrapping inside deep proxies.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// An immutable shared string.
    Str(Rc<str>),
    /// A raw structured target (object, array, or keyed collection).
    Target(Target),
    /// A reactive or readonly view over a target.
    Proxy(Proxy),
    /// A reference cell.
    Ref(Ref),
}

impl Value {
    /// Builds a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ref_cell(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }
}

/// SameValueZero: like `==` except `NaN` equals `NaN` and `-0.0` equals
/// `0.0`; structured values compare by identity.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => nums_equal(*a, *b),
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *b == *a as f64,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Target(a), Value::Target(b)) => a == b,
        (Value::Proxy(a), Value::Proxy(b)) => a == b,
        (Value::Ref(a), Value::Ref(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn nums_equal(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Target(t) => t.fmt(f),
            Value::Proxy(p) => p.fmt(f),
            Value::Ref(r) => r.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value.as_str()))
    }
}

impl From<Target> for Value {
    fn from(value: Target) -> Self {
        Value::Target(value)
    }
}

impl From<Proxy> for Value {
    fn from(value: Proxy) -> Self {
        Value::Proxy(value)
    }
}

impl From<Ref> for Value {
    fn from(value: Ref) -> Self {
        Value::Ref(value)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Null => Value::Null,
            Key::Bool(b) => Value::Bool(b),
            Key::Int(i) => Value::Int(i),
            Key::Float(bits) => Value::Float(f64::from_bits(bits)),
            Key::Str(s) => Value::Str(s),
            Key::Target(t) => Value::Target(t),
            Key::Ref(r) => Value::Ref(r),
        }
    }
}

/// A property or collection key.
///
/// Keys are normalized on construction: proxies collapse to the identity of
/// their raw target, floats fold to SameValueZero bit patterns (and to
/// [`Key::Int`] when integral), so a map entry is found by either its raw or
/// its reactive key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Null,
    Bool(bool),
    Int(i64),
    /// Normalized float bits; see [`Key::float`].
    Float(u64),
    Str(Rc<str>),
    /// Object identity of a raw target.
    Target(Target),
    /// Identity of a reference cell.
    Ref(Ref),
}

impl Key {
    /// Builds a float key, folding `-0.0` to `0.0`, canonicalizing `NaN`,
    /// and demoting integral floats to [`Key::Int`].
    pub fn float(value: f64) -> Self {
        if value == value.trunc() && value.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&value) {
            return Key::Int(value as i64);
        }
        let normalized = if value.is_nan() {
            f64::NAN
        } else if value == 0.0 {
            0.0
        } else {
            value
        };
        Key::Float(normalized.to_bits())
    }

    /// Normalizes any value into a key, collapsing reactive proxies to the
    /// identity of their raw target. Non-keyable values become [`Key::Null`].
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Key::Null,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(x) => Key::float(*x),
            Value::Str(s) => Key::Str(Rc::clone(s)),
            Value::Target(t) => Key::Target(t.clone()),
            Value::Proxy(p) => Key::Target(p.raw()),
            Value::Ref(r) => Key::Ref(r.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            Key::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => write!(f, "null"),
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Key::Str(s) => write!(f, "{s:?}"),
            Key::Target(t) => t.fmt(f),
            Key::Ref(r) => r.fmt(f),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value.as_str()))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value as i64)
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::float(value)
    }
}

impl From<Target> for Key {
    fn from(value: Target) -> Self {
        Key::Target(value)
    }
}

impl From<&Key> for Key {
    fn from(value: &Key) -> Self {
        value.clone()
    }
}

/// The structural kind of a [`Target`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TargetType {
    Object,
    Array,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

pub(crate) struct WeakEntry {
    pub key: Weak<TargetInner>,
    pub value: Value,
}

pub(crate) enum TargetKind {
    Object(RefCell<IndexMap<Key, Value>>),
    Array(RefCell<Vec<Value>>),
    Map(RefCell<IndexMap<Key, Value>>),
    Set(RefCell<IndexSet<Key>>),
    WeakMap(RefCell<FxHashMap<u64, WeakEntry>>),
    WeakSet(RefCell<FxHashMap<u64, Weak<TargetInner>>>),
}

pub(crate) struct TargetInner {
    pub id: u64,
    pub kind: TargetKind,
    pub skip: Cell<bool>,
    /// One weak cache slot per proxy flavor.
    pub proxies: RefCell<[Option<Weak<ProxyInner>>; 4]>,
}

/// A raw structured value: an object, array, or keyed collection.
///
/// Targets have reference identity and carry no tracking behavior of their
/// own; the `raw_*` accessors read and write without touching the dependency
/// registry. Reactivity comes from wrapping a target with
/// [`reactive`](crate::reactive) or one of its flavors.
#[derive(Clone)]
pub struct Target {
    pub(crate) inner: Rc<TargetInner>,
}

impl Target {
    fn with_kind(kind: TargetKind) -> Self {
        Target {
            inner: Rc::new(TargetInner {
                id: next_target_id(),
                kind,
                skip: Cell::new(false),
                proxies: RefCell::new([None, None, None, None]),
            }),
        }
    }

    /// Creates an empty object (insertion-ordered string-keyed map).
    pub fn object() -> Self {
        Target::with_kind(TargetKind::Object(RefCell::new(IndexMap::new())))
    }

    /// Creates an empty array.
    pub fn array() -> Self {
        Target::with_kind(TargetKind::Array(RefCell::new(Vec::new())))
    }

    /// Creates an empty keyed map.
    pub fn map() -> Self {
        Target::with_kind(TargetKind::Map(RefCell::new(IndexMap::new())))
    }

    /// Creates an empty set.
    pub fn set() -> Self {
        Target::with_kind(TargetKind::Set(RefCell::new(IndexSet::new())))
    }

    /// Creates a weakly-keyed map. Keys must be targets; entries disappear
    /// when the key target is dropped.
    pub fn weak_map() -> Self {
        Target::with_kind(TargetKind::WeakMap(RefCell::new(FxHashMap::default())))
    }

    /// Creates a weakly-keyed set.
    pub fn weak_set() -> Self {
        Target::with_kind(TargetKind::WeakSet(RefCell::new(FxHashMap::default())))
    }

    /// Builds an object from key/value pairs.
    pub fn object_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let target = Target::object();
        for (key, value) in entries {
            target.raw_set(key, value);
        }
        target
    }

    /// Builds an array from items.
    pub fn array_from<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        let target = Target::array();
        for item in items {
            target.raw_push(item);
        }
        target
    }

    pub fn ty(&self) -> TargetType {
        match &self.inner.kind {
            TargetKind::Object(_) => TargetType::Object,
            TargetKind::Array(_) => TargetType::Array,
            TargetKind::Map(_) => TargetType::Map,
            TargetKind::Set(_) => TargetType::Set,
            TargetKind::WeakMap(_) => TargetType::WeakMap,
            TargetKind::WeakSet(_) => TargetType::WeakSet,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn is_array(&self) -> bool {
        matches!(self.inner.kind, TargetKind::Array(_))
    }

    pub(crate) fn is_map(&self) -> bool {
        matches!(self.inner.kind, TargetKind::Map(_))
    }

    pub(crate) fn is_collection(&self) -> bool {
        matches!(
            self.inner.kind,
            TargetKind::Map(_) | TargetKind::Set(_) | TargetKind::WeakMap(_) | TargetKind::WeakSet(_)
        )
    }

    pub(crate) fn is_weak(&self) -> bool {
        matches!(self.inner.kind, TargetKind::WeakMap(_) | TargetKind::WeakSet(_))
    }

    pub(crate) fn mark_skip(&self) {
        self.inner.skip.set(true);
    }

    /// Whether this target was marked opaque with [`mark_raw`](crate::mark_raw).
    pub fn is_marked_raw(&self) -> bool {
        self.inner.skip.get()
    }

    /// Reads an entry without tracking.
    pub fn raw_get(&self, key: &Key) -> Option<Value> {
        match &self.inner.kind {
            TargetKind::Object(map) | TargetKind::Map(map) => map.borrow().get(key).cloned(),
            TargetKind::Array(items) => key.as_index().and_then(|i| items.borrow().get(i).cloned()),
            TargetKind::Set(items) => items.borrow().get(key).map(|k| Value::from(k.clone())),
            TargetKind::WeakMap(entries) => match key {
                Key::Target(t) => {
                    let entries = entries.borrow();
                    let entry = entries.get(&t.id())?;
                    entry.key.upgrade().map(|_| entry.value.clone())
                }
                _ => None,
            },
            TargetKind::WeakSet(entries) => match key {
                Key::Target(t) => entries
                    .borrow()
                    .get(&t.id())
                    .and_then(Weak::upgrade)
                    .map(|inner| Value::Target(Target { inner })),
                _ => None,
            },
        }
    }

    /// Writes an entry without tracking or triggering.
    pub fn raw_set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match &self.inner.kind {
            TargetKind::Object(map) | TargetKind::Map(map) => {
                map.borrow_mut().insert(key, value);
            }
            TargetKind::Array(items) => {
                let index = key
                    .as_index()
                    .unwrap_or_else(|| panic!("array entries take integer keys, got {key:?}"));
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, Value::Null);
                }
                items[index] = value;
            }
            TargetKind::Set(items) => {
                items.borrow_mut().insert(key);
            }
            TargetKind::WeakMap(entries) => match key {
                Key::Target(t) => {
                    entries.borrow_mut().insert(
                        t.id(),
                        WeakEntry {
                            key: Rc::downgrade(&t.inner),
                            value,
                        },
                    );
                }
                other => panic!("weak collection keys must be targets, got {other:?}"),
            },
            TargetKind::WeakSet(_) => panic!("weak sets take raw_add, not raw_set"),
        }
    }

    /// Adds an item to a set without triggering.
    pub fn raw_add(&self, value: impl Into<Value>) {
        let value = value.into();
        match &self.inner.kind {
            TargetKind::Set(items) => {
                items.borrow_mut().insert(Key::from_value(&value));
            }
            TargetKind::WeakSet(entries) => match value {
                Value::Target(t) => {
                    entries.borrow_mut().insert(t.id(), Rc::downgrade(&t.inner));
                }
                other => panic!("weak collection entries must be targets, got {other:?}"),
            },
            _ => panic!("raw_add called on a non-set target"),
        }
    }

    /// Removes an entry without triggering. Returns whether it existed.
    pub fn raw_delete(&self, key: &Key) -> bool {
        match &self.inner.kind {
            TargetKind::Object(map) | TargetKind::Map(map) => {
                map.borrow_mut().shift_remove(key).is_some()
            }
            TargetKind::Array(items) => match key.as_index() {
                Some(i) => {
                    let mut items = items.borrow_mut();
                    if i < items.len() {
                        items[i] = Value::Null;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            },
            TargetKind::Set(items) => items.borrow_mut().shift_remove(key),
            TargetKind::WeakMap(entries) => match key {
                Key::Target(t) => entries.borrow_mut().remove(&t.id()).is_some(),
                _ => false,
            },
            TargetKind::WeakSet(entries) => match key {
                Key::Target(t) => entries.borrow_mut().remove(&t.id()).is_some(),
                _ => false,
            },
        }
    }

    /// Membership test without tracking.
    pub fn raw_has(&self, key: &Key) -> bool {
        match &self.inner.kind {
            TargetKind::Object(map) | TargetKind::Map(map) => map.borrow().contains_key(key),
            TargetKind::Array(items) => key
                .as_index()
                .map(|i| i < items.borrow().len())
                .unwrap_or(false),
            TargetKind::Set(items) => items.borrow().contains(key),
            TargetKind::WeakMap(entries) => match key {
                Key::Target(t) => entries
                    .borrow()
                    .get(&t.id())
                    .map(|e| e.key.upgrade().is_some())
                    .unwrap_or(false),
                _ => false,
            },
            TargetKind::WeakSet(entries) => match key {
                Key::Target(t) => entries
                    .borrow()
                    .get(&t.id())
                    .map(|e| e.upgrade().is_some())
                    .unwrap_or(false),
                _ => false,
            },
        }
    }

    /// Element or entry count without tracking. Panics for weak collections.
    pub fn raw_len(&self) -> usize {
        match &self.inner.kind {
            TargetKind::Object(map) | TargetKind::Map(map) => map.borrow().len(),
            TargetKind::Array(items) => items.borrow().len(),
            TargetKind::Set(items) => items.borrow().len(),
            TargetKind::WeakMap(_) | TargetKind::WeakSet(_) => {
                panic!("weak collections have no observable size")
            }
        }
    }

    /// Appends to an array without triggering.
    pub fn raw_push(&self, value: impl Into<Value>) {
        match &self.inner.kind {
            TargetKind::Array(items) => items.borrow_mut().push(value.into()),
            _ => panic!("raw_push called on a non-array target"),
        }
    }

    /// Snapshot of an object's or map's entries, in insertion order.
    pub fn raw_entries(&self) -> Vec<(Key, Value)> {
        match &self.inner.kind {
            TargetKind::Object(map) | TargetKind::Map(map) => map
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            TargetKind::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Int(i as i64), v.clone()))
                .collect(),
            TargetKind::Set(items) => items
                .borrow()
                .iter()
                .map(|k| (k.clone(), Value::from(k.clone())))
                .collect(),
            TargetKind::WeakMap(_) | TargetKind::WeakSet(_) => {
                panic!("weak collections are not iterable")
            }
        }
    }

    /// Snapshot of the keys, in insertion order.
    pub fn raw_keys(&self) -> Vec<Key> {
        match &self.inner.kind {
            TargetKind::Object(map) | TargetKind::Map(map) => {
                map.borrow().keys().cloned().collect()
            }
            TargetKind::Array(items) => (0..items.borrow().len())
                .map(|i| Key::Int(i as i64))
                .collect(),
            TargetKind::Set(items) => items.borrow().iter().cloned().collect(),
            TargetKind::WeakMap(_) | TargetKind::WeakSet(_) => {
                panic!("weak collections are not iterable")
            }
        }
    }

    pub(crate) fn array_snapshot(&self) -> Vec<Value> {
        match &self.inner.kind {
            TargetKind::Array(items) => items.borrow().clone(),
            _ => panic!("not an array target"),
        }
    }

    pub(crate) fn with_array<T>(&self, f: impl FnOnce(&mut Vec<Value>) -> T) -> T {
        match &self.inner.kind {
            TargetKind::Array(items) => f(&mut items.borrow_mut()),
            _ => panic!("not an array target"),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<TargetInner> {
        Rc::downgrade(&self.inner)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(#{})", self.ty(), self.inner.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_is_nan_aware() {
        assert!(same_value(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
        assert!(same_value(&Value::Float(-0.0), &Value::Float(0.0)));
        assert!(!same_value(&Value::Float(1.0), &Value::Float(2.0)));
        assert!(same_value(&Value::Int(3), &Value::Float(3.0)));
    }

    #[test]
    fn float_keys_normalize() {
        assert_eq!(Key::float(3.0), Key::Int(3));
        assert_eq!(Key::float(-0.0), Key::float(0.0));
        assert_eq!(Key::float(f64::NAN), Key::float(f64::NAN));
        assert_ne!(Key::float(0.5), Key::float(0.25));
    }

    #[test]
    fn target_identity() {
        let a = Target::object();
        let b = Target::object();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
