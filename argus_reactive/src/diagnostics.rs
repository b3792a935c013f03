// Debug payloads handed to the `on_track` / `on_trigger` hooks. These exist
// to answer "why did this effect re-run" during development; nothing in the
// core consumes them.

use crate::{
    runtime::{DepKey, TrackOp, TriggerOp},
    Effect, Value,
};

/// Delivered to an effect's `on_track` hook when it subscribes to a new
/// dependency.
#[derive(Clone, Debug)]
pub struct TrackEvent {
    /// The effect that picked up the dependency.
    pub effect: Effect,
    /// Identity of the target read through, when the dep belongs to one.
    /// `None` for reference-cell deps.
    pub target: Option<u64>,
    pub op: TrackOp,
    pub key: DepKey,
    /// The dep's version at subscription time.
    pub dep_version: u64,
}

/// Delivered to an effect's `on_trigger` hook just before it is scheduled.
#[derive(Clone, Debug)]
pub struct TriggerEvent {
    /// The effect about to be scheduled.
    pub effect: Effect,
    /// Identity of the mutated target, `None` for reference-cell deps.
    pub target: Option<u64>,
    pub op: TriggerOp,
    /// The affected key; `None` for whole-target operations.
    pub key: Option<DepKey>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}
