//! An implementation of a fine-grained reactive system over a dynamic value
//! model.
//!
//! The building blocks come in four layers:
//! 1. **Targets**: raw objects, arrays, and keyed collections ([`Target`]),
//!    plain data with reference identity.
//! 2. **Proxies**: reactive views over targets ([`reactive`], [`readonly`],
//!    and their shallow variants) that track every read against the running
//!    effect and trigger dependents on every write.
//! 3. **Cells**: single-slot observables: reference cells
//!    ([`create_ref`]), and lazily recomputed [`create_computed`] cells.
//! 4. **Watchers**: user-facing subscriptions ([`watch`], [`watch_effect`])
//!    scheduled synchronously or through the host's pre/post flush queues.
//!
//! ```rust
//! use argus_reactive::{create_computed, create_effect, create_ref, Value};
//!
//! let count = create_ref(1);
//! let doubled = create_computed({
//!     let count = count.clone();
//!     move || Value::Int(count.get().as_int().unwrap_or(0) * 2)
//! });
//!
//! // the effect runs once immediately
//! create_effect({
//!     let doubled = doubled.clone();
//!     move || {
//!         println!("doubled = {:?}", doubled.get());
//!     }
//! });
//!
//! // updating `count` re-runs the effect through the computed cell
//! count.set(2);
//! ```
//!
//! Reactivity is "fine grained" because a write notifies exactly the effects
//! whose last run read the affected key, nothing else. Dependencies are
//! collected at runtime, so an effect that stops reading a key during a run
//! is unsubscribed from it by the post-run sweep.
//!
//! The runtime is single-threaded and cooperative: nothing here suspends,
//! and pre/post watcher callbacks run when the host drains the job queues
//! ([`flush_jobs`]).

#![forbid(unsafe_code)]

use std::fmt::Arguments;

mod collections;
mod computed;
mod diagnostics;
mod effect;
mod errors;
pub(crate) mod macros;
mod proxy;
mod reference;
mod runtime;
mod scheduler;
#[cfg(feature = "serde")]
mod serde;
mod value;
mod watch;

pub use computed::{
    create_computed, create_computed_with_options, create_writable_computed, Computed,
    ComputedOptions,
};
pub use diagnostics::{TrackEvent, TriggerEvent};
pub use effect::{
    create_effect, create_effect_with_options, pause_tracking, reset_tracking, stop, untrack,
    Effect, EffectOptions,
};
pub use errors::{set_error_handler, ErrorCode, UserError};
pub use proxy::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, Flavor, Proxy, FLAG_IS_REACTIVE,
    FLAG_IS_READONLY, FLAG_IS_SHALLOW, FLAG_RAW, FLAG_SKIP,
};
pub use reference::{
    create_custom_ref, create_ref, create_shallow_ref, is_ref, trigger_ref, unref, Ref,
};
pub use runtime::{DepKey, TrackOp, TriggerOp};
pub use scheduler::{
    current_instance, flush_jobs, flush_post_jobs, queue_job, queue_post, set_current_instance,
    set_queue_hooks, set_scope_hooks, Job, ScopeHooks,
};
pub use value::{same_value, Key, Target, TargetType, Value};
pub use watch::{watch, watch_effect, watch_post, watch_sync, FlushMode, WatchOptions, WatchSource};

/// Reexports the traits and types most call sites need.
pub mod prelude {
    pub use crate::{
        create_computed, create_effect, create_ref, reactive, readonly, watch, watch_effect,
        Key, Target, Value, WatchOptions,
    };
}

#[doc(hidden)]
pub fn log_warning(text: Arguments) {
    #[cfg(feature = "tracing")]
    {
        tracing::warn!("{}", text);
    }
    #[cfg(not(feature = "tracing"))]
    {
        eprintln!("{text}");
    }
}
