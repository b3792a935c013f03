//! The host queue surface. Pre- and post-flush watchers hand jobs to the
//! queues declared here; the host decides when to flush. Embedders that own
//! their own scheduling (a renderer, an event loop) install hooks and the
//! default queues step aside.

use crate::Effect;
use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

/// A schedulable unit of work produced by a watcher trigger.
#[derive(Clone)]
pub struct Job {
    /// Ordering id: the owning instance's id when one was current at
    /// watcher creation, otherwise the effect's own id.
    pub id: u64,
    /// Pre-flush jobs run before render at the host's pre-flush point.
    pub pre: bool,
    /// Permit the job to be queued again while already pending.
    pub allow_recurse: bool,
    run: Rc<dyn Fn()>,
}

impl Job {
    pub fn new(id: u64, pre: bool, run: Rc<dyn Fn()>) -> Job {
        Job {
            id,
            pre,
            allow_recurse: false,
            run,
        }
    }

    pub fn invoke(&self) {
        (self.run)();
    }

    fn same_job(&self, other: &Job) -> bool {
        Rc::ptr_eq(&self.run, &other.run)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("pre", &self.pre)
            .field("allow_recurse", &self.allow_recurse)
            .finish()
    }
}

/// Scope registration callbacks, installed by a host that keeps per-instance
/// effect lists.
pub struct ScopeHooks {
    pub register: Rc<dyn Fn(Effect)>,
    pub unregister: Rc<dyn Fn(Effect)>,
}

type QueueHook = Rc<dyn Fn(Job)>;

thread_local! {
    static PRE_QUEUE: RefCell<Vec<Job>> = const { RefCell::new(Vec::new()) };
    static POST_QUEUE: RefCell<Vec<Job>> = const { RefCell::new(Vec::new()) };
    static JOB_HOOK: RefCell<Option<QueueHook>> = const { RefCell::new(None) };
    static POST_HOOK: RefCell<Option<QueueHook>> = const { RefCell::new(None) };
    static CURRENT_INSTANCE: Cell<Option<u64>> = const { Cell::new(None) };
    static SCOPE_HOOKS: RefCell<Option<ScopeHooks>> = const { RefCell::new(None) };
}

/// Enqueues a pre-flush job, keeping the queue in `id` order with stable
/// insertion and duplicate suppression.
pub fn queue_job(job: Job) {
    let hook = JOB_HOOK.with(|hook| hook.borrow().clone());
    if let Some(hook) = hook {
        return hook(job);
    }
    PRE_QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if !job.allow_recurse && queue.iter().any(|queued| queued.same_job(&job)) {
            return;
        }
        let position = queue
            .iter()
            .position(|queued| queued.id > job.id)
            .unwrap_or(queue.len());
        queue.insert(position, job);
    });
}

/// Enqueues a post-flush job (FIFO).
pub fn queue_post(job: Job) {
    let hook = POST_HOOK.with(|hook| hook.borrow().clone());
    if let Some(hook) = hook {
        return hook(job);
    }
    POST_QUEUE.with(|queue| queue.borrow_mut().push(job));
}

/// The host's flush point: drains the pre queue in id order (jobs enqueued
/// mid-flush join in), then the post queue.
pub fn flush_jobs() {
    loop {
        let job = PRE_QUEUE.with(|queue| {
            let mut queue = queue.borrow_mut();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        });
        match job {
            Some(job) => job.invoke(),
            None => break,
        }
    }
    flush_post_jobs();
}

/// Drains only the post queue.
pub fn flush_post_jobs() {
    loop {
        let job = POST_QUEUE.with(|queue| {
            let mut queue = queue.borrow_mut();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        });
        match job {
            Some(job) => job.invoke(),
            None => break,
        }
    }
}

/// Replaces the built-in queues with host-owned ones. Pass `None` to fall
/// back to the defaults.
pub fn set_queue_hooks(job: Option<Rc<dyn Fn(Job)>>, post: Option<Rc<dyn Fn(Job)>>) {
    JOB_HOOK.with(|hook| *hook.borrow_mut() = job);
    POST_HOOK.with(|hook| *hook.borrow_mut() = post);
}

/// Sets the id of the component instance considered current; watchers
/// created while it is set tag their jobs with it. Returns the previous id.
pub fn set_current_instance(id: Option<u64>) -> Option<u64> {
    CURRENT_INSTANCE.with(|cell| cell.replace(id))
}

pub fn current_instance() -> Option<u64> {
    CURRENT_INSTANCE.with(Cell::get)
}

/// Installs (or clears) the host's scope registration callbacks.
pub fn set_scope_hooks(hooks: Option<ScopeHooks>) {
    SCOPE_HOOKS.with(|slot| *slot.borrow_mut() = hooks);
}

pub(crate) fn scope_register(effect: Effect) {
    let hook = SCOPE_HOOKS.with(|slot| slot.borrow().as_ref().map(|h| h.register.clone()));
    if let Some(hook) = hook {
        hook(effect);
    }
}

pub(crate) fn scope_unregister(effect: Effect) {
    let hook = SCOPE_HOOKS.with(|slot| slot.borrow().as_ref().map(|h| h.unregister.clone()));
    if let Some(hook) = hook {
        hook(effect);
    }
}
