use crate::macros::debug_warn;
use std::{
    any::Any,
    cell::RefCell,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
};
use thiserror::Error;

/// Where a captured user error came from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ErrorCode {
    /// A watch source getter.
    WatchGetter,
    /// A watch callback or watch-effect body.
    WatchCallback,
    /// A cleanup function registered through `on_cleanup`.
    WatchCleanup,
    /// An effect scheduler.
    Scheduler,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::WatchGetter => "watch getter",
            ErrorCode::WatchCallback => "watch callback",
            ErrorCode::WatchCleanup => "watch cleanup",
            ErrorCode::Scheduler => "effect scheduler",
        };
        write!(f, "{name}")
    }
}

/// A panic captured from user-provided code and routed to the host.
#[derive(Clone, Debug, Error)]
#[error("error in {code}: {message}")]
pub struct UserError {
    pub code: ErrorCode,
    pub message: String,
}

thread_local! {
    static ERROR_HANDLER: RefCell<Option<Rc<dyn Fn(&UserError)>>> = const { RefCell::new(None) };
}

/// Installs the host error handler. Captured user errors are delivered here
/// instead of being printed; pass `None` to restore the default sink.
pub fn set_error_handler(handler: Option<Rc<dyn Fn(&UserError)>>) {
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = handler);
}

pub(crate) fn report(error: UserError) {
    let handler = ERROR_HANDLER.with(|slot| slot.borrow().clone());
    match handler {
        Some(handler) => handler(&error),
        None => debug_warn!("{error}"),
    }
}

pub(crate) fn report_panic(code: ErrorCode, payload: Box<dyn Any + Send>) {
    report(UserError {
        code,
        message: payload_message(payload.as_ref()),
    });
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}

/// Runs user code, converting a panic into a routed [`UserError`]. Returns
/// `None` when the call panicked.
pub(crate) fn call_user<T>(code: ErrorCode, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            report_panic(code, payload);
            None
        }
    }
}
