//! Panic containment for application callbacks.
//!
//! Handler callbacks run on the connection's dispatcher task. A panicking
//! callback is caught, logged, and counted so that teardown still runs and
//! `on_close` is still delivered.

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use wampframe::panic::format_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(payload.as_ref()).to_string(), "boom");
/// let payload: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert!(format_panic(payload.as_ref()).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(panic) }

/// Run a handler callback, containing any panic it raises.
///
/// Returns `None` when the callback panicked.
pub fn guard_callback<R>(callback: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(panic) => {
            crate::metrics::inc_handler_panics();
            let panic_msg = format_panic(panic.as_ref());
            // Emit via both `log` and `tracing` for tests that capture either.
            log::error!("handler callback panicked: callback={callback}, panic={panic_msg}");
            tracing::error!(callback, panic = %panic_msg, "handler callback panicked");
            None
        }
    }
}
