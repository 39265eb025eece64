//! Panic capture for test steps
//!
//! The process-wide panic hook is replaced once. While a [`PanicCapture`]
//! guard is alive on a thread, panics on that thread are recorded (message,
//! location and backtrace when enabled) instead of printed. Dropping the
//! guard restores normal reporting for that thread.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::panic;
use std::sync::Once;

static HOOK: Once = Once::new();

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }

            let mut report = payload_message(info.payload());
            if let Some(location) = info.location() {
                report.push_str(&format!("\n  at {}:{}", location.file(), location.line()));
            }
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                report.push_str(&format!("\n{}", backtrace));
            }
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(report));
        }));
    });
}

/// Text of a panic payload
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Scoped panic capture for the current thread
pub(crate) struct PanicCapture {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl PanicCapture {
    pub(crate) fn begin() -> Self {
        install_hook();
        DEPTH.with(|d| d.set(d.get() + 1));
        LAST_PANIC.with(|slot| slot.borrow_mut().take());
        Self {
            _not_send: std::marker::PhantomData,
        }
    }

    /// Report for the most recent panic, falling back to the payload text
    pub(crate) fn take_report(&self, payload: &(dyn Any + Send)) -> String {
        LAST_PANIC
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| payload_message(payload))
    }
}

impl Drop for PanicCapture {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_is_recorded() {
        let capture = PanicCapture::begin();
        let err = panic::catch_unwind(|| panic!("kaboom {}", 7)).unwrap_err();
        let report = capture.take_report(err.as_ref());
        assert!(report.starts_with("kaboom 7"), "{report}");
        assert!(report.contains("capture.rs"), "{report}");
    }

    #[test]
    fn test_payload_message_fallback() {
        let boxed: Box<dyn Any + Send> = Box::new(12u8);
        assert_eq!(payload_message(boxed.as_ref()), "panic with a non-string payload");
        let boxed: Box<dyn Any + Send> = Box::new("plain");
        assert_eq!(payload_message(boxed.as_ref()), "plain");
    }
}
