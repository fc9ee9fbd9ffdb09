//! Marks the span of a multi-step file mutation (write a header, shift
//! bytes, update the child index) that must appear atomic to whatever
//! delivers `SIGINT` to this process.
//!
//! On the main thread, entering the window installs a handler that only
//! records the signal; on exit the previous handler is restored and, if a
//! signal arrived during the window, re-raised so the restored handler
//! (or the default action) still sees it. Off the main thread the window
//! is a no-op, matching the single-threaded assumption the python source
//! makes (it only swaps `signal.signal` when `threading.currentThread()
//! is threading.main_thread()`).

use std::sync::atomic::{AtomicBool, Ordering};

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn record_sigint(_signum: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

/// Linux-only: a thread's id equals the process id exactly for the main
/// thread, so this needs no extra bookkeeping at startup.
fn is_main_thread() -> bool {
    unsafe { libc::getpid() == libc::gettid() }
}

pub(super) struct NoInterrupt {
    previous: Option<libc::sighandler_t>,
}

impl NoInterrupt {
    pub(super) fn enter() -> Self {
        if !is_main_thread() {
            return Self { previous: None };
        }
        SIGINT_RECEIVED.store(false, Ordering::SeqCst);
        let previous = unsafe { libc::signal(libc::SIGINT, record_sigint as libc::sighandler_t) };
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for NoInterrupt {
    fn drop(&mut self) {
        let Some(previous) = self.previous else {
            return;
        };
        unsafe {
            libc::signal(libc::SIGINT, previous);
        }
        if SIGINT_RECEIVED.swap(false, Ordering::SeqCst) {
            unsafe {
                libc::raise(libc::SIGINT);
            }
        }
    }
}
