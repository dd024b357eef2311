//! # Diagnostic Lock
//!
//! The registry serializes all mutation of one multi-branch project behind
//! a single lock. `DiagnosticLock` wraps the guarded state and adds the
//! two behaviors a plain mutex lacks:
//!
//! - **Bounded wait**: acquisition fails with `Error::LockTimeout` after
//!   the configured timeout instead of deadlocking forever.
//! - **Hold-time diagnostics**: a watchdog thread logs a warning once the
//!   lock has been held for a third of the timeout and escalates to an
//!   error once the full timeout has passed. The watchdog registration is
//!   tied to the guard and cancelled on drop, including on panic and error
//!   paths.
//!
//! Re-entrant acquisition is deliberately not offered: public registry
//! methods lock once and hand the guarded state to internal helpers, so
//! there is never a second acquisition on the same thread.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use humantime::format_duration;
use log::{error, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// A named, bounded-wait mutex with hold-time diagnostics.
pub struct DiagnosticLock<T> {
    name: String,
    timeout: Duration,
    data: Mutex<T>,
    watchdog: Watchdog,
}

impl<T> DiagnosticLock<T> {
    /// Wraps `data` in a lock named `name` (used in diagnostics) with the
    /// given acquisition timeout.
    pub fn new(name: &str, timeout: Duration, data: T) -> Self {
        Self {
            name: name.to_string(),
            timeout,
            data: Mutex::new(data),
            watchdog: Watchdog::spawn(name, timeout),
        }
    }

    /// Acquires the lock, waiting at most the configured timeout.
    pub fn lock(&self) -> Result<DiagnosticGuard<'_, T>> {
        let guard = self
            .data
            .try_lock_for(self.timeout)
            .ok_or_else(|| Error::LockTimeout {
                name: self.name.clone(),
                waited: self.timeout,
            })?;
        let hold = self.watchdog.holding();
        Ok(DiagnosticGuard {
            guard,
            _hold: hold,
        })
    }

    /// The lock's diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> std::fmt::Debug for DiagnosticLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticLock")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Guard over the locked state. Dropping it releases the lock and cancels
/// the watchdog registration for this hold.
pub struct DiagnosticGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    _hold: HoldToken,
}

impl<T> Deref for DiagnosticGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for DiagnosticGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

struct WatchState {
    inner: Mutex<WatchInner>,
    condvar: Condvar,
}

struct WatchInner {
    held_since: Option<Instant>,
    warned: bool,
    escalated: bool,
    shutdown: bool,
}

/// Background thread observing how long the lock stays held.
struct Watchdog {
    state: Arc<WatchState>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(lock_name: &str, timeout: Duration) -> Self {
        let state = Arc::new(WatchState {
            inner: Mutex::new(WatchInner {
                held_since: None,
                warned: false,
                escalated: false,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        });
        let thread_state = Arc::clone(&state);
        let name = lock_name.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("lock-watchdog-{}", lock_name))
            .spawn(move || watch(&thread_state, &name, timeout))
            .expect("failed to spawn lock watchdog thread");
        Self {
            state,
            handle: Some(handle),
        }
    }

    fn holding(&self) -> HoldToken {
        let mut inner = self.state.inner.lock();
        inner.held_since = Some(Instant::now());
        inner.warned = false;
        inner.escalated = false;
        self.state.condvar.notify_all();
        HoldToken {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        {
            let mut inner = self.state.inner.lock();
            inner.shutdown = true;
            self.state.condvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Cancels the watchdog registration for one hold when dropped.
struct HoldToken {
    state: Arc<WatchState>,
}

impl Drop for HoldToken {
    fn drop(&mut self) {
        let mut inner = self.state.inner.lock();
        inner.held_since = None;
        self.state.condvar.notify_all();
    }
}

fn watch(state: &WatchState, name: &str, timeout: Duration) {
    let mut inner = state.inner.lock();
    loop {
        if inner.shutdown {
            return;
        }
        let Some(since) = inner.held_since else {
            state.condvar.wait(&mut inner);
            continue;
        };
        if inner.escalated {
            // Nothing further to report for this hold; wait for release.
            state.condvar.wait(&mut inner);
            continue;
        }
        let deadline = since
            + if inner.warned {
                timeout
            } else {
                timeout / 3
            };
        if Instant::now() >= deadline {
            let held_for = format_duration(round_secs(since.elapsed()));
            if inner.warned {
                inner.escalated = true;
                error!(
                    "{} has been locked for {}, past its timeout of {}.",
                    name,
                    held_for,
                    format_duration(timeout)
                );
            } else {
                inner.warned = true;
                warn!("{} is locked for {} now.", name, held_for);
            }
        } else {
            let _ = state.condvar.wait_until(&mut inner, deadline);
        }
    }
}

/// Trims sub-second noise out of the logged hold duration.
fn round_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}
