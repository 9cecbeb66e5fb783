//! A named background worker that sleeps until explicitly notified, runs
//! one user-supplied closure per notification, and stops cooperatively
//! within a bounded timeout.
//!
//! `notify()` is built on [`std::thread::Thread::unpark`], which is
//! wait-free and safe to call from the real-time audio thread — exactly
//! the property the IR-update and FFT-stage worker threads need from
//! their trigger. The wait loop uses [`std::thread::park`], which
//! tolerates spurious wakeups by construction (every wakeup just reloads
//! the stop flag and, if still running, invokes the callback again).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A worker thread running `init`, then `process_on_signal` once per
/// `notify()`, then `exit` when stopped.
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    should_stop: Arc<AtomicBool>,
}

impl Worker {
    /// Spawns the worker immediately. `name` is used as the OS thread
    /// name and in any log messages about this worker.
    pub fn spawn<Init, Process, Exit>(
        name: &str,
        init: Init,
        mut process_on_signal: Process,
        exit: Exit,
    ) -> std::io::Result<Self>
    where
        Init: FnOnce() + Send + 'static,
        Process: FnMut() + Send + 'static,
        Exit: FnOnce() + Send + 'static,
    {
        let should_stop = Arc::new(AtomicBool::new(false));
        let should_stop_thread = should_stop.clone();
        let thread_name = name.to_string();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            pin_to_a_core(&thread_name);

            init();

            while !should_stop_thread.load(Ordering::Acquire) {
                thread::park();

                if should_stop_thread.load(Ordering::Acquire) {
                    break;
                }

                process_on_signal();
            }

            exit();
        })?;

        Ok(Self {
            handle: Some(handle),
            should_stop,
        })
    }

    /// Wait-free: wakes the worker so it runs `process_on_signal` once
    /// more. Safe to call from the real-time audio thread.
    pub fn notify(&self) {
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    /// Signals the worker to stop and joins it, waiting up to
    /// `timeout_ms` milliseconds. Never called from the audio thread.
    pub fn stop(&mut self, timeout_ms: u64) {
        self.should_stop.store(true, Ordering::Release);

        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }

        if let Some(handle) = self.handle.take() {
            let deadline = Duration::from_millis(timeout_ms);
            let joined = join_with_timeout(handle, deadline);
            if !joined {
                debug_assert!(false, "worker thread did not stop within {timeout_ms}ms");
                tracing::error!("worker thread did not stop within {timeout_ms}ms");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop(2000);
        }
    }
}

fn pin_to_a_core(name: &str) {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(core) = core_ids.first() {
            if !core_affinity::set_for_current(*core) {
                tracing::warn!("could not set CPU affinity for worker {name}");
            }
        }
    }
}

/// `JoinHandle::join` has no timeout variant; poll `is_finished()`
/// instead so a wedged worker can't hang the caller indefinitely.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while !handle.is_finished() {
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    let _ = handle.join();
    true
}
