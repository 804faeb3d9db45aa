//! The Event Bus (spec §4.8): per-Synchronizer subscriber lists, invoked
//! synchronously after the worker's result resolves. A subscriber that
//! panics is logged and does not abort the worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use log::warn;

use crate::document::ChangedFile;
use crate::sync::SyncResult;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A sync worker failure, detached from [`crate::error::GdbError`] (which
/// is not `Clone`) so it can be handed to every subscriber.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub message: String,
}

#[derive(Default)]
pub struct EventBus {
    start: Mutex<Vec<Callback<()>>>,
    complete: Mutex<Vec<Callback<SyncResult>>>,
    error: Mutex<Vec<Callback<ErrorEvent>>>,
    pause: Mutex<Vec<Callback<()>>>,
    resume: Mutex<Vec<Callback<()>>>,
    change: Mutex<Vec<Callback<SyncResult>>>,
    local_change: Mutex<Vec<Callback<Vec<ChangedFile>>>>,
    remote_change: Mutex<Vec<Callback<Vec<ChangedFile>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(&self, cb: impl Fn(&()) + Send + Sync + 'static) {
        self.start.lock().unwrap().push(Box::new(cb));
    }
    pub fn on_complete(&self, cb: impl Fn(&SyncResult) + Send + Sync + 'static) {
        self.complete.lock().unwrap().push(Box::new(cb));
    }
    pub fn on_error(&self, cb: impl Fn(&ErrorEvent) + Send + Sync + 'static) {
        self.error.lock().unwrap().push(Box::new(cb));
    }
    pub fn on_pause(&self, cb: impl Fn(&()) + Send + Sync + 'static) {
        self.pause.lock().unwrap().push(Box::new(cb));
    }
    pub fn on_resume(&self, cb: impl Fn(&()) + Send + Sync + 'static) {
        self.resume.lock().unwrap().push(Box::new(cb));
    }
    pub fn on_change(&self, cb: impl Fn(&SyncResult) + Send + Sync + 'static) {
        self.change.lock().unwrap().push(Box::new(cb));
    }
    pub fn on_local_change(&self, cb: impl Fn(&Vec<ChangedFile>) + Send + Sync + 'static) {
        self.local_change.lock().unwrap().push(Box::new(cb));
    }
    pub fn on_remote_change(&self, cb: impl Fn(&Vec<ChangedFile>) + Send + Sync + 'static) {
        self.remote_change.lock().unwrap().push(Box::new(cb));
    }

    pub fn emit_start(&self) {
        self.invoke(&self.start, &());
    }
    pub fn emit_complete(&self, result: &SyncResult) {
        self.invoke(&self.complete, result);
    }
    pub fn emit_error(&self, err: &ErrorEvent) {
        self.invoke(&self.error, err);
    }
    pub fn emit_pause(&self) {
        self.invoke(&self.pause, &());
    }
    pub fn emit_resume(&self) {
        self.invoke(&self.resume, &());
    }
    pub fn emit_change(&self, result: &SyncResult) {
        self.invoke(&self.change, result);
    }
    pub fn emit_local_change(&self, changes: &Vec<ChangedFile>) {
        self.invoke(&self.local_change, changes);
    }
    pub fn emit_remote_change(&self, changes: &Vec<ChangedFile>) {
        self.invoke(&self.remote_change, changes);
    }

    fn invoke<T>(&self, subscribers: &Mutex<Vec<Callback<T>>>, value: &T) {
        for cb in subscribers.lock().unwrap().iter() {
            if catch_unwind(AssertUnwindSafe(|| cb(value))).is_err() {
                warn!("event bus subscriber panicked; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn subscribers_run_synchronously_and_see_the_emitted_value() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        bus.on_complete(move |result| {
            if result.action == crate::sync::SyncAction::Nop {
                seen2.fetch_add(1, Ordering::SeqCst);
            }
        });
        bus.emit_complete(&SyncResult::nop());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_subscriber_does_not_stop_later_subscribers() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));
        bus.on_pause(|_| panic!("boom"));
        let ran2 = Arc::clone(&ran);
        bus.on_pause(move |_| {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit_pause();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
