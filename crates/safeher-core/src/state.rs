//! Process-wide service state.
//!
//! Passed by reference (`Arc<ServiceState>`) into the monitor, the watchdog and
//! the control surface. Only the monitor and the watchdog write it.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct ServiceState {
    running: AtomicBool,
    accelerometer_subscribed: AtomicBool,
    watchdog_scheduled: AtomicBool,
}

/// Point-in-time copy of [`ServiceState`] for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub accelerometer_subscribed: bool,
    pub watchdog_scheduled: bool,
}

impl ServiceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_accelerometer_subscribed(&self) -> bool {
        self.accelerometer_subscribed.load(Ordering::Acquire)
    }

    pub fn is_watchdog_scheduled(&self) -> bool {
        self.watchdog_scheduled.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ServiceStatus {
        ServiceStatus {
            running: self.is_running(),
            accelerometer_subscribed: self.is_accelerometer_subscribed(),
            watchdog_scheduled: self.is_watchdog_scheduled(),
        }
    }

    pub(crate) fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::Release);
    }

    pub(crate) fn set_accelerometer_subscribed(&self, value: bool) {
        self.accelerometer_subscribed.store(value, Ordering::Release);
    }

    pub(crate) fn set_watchdog_scheduled(&self, value: bool) {
        self.watchdog_scheduled.store(value, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let state = ServiceState::new();
        assert_eq!(state.snapshot(), ServiceStatus::default());
    }

    #[test]
    fn snapshot_reflects_writes() {
        let state = ServiceState::new();
        state.set_running(true);
        state.set_watchdog_scheduled(true);
        let snap = state.snapshot();
        assert!(snap.running);
        assert!(!snap.accelerometer_subscribed);
        assert!(snap.watchdog_scheduled);
    }
}
