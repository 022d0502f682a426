//! Self-healing wakeup.
//!
//! One exact alarm with a fixed request code. Each firing re-arms it, so the
//! watchdog keeps ticking for as long as exact alarms stay allowed. What a
//! firing does is decided by [`crate::monitor::MotionMonitor::on_watchdog_fired`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::platform::{AlarmScheduler, WATCHDOG_REQUEST_CODE};
use crate::runtime::RuntimeHandle;
use crate::state::ServiceState;

/// What a watchdog wakeup did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogOutcome {
    /// Exact alarms are denied; the watchdog stays off until the next start.
    Disabled,
    Restarted,
    AlreadyRunning,
    /// Fired after an explicit stop; ignored.
    Stale,
    RestartFailed,
}

pub struct Watchdog {
    alarms: Arc<dyn AlarmScheduler>,
    state: Arc<ServiceState>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(alarms: Arc<dyn AlarmScheduler>, state: Arc<ServiceState>, interval: Duration) -> Self {
        Self {
            alarms,
            state,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn exact_alarms_allowed(&self) -> bool {
        self.alarms.can_schedule_exact()
    }

    /// Schedule the next wakeup, replacing a pending one. Returns whether an
    /// alarm is now pending.
    pub fn arm(&self, target: &RuntimeHandle) -> bool {
        if !self.exact_alarms_allowed() {
            warn!("exact alarms not allowed, watchdog disabled");
            self.state.set_watchdog_scheduled(false);
            return false;
        }

        match self
            .alarms
            .schedule_exact(WATCHDOG_REQUEST_CODE, self.interval, target.clone())
        {
            Ok(()) => {
                debug!(interval_secs = self.interval.as_secs(), "watchdog armed");
                self.state.set_watchdog_scheduled(true);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to schedule watchdog");
                self.state.set_watchdog_scheduled(false);
                false
            }
        }
    }

    pub fn cancel(&self) {
        self.alarms.cancel(WATCHDOG_REQUEST_CODE);
        self.state.set_watchdog_scheduled(false);
        debug!("watchdog cancelled");
    }
}
