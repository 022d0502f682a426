//! Motion monitor.
//!
//! Owns everything that must exist while shake detection runs: the wake lock,
//! the persistent status entity, the accelerometer subscription, the
//! recognizer task and the watchdog alarm. Only the runtime supervisor drives
//! it, so no method here needs to be reentrant.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;
use crate::gesture::{Sample, ShakeRecognizer, TripleShake};
use crate::platform::{Host, SampleSink, SensorRate, StatusEntity, MONITOR_STATUS_ID};
use crate::runtime::RuntimeHandle;
use crate::state::ServiceState;
use crate::storage::config::DetectionConfig;
use crate::watchdog::{Watchdog, WatchdogOutcome};

pub const WAKE_LOCK_TAG: &str = "safeher:motion-monitor";

/// Who asked the monitor to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartSource {
    Control,
    Watchdog,
    TaskRemoved,
    Boot,
}

impl fmt::Display for StartSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartSource::Control => "control",
            StartSource::Watchdog => "watchdog",
            StartSource::TaskRemoved => "task_removed",
            StartSource::Boot => "boot",
        };
        f.write_str(name)
    }
}

pub struct MotionMonitor {
    host: Host,
    state: Arc<ServiceState>,
    detection: DetectionConfig,
    watchdog: Watchdog,
    recognizer: Option<JoinHandle<()>>,
}

impl MotionMonitor {
    pub fn new(host: Host, state: Arc<ServiceState>, detection: DetectionConfig, watchdog: Watchdog) -> Self {
        Self {
            host,
            state,
            detection,
            watchdog,
            recognizer: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Start monitoring. Returns `Ok(false)` when already running.
    ///
    /// Must be called from inside a tokio runtime; the recognizer runs as a task.
    ///
    /// # Errors
    /// `DisplayDenied` when the status entity is refused, `SensorUnavailable`
    /// when the accelerometer cannot be subscribed. Either way nothing is left
    /// acquired and the monitor stays stopped.
    pub fn start(
        &mut self,
        source: StartSource,
        gestures: &mpsc::UnboundedSender<TripleShake>,
        target: &RuntimeHandle,
    ) -> Result<bool, CoreError> {
        if self.state.is_running() {
            debug!(%source, "motion monitor already running");
            return Ok(false);
        }

        self.host.power.acquire_wake_lock(WAKE_LOCK_TAG);

        if let Err(e) = self.host.notifications.show_status(&StatusEntity::monitor()) {
            error!(%source, error = %e, "status notification refused");
            self.host.power.release_wake_lock(WAKE_LOCK_TAG);
            return Err(CoreError::DisplayDenied);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.host.sensors.subscribe(SensorRate::Ui, SampleSink::new(tx)) {
            error!(%source, error = %e, "accelerometer subscription failed");
            self.host.notifications.cancel(MONITOR_STATUS_ID);
            self.host.power.release_wake_lock(WAKE_LOCK_TAG);
            return Err(CoreError::SensorUnavailable(e.to_string()));
        }
        self.state.set_accelerometer_subscribed(true);

        let recognizer = ShakeRecognizer::new(self.detection.clone());
        self.recognizer = Some(tokio::spawn(recognize(rx, recognizer, gestures.clone())));

        self.state.set_running(true);
        self.watchdog.arm(target);
        info!(%source, "motion monitor started");
        Ok(true)
    }

    /// Tear everything down. Returns whether the monitor was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.state.is_running();

        if self.state.is_accelerometer_subscribed() {
            self.host.sensors.unsubscribe();
            self.state.set_accelerometer_subscribed(false);
        }
        if let Some(task) = self.recognizer.take() {
            task.abort();
        }
        self.watchdog.cancel();

        if was_running {
            self.host.notifications.cancel(MONITOR_STATUS_ID);
            self.host.power.release_wake_lock(WAKE_LOCK_TAG);
            self.state.set_running(false);
            info!("motion monitor stopped");
        } else {
            debug!("motion monitor already stopped");
        }
        was_running
    }

    /// The app's task was swiped away: come back and keep the watchdog armed.
    pub fn on_task_dismissed(
        &mut self,
        gestures: &mpsc::UnboundedSender<TripleShake>,
        target: &RuntimeHandle,
    ) -> Result<bool, CoreError> {
        let started = self.start(StartSource::TaskRemoved, gestures, target);
        if !self.state.is_watchdog_scheduled() {
            self.watchdog.arm(target);
        }
        started
    }

    pub fn on_watchdog_fired(
        &mut self,
        gestures: &mpsc::UnboundedSender<TripleShake>,
        target: &RuntimeHandle,
    ) -> WatchdogOutcome {
        self.state.set_watchdog_scheduled(false);

        if !self.watchdog.exact_alarms_allowed() {
            warn!("watchdog fired but exact alarms are no longer allowed; not rescheduling");
            return WatchdogOutcome::Disabled;
        }

        let outcome = match self.start(StartSource::Watchdog, gestures, target) {
            Ok(true) => WatchdogOutcome::Restarted,
            Ok(false) => WatchdogOutcome::AlreadyRunning,
            Err(e) => {
                warn!(error = %e, "watchdog restart failed");
                WatchdogOutcome::RestartFailed
            }
        };
        // A successful start already armed the next wakeup.
        if outcome != WatchdogOutcome::Restarted {
            self.watchdog.arm(target);
        }
        outcome
    }
}

/// Sole consumer of the sample channel for one subscription.
async fn recognize(
    mut samples: mpsc::UnboundedReceiver<Sample>,
    mut recognizer: ShakeRecognizer,
    gestures: mpsc::UnboundedSender<TripleShake>,
) {
    while let Some(sample) = samples.recv().await {
        if let Some(gesture) = recognizer.process(&sample) {
            if gestures.send(gesture).is_err() {
                break;
            }
        }
    }
    debug!(stats = ?recognizer.stats(), "recognizer finished");
}
