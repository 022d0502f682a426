//! Host capability seams.
//!
//! Everything the core needs from the operating system goes through one of
//! these traits. A host bundles its implementations into a [`Host`]; the core
//! never reaches for a global. The [`memory`] module provides recording
//! in-memory implementations for tests and for hosts that stub a capability.

pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::confirm::ConfirmationPrompt;
use crate::dispatch::Segment;
use crate::error::{CoreError, PlatformError, SmsError};
use crate::gesture::Sample;
use crate::runtime::RuntimeHandle;

/// Identifier of a user-visible notification. Stable across process lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub i32);

/// Persistent status entity of the motion monitor.
pub const MONITOR_STATUS_ID: NotificationId = NotificationId(1001);
/// Confirmation prompt.
pub const PROMPT_ID: NotificationId = NotificationId(1002);
/// Persistent status entity of the dispatch worker.
pub const DISPATCH_STATUS_ID: NotificationId = NotificationId(2001);
/// Alarm request code of the watchdog wakeup.
pub const WATCHDOG_REQUEST_CODE: i32 = 1001;

/// Platform permissions the core checks before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    Sms,
    Notifications,
    Location,
    ExactAlarm,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Sms => "SMS",
            Capability::Notifications => "NOTIFICATIONS",
            Capability::Location => "LOCATION",
            Capability::ExactAlarm => "EXACT_ALARM",
        };
        f.write_str(name)
    }
}

/// Accelerometer delivery rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorRate {
    /// Roughly 5 Hz, the platform "normal" delay.
    Normal,
    /// Roughly 20 Hz, suitable for gesture input.
    Ui,
    /// Roughly 50 Hz.
    Game,
    Fastest,
}

impl SensorRate {
    /// Nominal sampling period.
    pub fn period(self) -> Duration {
        match self {
            SensorRate::Normal => Duration::from_millis(200),
            SensorRate::Ui => Duration::from_millis(50),
            SensorRate::Game => Duration::from_millis(20),
            SensorRate::Fastest => Duration::ZERO,
        }
    }
}

/// Producer end of the sample channel handed to a [`SensorHub`].
///
/// Pushing never blocks, so it is safe to call from a sensor callback.
#[derive(Debug, Clone)]
pub struct SampleSink(mpsc::UnboundedSender<Sample>);

impl SampleSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Sample>) -> Self {
        Self(tx)
    }

    /// Queue a sample. Returns `false` once the consumer is gone.
    pub fn push(&self, sample: Sample) -> bool {
        self.0.send(sample).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// A user-visible persistent notification legitimizing background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntity {
    pub id: NotificationId,
    pub title: String,
    pub text: String,
    /// Cannot be swiped away while the owning task runs.
    pub ongoing: bool,
}

impl StatusEntity {
    pub fn monitor() -> Self {
        Self {
            id: MONITOR_STATUS_ID,
            title: "SafeHer Active".to_string(),
            text: "Shake detection monitoring... Tap to open app".to_string(),
            ongoing: true,
        }
    }

    pub fn dispatch(text: impl Into<String>) -> Self {
        Self {
            id: DISPATCH_STATUS_ID,
            title: "SafeHer Emergency".to_string(),
            text: text.into(),
            ongoing: false,
        }
    }
}

/// Which provider produced a location fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Gps,
    Network,
}

/// A last-known position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f32>,
    pub source: LocationSource,
}

pub trait SensorHub: Send + Sync {
    /// Start delivering accelerometer samples into `sink`.
    fn subscribe(&self, rate: SensorRate, sink: SampleSink) -> Result<(), PlatformError>;

    /// Stop delivery and drop the sink.
    fn unsubscribe(&self);
}

pub trait NotificationCenter: Send + Sync {
    /// Show or update a status entity, keyed by its id.
    fn show_status(&self, status: &StatusEntity) -> Result<(), PlatformError>;

    /// Post the actionable confirmation prompt, replacing any prompt with the
    /// same id. Button presses must be routed to `actions`, possibly long after
    /// this call returns.
    fn post_prompt(
        &self,
        prompt: &ConfirmationPrompt,
        actions: &RuntimeHandle,
    ) -> Result<(), PlatformError>;

    /// Remove a notification. Unknown ids are ignored.
    fn cancel(&self, id: NotificationId);
}

pub trait AlarmScheduler: Send + Sync {
    /// Whether the host lets this app schedule exact wakeups.
    fn can_schedule_exact(&self) -> bool;

    /// Schedule a single exact wakeup that calls `target.watchdog_fired()`.
    /// Scheduling again with the same request code replaces the pending one.
    fn schedule_exact(
        &self,
        request_code: i32,
        after: Duration,
        target: RuntimeHandle,
    ) -> Result<(), PlatformError>;

    fn cancel(&self, request_code: i32);
}

pub trait PowerManager: Send + Sync {
    fn acquire_wake_lock(&self, tag: &str);

    fn release_wake_lock(&self, tag: &str);

    /// Whether the host has exempted the app from background throttling.
    fn is_ignoring_battery_optimizations(&self) -> bool;

    /// Open the host's exemption settings. The outcome is only observable
    /// through a later [`PowerManager::is_ignoring_battery_optimizations`].
    fn request_battery_optimization_exemption(&self) -> Result<(), PlatformError>;
}

pub trait PermissionChecker: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

pub trait LocationProvider: Send + Sync {
    /// Cached fix from `source`; never waits for a fresh one.
    fn last_known(&self, source: LocationSource) -> Option<Location>;
}

pub trait Geocoder: Send + Sync {
    /// Best-effort single-line address for a position.
    fn reverse(&self, location: &Location) -> Result<Option<String>, PlatformError>;
}

pub trait SmsTransport: Send + Sync {
    /// Submit one segment of a multipart message.
    fn send_segment(&self, recipient: &str, segment: &Segment) -> Result<(), SmsError>;
}

/// Read side of the contact store.
pub trait ContactSource: Send + Sync {
    /// The raw comma-joined contact list; empty when nothing is saved.
    fn load_raw(&self) -> Result<String, CoreError>;
}

/// Narrow event hook towards an external UI. Fire-and-forget.
pub trait UiBridge: Send + Sync {
    /// `onShakeWarning`
    fn emit_shake_warning(&self);

    /// `onEmergencyConfirmed`
    fn emit_emergency_confirmed(&self);
}

/// UI bridge used when no front-end is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUi;

impl UiBridge for NoUi {
    fn emit_shake_warning(&self) {}

    fn emit_emergency_confirmed(&self) {}
}

/// The set of capabilities a host provides.
#[derive(Clone)]
pub struct Host {
    pub sensors: Arc<dyn SensorHub>,
    pub notifications: Arc<dyn NotificationCenter>,
    pub alarms: Arc<dyn AlarmScheduler>,
    pub power: Arc<dyn PowerManager>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub location: Arc<dyn LocationProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub sms: Arc<dyn SmsTransport>,
    pub contacts: Arc<dyn ContactSource>,
    pub ui: Arc<dyn UiBridge>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_display_matches_wire_names() {
        assert_eq!(Capability::Sms.to_string(), "SMS");
        assert_eq!(Capability::ExactAlarm.to_string(), "EXACT_ALARM");
        assert_eq!(
            serde_json::to_string(&Capability::Notifications).unwrap(),
            "\"NOTIFICATIONS\""
        );
    }

    #[test]
    fn contractual_ids() {
        assert_eq!(MONITOR_STATUS_ID.0, 1001);
        assert_eq!(PROMPT_ID.0, 1002);
        assert_eq!(DISPATCH_STATUS_ID.0, 2001);
        assert_eq!(WATCHDOG_REQUEST_CODE, 1001);
    }

    #[test]
    fn sink_reports_closed_consumer() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SampleSink::new(tx);
        assert!(sink.push(Sample::new(0.0, 0.0, 9.8, 0)));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.push(Sample::new(0.0, 0.0, 9.8, 1)));
    }
}
