//! In-memory capability implementations.
//!
//! Every fake records what the core asked of it and exposes knobs to make
//! the next call fail. [`MemoryHost`] bundles one of each with every
//! permission granted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{
    AlarmScheduler, Capability, ContactSource, Geocoder, Host, Location, LocationProvider,
    LocationSource, NotificationCenter, NotificationId, PermissionChecker, PowerManager,
    SampleSink, SensorHub, SensorRate, SmsTransport, StatusEntity, UiBridge,
};
use crate::confirm::{Action, ConfirmationPrompt};
use crate::dispatch::Segment;
use crate::error::{CoreError, PlatformError, SmsError};
use crate::gesture::Sample;
use crate::runtime::RuntimeHandle;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemorySensors {
    sink: Mutex<Option<SampleSink>>,
    rate: Mutex<Option<SensorRate>>,
    unavailable: AtomicBool,
    subscriptions: AtomicUsize,
}

impl MemorySensors {
    /// Deliver one sample to the current subscriber.
    pub fn push(&self, sample: Sample) -> bool {
        lock(&self.sink).as_ref().is_some_and(|sink| sink.push(sample))
    }

    /// Deliver samples in order; returns how many were accepted.
    pub fn push_all(&self, samples: &[Sample]) -> usize {
        samples.iter().take_while(|s| self.push(**s)).count()
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.sink).is_some()
    }

    pub fn rate(&self) -> Option<SensorRate> {
        *lock(&self.rate)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Make the next subscriptions fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl SensorHub for MemorySensors {
    fn subscribe(&self, rate: SensorRate, sink: SampleSink) -> Result<(), PlatformError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("no accelerometer".into()));
        }
        *lock(&self.sink) = Some(sink);
        *lock(&self.rate) = Some(rate);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unsubscribe(&self) {
        *lock(&self.sink) = None;
        *lock(&self.rate) = None;
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotifications {
    statuses: Mutex<Vec<StatusEntity>>,
    prompts: Mutex<Vec<ConfirmationPrompt>>,
    cancelled: Mutex<Vec<NotificationId>>,
    visible: Mutex<HashSet<NotificationId>>,
    deny_status: AtomicBool,
    auto_answer: Mutex<Option<Action>>,
}

impl MemoryNotifications {
    /// Every status update, oldest first.
    pub fn statuses(&self) -> Vec<StatusEntity> {
        lock(&self.statuses).clone()
    }

    pub fn last_status(&self, id: NotificationId) -> Option<StatusEntity> {
        lock(&self.statuses).iter().rev().find(|s| s.id == id).cloned()
    }

    pub fn prompts(&self) -> Vec<ConfirmationPrompt> {
        lock(&self.prompts).clone()
    }

    pub fn cancelled(&self) -> Vec<NotificationId> {
        lock(&self.cancelled).clone()
    }

    pub fn is_visible(&self, id: NotificationId) -> bool {
        lock(&self.visible).contains(&id)
    }

    /// Refuse status entities, as a host with notifications blocked would.
    pub fn deny_status(&self, deny: bool) {
        self.deny_status.store(deny, Ordering::SeqCst);
    }

    /// Press a prompt button as soon as the prompt is posted.
    pub fn answer_with(&self, action: Option<Action>) {
        *lock(&self.auto_answer) = action;
    }
}

impl NotificationCenter for MemoryNotifications {
    fn show_status(&self, status: &StatusEntity) -> Result<(), PlatformError> {
        if self.deny_status.load(Ordering::SeqCst) {
            return Err(PlatformError::Denied(Capability::Notifications));
        }
        lock(&self.statuses).push(status.clone());
        lock(&self.visible).insert(status.id);
        Ok(())
    }

    fn post_prompt(
        &self,
        prompt: &ConfirmationPrompt,
        actions: &RuntimeHandle,
    ) -> Result<(), PlatformError> {
        lock(&self.prompts).push(prompt.clone());
        lock(&self.visible).insert(prompt.id);
        if let Some(action) = *lock(&self.auto_answer) {
            actions.deliver_action(action);
        }
        Ok(())
    }

    fn cancel(&self, id: NotificationId) {
        lock(&self.cancelled).push(id);
        lock(&self.visible).remove(&id);
    }
}

#[derive(Debug)]
pub struct MemoryAlarms {
    exact_allowed: AtomicBool,
    pending: Mutex<HashMap<i32, (Duration, RuntimeHandle)>>,
    scheduled: AtomicUsize,
}

impl Default for MemoryAlarms {
    fn default() -> Self {
        Self {
            exact_allowed: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            scheduled: AtomicUsize::new(0),
        }
    }
}

impl MemoryAlarms {
    pub fn allow_exact(&self, allowed: bool) {
        self.exact_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn pending(&self, request_code: i32) -> Option<Duration> {
        lock(&self.pending).get(&request_code).map(|(after, _)| *after)
    }

    /// Total successful `schedule_exact` calls.
    pub fn schedule_count(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Fire a pending alarm now. Returns `false` when none is pending.
    pub fn fire(&self, request_code: i32) -> bool {
        let entry = lock(&self.pending).remove(&request_code);
        match entry {
            Some((_, target)) => target.watchdog_fired(),
            None => false,
        }
    }
}

impl AlarmScheduler for MemoryAlarms {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::SeqCst)
    }

    fn schedule_exact(
        &self,
        request_code: i32,
        after: Duration,
        target: RuntimeHandle,
    ) -> Result<(), PlatformError> {
        if !self.can_schedule_exact() {
            return Err(PlatformError::Denied(Capability::ExactAlarm));
        }
        lock(&self.pending).insert(request_code, (after, target));
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self, request_code: i32) {
        lock(&self.pending).remove(&request_code);
    }
}

#[derive(Debug, Default)]
pub struct MemoryPower {
    held: Mutex<HashSet<String>>,
    ignoring: AtomicBool,
    exemption_requests: AtomicUsize,
}

impl MemoryPower {
    pub fn is_held(&self, tag: &str) -> bool {
        lock(&self.held).contains(tag)
    }

    pub fn set_ignoring(&self, ignoring: bool) {
        self.ignoring.store(ignoring, Ordering::SeqCst);
    }

    pub fn exemption_requests(&self) -> usize {
        self.exemption_requests.load(Ordering::SeqCst)
    }
}

impl PowerManager for MemoryPower {
    fn acquire_wake_lock(&self, tag: &str) {
        lock(&self.held).insert(tag.to_string());
    }

    fn release_wake_lock(&self, tag: &str) {
        lock(&self.held).remove(tag);
    }

    fn is_ignoring_battery_optimizations(&self) -> bool {
        self.ignoring.load(Ordering::SeqCst)
    }

    fn request_battery_optimization_exemption(&self) -> Result<(), PlatformError> {
        self.exemption_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryPermissions {
    granted: Mutex<HashSet<Capability>>,
}

impl MemoryPermissions {
    pub fn all_granted() -> Self {
        let granted = [
            Capability::Sms,
            Capability::Notifications,
            Capability::Location,
            Capability::ExactAlarm,
        ];
        Self {
            granted: Mutex::new(granted.into_iter().collect()),
        }
    }

    pub fn none_granted() -> Self {
        Self {
            granted: Mutex::new(HashSet::new()),
        }
    }

    pub fn grant(&self, capability: Capability) {
        lock(&self.granted).insert(capability);
    }

    pub fn revoke(&self, capability: Capability) {
        lock(&self.granted).remove(&capability);
    }
}

impl PermissionChecker for MemoryPermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        lock(&self.granted).contains(&capability)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLocation {
    gps: Mutex<Option<Location>>,
    network: Mutex<Option<Location>>,
}

impl MemoryLocation {
    pub fn set(&self, source: LocationSource, location: Location) {
        *self.slot(source) = Some(location);
    }

    pub fn clear(&self) {
        *self.slot(LocationSource::Gps) = None;
        *self.slot(LocationSource::Network) = None;
    }

    fn slot(&self, source: LocationSource) -> MutexGuard<'_, Option<Location>> {
        match source {
            LocationSource::Gps => lock(&self.gps),
            LocationSource::Network => lock(&self.network),
        }
    }
}

impl LocationProvider for MemoryLocation {
    fn last_known(&self, source: LocationSource) -> Option<Location> {
        *self.slot(source)
    }
}

#[derive(Debug, Default)]
pub struct MemoryGeocoder {
    address: Mutex<Option<String>>,
    failing: AtomicBool,
}

impl MemoryGeocoder {
    pub fn set(&self, address: Option<String>) {
        *lock(&self.address) = address;
        self.failing.store(false, Ordering::SeqCst);
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl Geocoder for MemoryGeocoder {
    fn reverse(&self, _location: &Location) -> Result<Option<String>, PlatformError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::Failed("geocoder offline".into()));
        }
        Ok(lock(&self.address).clone())
    }
}

#[derive(Debug, Default)]
pub struct MemorySms {
    sent: Mutex<Vec<(String, Segment)>>,
    failing: Mutex<HashMap<String, SmsError>>,
}

impl MemorySms {
    /// Accepted segments in submission order.
    pub fn sent(&self) -> Vec<(String, Segment)> {
        lock(&self.sent).clone()
    }

    /// The reassembled message last delivered to `recipient`.
    pub fn message_for(&self, recipient: &str) -> Option<String> {
        let sent = lock(&self.sent);
        let mine: Vec<&Segment> = sent
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, s)| s)
            .collect();
        let last_start = mine.iter().rposition(|s| s.index == 1)?;
        Some(mine[last_start..].iter().map(|s| s.text.as_str()).collect())
    }

    /// Distinct recipients in first-delivery order.
    pub fn recipients(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (r, _) in lock(&self.sent).iter() {
            if !out.contains(r) {
                out.push(r.clone());
            }
        }
        out
    }

    pub fn fail_for(&self, recipient: &str, error: SmsError) {
        lock(&self.failing).insert(recipient.to_string(), error);
    }
}

impl SmsTransport for MemorySms {
    fn send_segment(&self, recipient: &str, segment: &Segment) -> Result<(), SmsError> {
        if let Some(e) = lock(&self.failing).get(recipient) {
            return Err(e.clone());
        }
        lock(&self.sent).push((recipient.to_string(), segment.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryContacts {
    raw: Mutex<String>,
    unreadable: AtomicBool,
}

impl MemoryContacts {
    pub fn set(&self, raw: &str) {
        *lock(&self.raw) = raw.to_string();
    }

    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }
}

impl ContactSource for MemoryContacts {
    fn load_raw(&self) -> Result<String, CoreError> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(CoreError::Custom("contact store unreadable".into()));
        }
        Ok(lock(&self.raw).clone())
    }
}

#[derive(Debug, Default)]
pub struct RecordingUi {
    shake_warnings: AtomicUsize,
    confirmations: AtomicUsize,
}

impl RecordingUi {
    pub fn shake_warnings(&self) -> usize {
        self.shake_warnings.load(Ordering::SeqCst)
    }

    pub fn confirmations(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }
}

impl UiBridge for RecordingUi {
    fn emit_shake_warning(&self) {
        self.shake_warnings.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_emergency_confirmed(&self) {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
    }
}

/// One of every fake, all permissions granted.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    pub sensors: Arc<MemorySensors>,
    pub notifications: Arc<MemoryNotifications>,
    pub alarms: Arc<MemoryAlarms>,
    pub power: Arc<MemoryPower>,
    pub permissions: Arc<MemoryPermissions>,
    pub location: Arc<MemoryLocation>,
    pub geocoder: Arc<MemoryGeocoder>,
    pub sms: Arc<MemorySms>,
    pub contacts: Arc<MemoryContacts>,
    pub ui: Arc<RecordingUi>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            sensors: Arc::default(),
            notifications: Arc::default(),
            alarms: Arc::default(),
            power: Arc::default(),
            permissions: Arc::new(MemoryPermissions::all_granted()),
            location: Arc::default(),
            geocoder: Arc::default(),
            sms: Arc::default(),
            contacts: Arc::default(),
            ui: Arc::default(),
        }
    }

    pub fn host(&self) -> Host {
        Host {
            sensors: self.sensors.clone(),
            notifications: self.notifications.clone(),
            alarms: self.alarms.clone(),
            power: self.power.clone(),
            permissions: self.permissions.clone(),
            location: self.location.clone(),
            geocoder: self.geocoder.clone(),
            sms: self.sms.clone(),
            contacts: self.contacts.clone(),
            ui: self.ui.clone(),
        }
    }
}
