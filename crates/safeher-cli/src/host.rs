//! Terminal host: the capability set behind `safeher run` and `safeher send`.
//!
//! Accelerometer samples come from a CSV replay, prompts are answered
//! automatically, SMS segments land in the `sms_outbox` table and wakeups are
//! plain tokio timers. Permissions, power and location come from the
//! `[simulation]` config section.

use std::collections::HashMap;
use std::error::Error;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use safeher_core::confirm::{Action, ConfirmationPrompt};
use safeher_core::dispatch::Segment;
use safeher_core::platform::memory::{MemoryGeocoder, MemoryLocation, MemoryPermissions, MemoryPower};
use safeher_core::platform::{
    AlarmScheduler, Location, LocationSource, NotificationCenter, NotificationId, SampleSink, SensorHub,
    SensorRate, SmsTransport, StatusEntity, UiBridge,
};
use safeher_core::storage::config::SimulationConfig;
use safeher_core::{Capability, Config, ContactStore, CoreError, Database, Host, PlatformError, RuntimeHandle, Sample, SmsError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parse one `x,y,z,t_ms` line. Blank lines and `#` comments yield `None`.
pub fn parse_sample_line(line: &str) -> Result<Option<Sample>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [x, y, z, t] = fields.as_slice() else {
        return Err(format!("expected x,y,z,t_ms, got {} fields", fields.len()));
    };
    let axis = |name: &str, v: &str| v.parse::<f32>().map_err(|e| format!("bad {name} '{v}': {e}"));
    let t_ms = t.parse::<u64>().map_err(|e| format!("bad t_ms '{t}': {e}"))?;
    Ok(Some(Sample::new(axis("x", x)?, axis("y", y)?, axis("z", z)?, t_ms)))
}

/// Parse a whole CSV replay.
pub fn parse_samples(input: impl Read) -> Result<Vec<Sample>, Box<dyn Error>> {
    let mut samples = Vec::new();
    for (i, line) in BufReader::new(input).lines().enumerate() {
        if let Some(sample) = parse_sample_line(&line?).map_err(|e| format!("line {}: {e}", i + 1))? {
            samples.push(sample);
        }
    }
    Ok(samples)
}

/// Where replayed samples come from.
pub enum ReplaySource {
    Samples(Vec<Sample>),
    /// Read lines from stdin as they arrive.
    Stdin,
}

impl ReplaySource {
    pub fn open(path: Option<&PathBuf>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(p) if p.as_os_str() != "-" => Ok(Self::Samples(parse_samples(std::fs::File::open(p)?)?)),
            _ => Ok(Self::Stdin),
        }
    }
}

/// Accelerometer replaying recorded samples into the monitor.
///
/// The recording is consumed by the first subscription. Later subscriptions
/// (watchdog restarts) stay silent.
pub struct ReplaySensor {
    source: Mutex<Option<ReplaySource>>,
    pace: bool,
    generation: Arc<AtomicU64>,
    done: watch::Sender<bool>,
}

impl ReplaySensor {
    pub fn new(source: ReplaySource, pace: bool) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            source: Mutex::new(Some(source)),
            pace,
            generation: Arc::new(AtomicU64::new(0)),
            done,
        }
    }

    /// Resolves once every recorded sample was pushed.
    pub fn drained(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

impl SensorHub for ReplaySensor {
    fn subscribe(&self, rate: SensorRate, sink: SampleSink) -> Result<(), PlatformError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(source) = lock(&self.source).take() else {
            debug!("replay already consumed, subscription stays idle");
            return Ok(());
        };
        info!(?rate, pace = self.pace, "replaying accelerometer samples");

        let current = self.generation.clone();
        let done = self.done.clone();
        let pace = self.pace;
        std::thread::Builder::new()
            .name("safeher-replay".into())
            .spawn(move || {
                let live = || current.load(Ordering::SeqCst) == generation;
                let mut previous: Option<u64> = None;
                let mut push = |sample: Sample| -> bool {
                    if pace {
                        if let Some(prev) = previous {
                            std::thread::sleep(Duration::from_millis(sample.t_ms.saturating_sub(prev)));
                        }
                        previous = Some(sample.t_ms);
                    }
                    live() && sink.push(sample)
                };

                match source {
                    ReplaySource::Samples(samples) => {
                        for sample in samples {
                            if !push(sample) {
                                break;
                            }
                        }
                    }
                    ReplaySource::Stdin => {
                        for (i, line) in std::io::stdin().lock().lines().enumerate() {
                            let parsed = line.map_err(|e| e.to_string()).and_then(|l| parse_sample_line(&l));
                            match parsed {
                                Ok(Some(sample)) => {
                                    if !push(sample) {
                                        break;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => warn!(line = i + 1, error = %e, "skipping malformed sample"),
                            }
                        }
                    }
                }
                done.send_replace(true);
            })
            .map_err(|e| PlatformError::Failed(e.to_string()))?;
        Ok(())
    }

    fn unsubscribe(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// How the terminal answers confirmation prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAnswer {
    Press(Action),
    Ignore,
}

impl AutoAnswer {
    pub fn from_config(simulation: &SimulationConfig) -> Self {
        match simulation.answer.as_str() {
            "send" => Self::Press(Action::Send),
            "cancel" => Self::Press(Action::Cancel),
            _ => Self::Ignore,
        }
    }
}

/// Logs notifications and presses a prompt button after a delay.
pub struct TerminalNotifications {
    answer: AutoAnswer,
    delay: Duration,
}

impl NotificationCenter for TerminalNotifications {
    fn show_status(&self, status: &StatusEntity) -> Result<(), PlatformError> {
        info!(id = status.id.0, title = %status.title, text = %status.text, "status");
        Ok(())
    }

    fn post_prompt(&self, prompt: &ConfirmationPrompt, actions: &RuntimeHandle) -> Result<(), PlatformError> {
        info!(seq = prompt.gesture_seq, title = %prompt.title, text = %prompt.text, "confirmation prompt");
        let AutoAnswer::Press(action) = self.answer else {
            return Ok(());
        };
        let actions = actions.clone();
        let delay = self.delay;
        std::thread::Builder::new()
            .name("safeher-answer".into())
            .spawn(move || {
                std::thread::sleep(delay);
                info!(%action, "answering prompt");
                actions.deliver_intent(&action.intent(actions.app_id()));
            })
            .map_err(|e| PlatformError::Failed(e.to_string()))?;
        Ok(())
    }

    fn cancel(&self, id: NotificationId) {
        debug!(id = id.0, "notification removed");
    }
}

/// Exact wakeups as tokio sleeps. Must be used from inside a tokio runtime.
#[derive(Default)]
pub struct TokioAlarms {
    exact_allowed: bool,
    pending: Mutex<HashMap<i32, JoinHandle<()>>>,
}

impl AlarmScheduler for TokioAlarms {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed
    }

    fn schedule_exact(&self, request_code: i32, after: Duration, target: RuntimeHandle) -> Result<(), PlatformError> {
        if !self.exact_allowed {
            return Err(PlatformError::Denied(Capability::ExactAlarm));
        }
        let tokio = tokio::runtime::Handle::try_current().map_err(|e| PlatformError::Failed(e.to_string()))?;
        let timer = tokio.spawn(async move {
            tokio::time::sleep(after).await;
            target.watchdog_fired();
        });
        if let Some(previous) = lock(&self.pending).insert(request_code, timer) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel(&self, request_code: i32) {
        if let Some(timer) = lock(&self.pending).remove(&request_code) {
            timer.abort();
        }
    }
}

/// SMS transport that queues every segment in the local outbox table.
pub struct OutboxTransport {
    db: Mutex<Database>,
}

impl OutboxTransport {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl SmsTransport for OutboxTransport {
    fn send_segment(&self, recipient: &str, segment: &Segment) -> Result<(), SmsError> {
        let id = lock(&self.db)
            .record_outbox(recipient, segment)
            .map_err(|e| SmsError::Rejected(e.to_string()))?;
        debug!(id, %recipient, part = segment.index, of = segment.count, "segment queued");
        Ok(())
    }
}

/// Logs UI events and acknowledges confirmed emergencies immediately.
#[derive(Default)]
pub struct TerminalUi {
    runtime: OnceLock<RuntimeHandle>,
}

impl TerminalUi {
    pub fn attach(&self, runtime: RuntimeHandle) {
        if self.runtime.set(runtime).is_err() {
            warn!("terminal UI already attached");
        }
    }
}

impl UiBridge for TerminalUi {
    fn emit_shake_warning(&self) {
        info!("shake warning");
    }

    fn emit_emergency_confirmed(&self) {
        info!("emergency confirmed");
        if let Some(runtime) = self.runtime.get() {
            runtime.acknowledge();
        }
    }
}

/// The assembled terminal host.
pub struct TerminalHost {
    pub host: Host,
    pub sensors: Arc<ReplaySensor>,
    pub ui: Arc<TerminalUi>,
}

impl TerminalHost {
    /// Assemble the host from config and open the outbox and contact store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn build(config: &Config, source: ReplaySource, pace: bool) -> Result<Self, CoreError> {
        let sim = &config.simulation;

        let permissions = MemoryPermissions::none_granted();
        for (granted, capability) in [
            (sim.grant_sms, Capability::Sms),
            (sim.grant_notifications, Capability::Notifications),
            (sim.grant_location, Capability::Location),
            (sim.exact_alarms, Capability::ExactAlarm),
        ] {
            if granted {
                permissions.grant(capability);
            }
        }

        let power = MemoryPower::default();
        power.set_ignoring(sim.ignoring_battery_optimizations);

        let location = MemoryLocation::default();
        if let (Some(latitude), Some(longitude)) = (sim.latitude, sim.longitude) {
            location.set(
                LocationSource::Gps,
                Location {
                    latitude,
                    longitude,
                    accuracy_m: None,
                    source: LocationSource::Gps,
                },
            );
        }
        let geocoder = MemoryGeocoder::default();
        geocoder.set(sim.address.clone());

        let sensors = Arc::new(ReplaySensor::new(source, pace));
        let ui = Arc::new(TerminalUi::default());
        let host = Host {
            sensors: sensors.clone(),
            notifications: Arc::new(TerminalNotifications {
                answer: AutoAnswer::from_config(sim),
                delay: Duration::from_millis(sim.answer_delay_ms),
            }),
            alarms: Arc::new(TokioAlarms {
                exact_allowed: sim.exact_alarms,
                pending: Mutex::default(),
            }),
            power: Arc::new(power),
            permissions: Arc::new(permissions),
            location: Arc::new(location),
            geocoder: Arc::new(geocoder),
            sms: Arc::new(OutboxTransport::new(Database::open()?)),
            contacts: Arc::new(ContactStore::open()?),
            ui: ui.clone(),
        };
        Ok(Self { host, sensors, ui })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_lines() {
        let s = parse_sample_line(" 0.5, -1, 30.0 ,1200").unwrap().unwrap();
        assert_eq!((s.x, s.y, s.z, s.t_ms), (0.5, -1.0, 30.0, 1200));
        assert!(parse_sample_line("# x,y,z,t").unwrap().is_none());
        assert!(parse_sample_line("   ").unwrap().is_none());
        assert!(parse_sample_line("1,2,3").is_err());
        assert!(parse_sample_line("1,2,3,-4").is_err());
    }

    #[test]
    fn replay_file_reports_line_numbers() {
        let err = parse_samples("0,0,9.8,0\n\nfoo,0,0,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("line 3:"));
        let samples = parse_samples("0,0,9.8,0\n0,0,30,500\n".as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn outbox_transport_records_segments() {
        let transport = OutboxTransport::new(Database::open_memory().unwrap());
        let segment = Segment {
            index: 1,
            count: 1,
            text: "help".into(),
        };
        transport.send_segment("+911", &segment).unwrap();
        let rows = lock(&transport.db).list_outbox(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].recipient, "+911");
    }

    #[test]
    fn answer_mode_from_config() {
        let mut sim = SimulationConfig::default();
        sim.answer = "cancel".into();
        assert_eq!(AutoAnswer::from_config(&sim), AutoAnswer::Press(Action::Cancel));
        sim.answer = "ignore".into();
        assert_eq!(AutoAnswer::from_config(&sim), AutoAnswer::Ignore);
    }
}
