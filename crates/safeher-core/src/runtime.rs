//! Runtime supervisor.
//!
//! One tokio task owns the motion monitor, the confirmation notifier and the
//! action router. Everything else talks to it through a [`RuntimeHandle`],
//! which only enqueues commands, so host callbacks (alarm delivery, prompt
//! buttons, task dismissal) never do work on the caller's thread.
//!
//! ```text
//! sensor -> recognizer task -> gestures ─┐
//! host callbacks -> RuntimeHandle -> commands ─┤-> supervisor -> dispatch thread
//! prompt deadline / UI redelivery ──────────────┘
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::confirm::{Action, ActionRouter, ConfirmationNotifier, RouteDecision};
use crate::dispatch::{DispatchReport, DispatchWorker};
use crate::error::CoreError;
use crate::events::Event;
use crate::gesture::TripleShake;
use crate::monitor::{MotionMonitor, StartSource};
use crate::platform::Host;
use crate::state::{ServiceState, ServiceStatus};
use crate::storage::Config;
use crate::watchdog::{Watchdog, WatchdogOutcome};

const EVENT_CAPACITY: usize = 256;

pub(crate) enum Command {
    Start {
        source: StartSource,
        reply: Option<oneshot::Sender<Result<bool, CoreError>>>,
    },
    Stop {
        reply: Option<oneshot::Sender<bool>>,
    },
    TaskDismissed,
    WatchdogFired,
    Action(Action),
    Acknowledge,
    DispatchFinished(DispatchReport),
    Shutdown,
}

/// Cheap, cloneable entry point into a running [`Runtime`].
///
/// Every method returns immediately. The boolean results only say whether the
/// command was queued; they are `false` once the runtime has exited.
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
    state: Arc<ServiceState>,
    app_id: Arc<str>,
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("app_id", &self.app_id)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl RuntimeHandle {
    fn send(&self, command: Command) -> bool {
        let queued = self.commands.send(command).is_ok();
        if !queued {
            debug!("runtime is gone, command dropped");
        }
        queued
    }

    /// Start the monitor and wait for the outcome.
    ///
    /// Returns `Ok(false)` when it was already running.
    pub async fn start(&self, source: StartSource) -> Result<bool, CoreError> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Start {
            source,
            reply: Some(tx),
        }) {
            return Err(CoreError::StartError("runtime is not running".into()));
        }
        rx.await
            .map_err(|_| CoreError::StartError("runtime exited before starting".into()))?
    }

    /// Fire-and-forget start, for boot and other host callbacks.
    pub fn request_start(&self, source: StartSource) -> bool {
        self.send(Command::Start {
            source,
            reply: None,
        })
    }

    /// Stop the monitor. Returns whether it was running.
    pub async fn stop(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Stop { reply: Some(tx) }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn request_stop(&self) -> bool {
        self.send(Command::Stop { reply: None })
    }

    pub fn task_dismissed(&self) -> bool {
        self.send(Command::TaskDismissed)
    }

    /// Called by the alarm scheduler when the watchdog wakeup fires.
    pub fn watchdog_fired(&self) -> bool {
        self.send(Command::WatchdogFired)
    }

    pub fn deliver_action(&self, action: Action) -> bool {
        self.send(Command::Action(action))
    }

    /// Route a raw intent string. Intents outside this app's namespace are dropped.
    pub fn deliver_intent(&self, intent: &str) -> bool {
        match Action::from_intent(&self.app_id, intent) {
            Some(action) => self.deliver_action(action),
            None => {
                warn!(%intent, "ignoring unknown intent");
                false
            }
        }
    }

    /// Stop redelivering the emergency-confirmed UI event.
    pub fn acknowledge(&self) -> bool {
        self.send(Command::Acknowledge)
    }

    /// Stop the monitor, wait for running dispatch jobs, then exit the loop.
    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &Arc<ServiceState> {
        &self.state
    }

    pub fn status(&self) -> ServiceStatus {
        self.state.snapshot()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub(crate) fn dispatch_finished(&self, report: DispatchReport) -> bool {
        self.send(Command::DispatchFinished(report))
    }
}

struct Redelivery {
    next: Instant,
    remaining: u32,
}

struct Supervisor {
    host: Host,
    config: Config,
    handle: RuntimeHandle,
    monitor: MotionMonitor,
    notifier: ConfirmationNotifier,
    router: ActionRouter,
    gesture_tx: mpsc::UnboundedSender<TripleShake>,
    epoch: Instant,
    gesture_seq: u64,
    /// Seq of the most recent prompt; kept after it resolves for dedupe.
    prompt_seq: Option<u64>,
    prompt_deadline: Option<(u64, Instant)>,
    redelivery: Option<Redelivery>,
    stopped_explicitly: bool,
    jobs_in_flight: usize,
    shutting_down: bool,
}

pub struct Runtime {
    supervisor: Supervisor,
    commands: mpsc::UnboundedReceiver<Command>,
    gestures: mpsc::UnboundedReceiver<TripleShake>,
}

impl Runtime {
    pub fn new(host: Host, config: Config) -> (Self, RuntimeHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (gesture_tx, gestures) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = Arc::new(ServiceState::new());

        let handle = RuntimeHandle {
            commands: command_tx,
            events,
            state: state.clone(),
            app_id: Arc::from(config.prompt.app_id.as_str()),
        };

        let watchdog = Watchdog::new(host.alarms.clone(), state.clone(), config.watchdog.interval());
        let monitor = MotionMonitor::new(host.clone(), state, config.detection.clone(), watchdog);
        let notifier = ConfirmationNotifier::new(
            host.notifications.clone(),
            config.prompt.timeout(),
            config.prompt.app_id.clone(),
        );
        let router = ActionRouter::new(config.prompt.dedupe_window_ms);

        let supervisor = Supervisor {
            host,
            config,
            handle: handle.clone(),
            monitor,
            notifier,
            router,
            gesture_tx,
            epoch: Instant::now(),
            gesture_seq: 0,
            prompt_seq: None,
            prompt_deadline: None,
            redelivery: None,
            stopped_explicitly: false,
            jobs_in_flight: 0,
            shutting_down: false,
        };

        let runtime = Self {
            supervisor,
            commands,
            gestures,
        };
        (runtime, handle)
    }

    pub fn state(&self) -> Arc<ServiceState> {
        self.supervisor.handle.state.clone()
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.supervisor.handle.clone()
    }

    /// Run until [`RuntimeHandle::shutdown`].
    pub async fn run(self) {
        let Runtime {
            mut supervisor,
            mut commands,
            mut gestures,
        } = self;
        info!("runtime started");

        loop {
            let prompt_deadline = supervisor.prompt_deadline.map(|(_, at)| at);
            let redelivery_at = supervisor.redelivery.as_ref().map(|r| r.next);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => supervisor.handle_command(command),
                    None => supervisor.begin_shutdown(),
                },
                Some(gesture) = gestures.recv() => supervisor.on_gesture(gesture),
                _ = wait_until(prompt_deadline) => supervisor.on_prompt_expired(),
                _ = wait_until(redelivery_at) => supervisor.on_redelivery_due(),
            }

            if supervisor.shutting_down && supervisor.jobs_in_flight == 0 {
                break;
            }
        }

        info!("runtime stopped");
    }
}

/// Resolves at `deadline`, or never when there is none.
fn wait_until(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }
}

impl Supervisor {
    fn publish(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.handle.events.send(event);
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { source, reply } => {
                self.stopped_explicitly = false;
                let result = self.start(source);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Stop { reply } => {
                self.stopped_explicitly = true;
                let was_running = self.stop();
                if let Some(reply) = reply {
                    let _ = reply.send(was_running);
                }
            }
            Command::TaskDismissed => self.on_task_dismissed(),
            Command::WatchdogFired => self.on_watchdog_fired(),
            Command::Action(action) => self.on_action(action),
            Command::Acknowledge => {
                if self.redelivery.take().is_some() {
                    debug!("emergency event acknowledged");
                }
                self.publish(Event::EmergencyEventAcknowledged { at: Utc::now() });
            }
            Command::DispatchFinished(report) => {
                self.jobs_in_flight = self.jobs_in_flight.saturating_sub(1);
                self.publish(Event::DispatchFinished {
                    report,
                    at: Utc::now(),
                });
            }
            Command::Shutdown => self.begin_shutdown(),
        }
    }

    fn start(&mut self, source: StartSource) -> Result<bool, CoreError> {
        if self.shutting_down {
            return Err(CoreError::StartError("runtime is shutting down".into()));
        }
        let result = self.monitor.start(source, &self.gesture_tx, &self.handle);
        self.publish_start(source, &result);
        result
    }

    fn publish_start(&self, source: StartSource, result: &Result<bool, CoreError>) {
        match result {
            Ok(true) => self.publish(Event::MonitorStarted {
                source,
                at: Utc::now(),
            }),
            Ok(false) => {}
            Err(e) => self.publish(Event::MonitorStartFailed {
                source,
                reason: e.to_string(),
                at: Utc::now(),
            }),
        }
    }

    fn stop(&mut self) -> bool {
        let was_running = self.monitor.stop();
        if was_running {
            self.publish(Event::MonitorStopped { at: Utc::now() });
        }
        was_running
    }

    fn on_task_dismissed(&mut self) {
        if self.stopped_explicitly || self.shutting_down {
            debug!("task dismissed while stopped, nothing to restore");
            return;
        }
        let result = self.monitor.on_task_dismissed(&self.gesture_tx, &self.handle);
        self.publish_start(StartSource::TaskRemoved, &result);
    }

    fn on_watchdog_fired(&mut self) {
        let outcome = if self.stopped_explicitly || self.shutting_down {
            info!("stale watchdog wakeup after stop, ignoring");
            WatchdogOutcome::Stale
        } else {
            let was_running = self.monitor.is_running();
            let outcome = self.monitor.on_watchdog_fired(&self.gesture_tx, &self.handle);
            if outcome == WatchdogOutcome::Restarted && !was_running {
                self.publish(Event::MonitorStarted {
                    source: StartSource::Watchdog,
                    at: Utc::now(),
                });
            }
            outcome
        };
        info!(?outcome, "watchdog fired");
        self.publish(Event::WatchdogFired {
            outcome,
            at: Utc::now(),
        });
    }

    fn on_gesture(&mut self, gesture: TripleShake) {
        if self.shutting_down {
            return;
        }
        self.gesture_seq += 1;
        let seq = self.gesture_seq;
        self.publish(Event::GestureDetected {
            seq,
            first_shake_ms: gesture.first_shake_ms,
            at_ms: gesture.at_ms,
            at: Utc::now(),
        });
        self.host.ui.emit_shake_warning();

        match self.notifier.post(&gesture, seq, &self.handle) {
            Ok(prompt) => {
                self.prompt_seq = Some(seq);
                self.prompt_deadline = Some((seq, Instant::now() + prompt.timeout()));
                self.publish(Event::PromptPosted {
                    seq,
                    at: Utc::now(),
                });
            }
            Err(e) => warn!(seq, error = %e, "failed to post confirmation prompt"),
        }
    }

    fn on_prompt_expired(&mut self) {
        if let Some((seq, _)) = self.prompt_deadline.take() {
            self.router.expire(seq);
            self.notifier.dismiss();
            info!(seq, "confirmation prompt expired, treating as cancel");
            self.publish(Event::PromptExpired {
                seq,
                at: Utc::now(),
            });
        }
    }

    fn on_action(&mut self, action: Action) {
        if self.shutting_down {
            warn!(%action, "runtime shutting down, action dropped");
            return;
        }
        let now_ms = self.now_ms();
        let decision = self.router.route(action, self.prompt_seq, now_ms);

        let (seq, duplicate) = match decision {
            RouteDecision::Dispatch { seq } | RouteDecision::Cancelled { seq } => (seq, false),
            RouteDecision::Duplicate { seq } => (seq, true),
        };
        self.publish(Event::PromptResolved {
            action,
            seq,
            duplicate,
            at: Utc::now(),
        });

        match decision {
            RouteDecision::Duplicate { .. } => {}
            RouteDecision::Cancelled { .. } => {
                self.prompt_deadline = None;
                self.notifier.dismiss();
            }
            RouteDecision::Dispatch { seq } => {
                self.prompt_deadline = None;
                self.notifier.dismiss();
                self.host.ui.emit_emergency_confirmed();
                let attempts = self.config.ui.redelivery_max_attempts;
                self.redelivery = (attempts > 1).then(|| Redelivery {
                    next: Instant::now() + self.config.ui.redelivery_interval(),
                    remaining: attempts - 1,
                });
                // Seq 0 marks a send with no prompt known to this process.
                self.spawn_dispatch(seq.unwrap_or(0));
            }
        }
    }

    fn spawn_dispatch(&mut self, gesture_seq: u64) {
        let job_id = Uuid::new_v4();
        let worker = DispatchWorker::new(self.host.clone(), self.config.dispatch.clone());
        let handle = self.handle.clone();
        match worker.spawn(job_id, gesture_seq, move |report| {
            handle.dispatch_finished(report);
        }) {
            Ok(_) => {
                self.jobs_in_flight += 1;
                self.publish(Event::DispatchStarted {
                    job_id,
                    gesture_seq,
                    at: Utc::now(),
                });
            }
            Err(e) => error!(%job_id, error = %e, "failed to spawn dispatch thread"),
        }
    }

    fn on_redelivery_due(&mut self) {
        let Some(redelivery) = self.redelivery.as_mut() else {
            return;
        };
        self.host.ui.emit_emergency_confirmed();
        redelivery.remaining -= 1;
        if redelivery.remaining == 0 {
            warn!("emergency event never acknowledged, giving up redelivery");
            self.redelivery = None;
        } else {
            redelivery.next = Instant::now() + self.config.ui.redelivery_interval();
        }
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.prompt_deadline = None;
        self.redelivery = None;
        self.stop();
        if self.jobs_in_flight > 0 {
            info!(jobs = self.jobs_in_flight, "waiting for dispatch jobs before exit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryHost;

    #[tokio::test]
    async fn start_reply_and_shutdown() {
        let mem = MemoryHost::new();
        let (runtime, handle) = Runtime::new(mem.host(), Config::default());
        let task = tokio::spawn(runtime.run());

        assert!(handle.start(StartSource::Control).await.unwrap());
        assert!(!handle.start(StartSource::Control).await.unwrap());
        assert!(handle.status().running);

        handle.shutdown();
        task.await.unwrap();
        assert!(!handle.status().running);
        assert!(handle.start(StartSource::Control).await.is_err());
    }

    #[tokio::test]
    async fn foreign_intents_are_rejected() {
        let mem = MemoryHost::new();
        let (_runtime, handle) = Runtime::new(mem.host(), Config::default());
        assert!(!handle.deliver_intent("com.evil.ACTION_SEND_EMERGENCY"));
        assert!(handle.deliver_intent("com.safeher.app.ACTION_CANCEL_EMERGENCY"));
    }
}
