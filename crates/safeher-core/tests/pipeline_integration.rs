//! End-to-end runtime flows over the in-memory host: sensor samples in,
//! prompts, actions, dispatch jobs and watchdog wakeups out.

use std::time::Duration;

use safeher_core::confirm::Action;
use safeher_core::dispatch::{divide, DispatchOutcome};
use safeher_core::gesture::Sample;
use safeher_core::monitor::StartSource;
use safeher_core::platform::memory::MemoryHost;
use safeher_core::platform::{MONITOR_STATUS_ID, PROMPT_ID, WATCHDOG_REQUEST_CODE};
use safeher_core::storage::Config;
use safeher_core::{Event, Runtime, RuntimeHandle, WatchdogOutcome};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct Harness {
    mem: MemoryHost,
    handle: RuntimeHandle,
    events: broadcast::Receiver<Event>,
    task: JoinHandle<()>,
}

impl Harness {
    fn new(config: Config) -> Self {
        let mem = MemoryHost::new();
        mem.contacts.set("9876543210, +14085551234 , ");
        let (runtime, handle) = Runtime::new(mem.host(), config);
        let events = handle.subscribe();
        let task = tokio::spawn(runtime.run());
        Self {
            mem,
            handle,
            events,
            task,
        }
    }

    async fn next(&mut self, pred: impl Fn(&Event) -> bool) -> Event {
        let events = &mut self.events;
        timeout(Duration::from_secs(3), async {
            loop {
                match events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Three spaced shakes at default slop.
    fn shake(&self, offset_ms: u64) {
        let samples = [
            Sample::new(0.0, 0.0, 30.0, offset_ms),
            Sample::new(0.0, 0.0, 9.8, offset_ms + 300),
            Sample::new(0.0, 0.0, 30.0, offset_ms + 600),
            Sample::new(0.0, 0.0, 30.0, offset_ms + 1200),
        ];
        assert_eq!(self.mem.sensors.push_all(&samples), samples.len());
    }

    async fn finish(self) {
        self.handle.shutdown();
        timeout(Duration::from_secs(3), self.task)
            .await
            .expect("runtime did not exit")
            .unwrap();
    }
}

fn is_dispatch_started(e: &Event) -> bool {
    matches!(e, Event::DispatchStarted { .. })
}

#[tokio::test]
async fn test_start_twice_matches_single_start() {
    let h = Harness::new(Config::default());
    assert!(h.handle.start(StartSource::Control).await.unwrap());
    let once = h.handle.status();
    assert!(!h.handle.start(StartSource::Control).await.unwrap());
    assert_eq!(h.handle.status(), once);
    assert_eq!(h.mem.sensors.subscription_count(), 1);
    assert!(h.mem.notifications.is_visible(MONITOR_STATUS_ID));
    h.finish().await;
}

#[tokio::test]
async fn test_stop_twice_is_noop() {
    let h = Harness::new(Config::default());
    h.handle.start(StartSource::Control).await.unwrap();
    assert!(h.handle.stop().await);
    let after_first = h.handle.status();
    assert!(!h.handle.stop().await);
    assert_eq!(h.handle.status(), after_first);
    assert!(!after_first.running);
    assert!(!after_first.watchdog_scheduled);
    h.finish().await;
}

#[tokio::test]
async fn test_confirmed_gesture_dispatches_to_contacts_in_order() {
    let mut h = Harness::new(Config::default());
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);

    let Event::PromptPosted { seq, .. } = h.next(|e| matches!(e, Event::PromptPosted { .. })).await else {
        unreachable!()
    };
    assert_eq!(seq, 1);
    assert_eq!(h.mem.ui.shake_warnings(), 1);
    assert_eq!(h.mem.notifications.prompts().len(), 1);

    assert!(h.handle.deliver_intent("com.safeher.app.ACTION_SEND_EMERGENCY"));
    let finished = h.next(|e| matches!(e, Event::DispatchFinished { .. })).await;
    let Event::DispatchFinished { report, .. } = finished else {
        unreachable!()
    };
    assert_eq!(report.outcome, DispatchOutcome::Completed);
    assert_eq!(report.gesture_seq, 1);
    assert_eq!((report.submitted, report.attempted), (2, 2));
    assert_eq!(h.mem.sms.recipients(), vec!["+919876543210", "+14085551234"]);
    assert!(!h.mem.notifications.is_visible(PROMPT_ID));
    assert!(h.mem.ui.confirmations() >= 1);
    h.finish().await;
}

#[tokio::test]
async fn test_every_gesture_posts_one_replacing_prompt() {
    let mut h = Harness::new(Config::default());
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);
    h.next(|e| matches!(e, Event::PromptPosted { seq: 1, .. })).await;
    h.shake(5000);
    h.next(|e| matches!(e, Event::PromptPosted { seq: 2, .. })).await;

    let prompts = h.mem.notifications.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts.iter().all(|p| p.id == PROMPT_ID));
    assert_eq!(prompts[1].gesture_seq, 2);
    h.finish().await;
}

#[tokio::test]
async fn test_prompt_timeout_creates_no_job() {
    let mut config = Config::default();
    config.prompt.timeout_ms = 50;
    let mut h = Harness::new(config);
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);

    let expired = h.next(|e| matches!(e, Event::PromptExpired { .. }) || is_dispatch_started(e)).await;
    assert!(matches!(expired, Event::PromptExpired { seq: 1, .. }));
    assert!(!h.mem.notifications.is_visible(PROMPT_ID));
    assert!(h.mem.sms.sent().is_empty());
    h.finish().await;
}

#[tokio::test]
async fn test_send_after_expiry_creates_no_job() {
    let mut config = Config::default();
    config.prompt.timeout_ms = 50;
    let mut h = Harness::new(config);
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);
    h.next(|e| matches!(e, Event::PromptExpired { seq: 1, .. })).await;

    // A late tap on the stale notification must not send anything.
    h.handle.deliver_action(Action::Cancel);
    h.handle.deliver_action(Action::Send);
    let resolved = h.next(|e| matches!(e, Event::PromptResolved { action: Action::Send, .. })).await;
    assert!(matches!(resolved, Event::PromptResolved { seq: Some(1), duplicate: true, .. }));

    h.handle.shutdown();
    timeout(Duration::from_secs(3), &mut h.task)
        .await
        .expect("runtime did not exit")
        .unwrap();
    let mut rest = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        rest.push(event);
    }
    assert!(!rest.iter().any(is_dispatch_started));
    assert_eq!(h.mem.ui.confirmations(), 0);
    assert!(h.mem.sms.sent().is_empty());
}

#[tokio::test]
async fn test_repeated_send_produces_one_job() {
    let mut h = Harness::new(Config::default());
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);
    h.next(|e| matches!(e, Event::PromptPosted { .. })).await;

    h.handle.deliver_action(Action::Send);
    h.handle.deliver_action(Action::Send);

    h.next(|e| matches!(e, Event::PromptResolved { duplicate: false, .. })).await;
    h.next(|e| matches!(e, Event::PromptResolved { duplicate: true, .. })).await;
    h.next(|e| matches!(e, Event::DispatchFinished { .. })).await;
    let message = h.mem.sms.message_for("+14085551234").unwrap();
    let sent_to_one = h.mem.sms.sent().iter().filter(|(r, _)| r == "+14085551234").count();
    assert_eq!(sent_to_one, divide(&message).len());
    h.finish().await;
}

#[tokio::test]
async fn test_cancel_dismisses_without_job() {
    let mut h = Harness::new(Config::default());
    h.mem.notifications.answer_with(Some(Action::Cancel));
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);

    h.next(|e| matches!(e, Event::PromptResolved { action: Action::Cancel, .. })).await;
    assert!(!h.mem.notifications.is_visible(PROMPT_ID));
    assert_eq!(h.mem.ui.confirmations(), 0);
    let mem = h.mem.clone();
    h.finish().await;
    assert!(mem.sms.sent().is_empty());
}

#[tokio::test]
async fn test_watchdog_rearms_and_goes_stale_after_stop() {
    let mut h = Harness::new(Config::default());
    h.handle.start(StartSource::Control).await.unwrap();

    assert!(h.mem.alarms.fire(WATCHDOG_REQUEST_CODE));
    let fired = h.next(|e| matches!(e, Event::WatchdogFired { .. })).await;
    assert!(matches!(
        fired,
        Event::WatchdogFired {
            outcome: WatchdogOutcome::AlreadyRunning,
            ..
        }
    ));
    assert!(h.mem.alarms.pending(WATCHDOG_REQUEST_CODE).is_some());

    h.handle.stop().await;
    h.handle.watchdog_fired();
    let fired = h.next(|e| matches!(e, Event::WatchdogFired { .. })).await;
    assert!(matches!(
        fired,
        Event::WatchdogFired {
            outcome: WatchdogOutcome::Stale,
            ..
        }
    ));
    assert!(!h.handle.status().running);
    h.finish().await;
}

#[tokio::test]
async fn test_boot_start_then_watchdog_restart_after_failure() {
    let mut h = Harness::new(Config::default());
    h.mem.sensors.set_unavailable(true);
    h.handle.request_start(StartSource::Boot);
    h.next(|e| matches!(e, Event::MonitorStartFailed { source: StartSource::Boot, .. })).await;

    // Task dismissal keeps the watchdog armed even though start failed.
    h.handle.task_dismissed();
    h.next(|e| matches!(e, Event::MonitorStartFailed { source: StartSource::TaskRemoved, .. })).await;
    assert!(h.handle.status().watchdog_scheduled);

    h.mem.sensors.set_unavailable(false);
    assert!(h.mem.alarms.fire(WATCHDOG_REQUEST_CODE));
    h.next(|e| matches!(e, Event::MonitorStarted { source: StartSource::Watchdog, .. })).await;
    assert!(h.handle.status().running);
    h.finish().await;
}

#[tokio::test]
async fn test_confirmed_event_redelivered_until_acknowledged() {
    let mut config = Config::default();
    config.ui.redelivery_interval_ms = 20;
    config.ui.redelivery_max_attempts = 3;
    let mut h = Harness::new(config);
    h.mem.notifications.answer_with(Some(Action::Send));
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);
    h.next(|e| matches!(e, Event::DispatchFinished { .. })).await;

    timeout(Duration::from_secs(2), async {
        while h.mem.ui.confirmations() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("confirmed event was not redelivered");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.mem.ui.confirmations(), 3);

    h.handle.acknowledge();
    h.next(|e| matches!(e, Event::EmergencyEventAcknowledged { .. })).await;
    h.finish().await;
}

#[tokio::test]
async fn test_acknowledge_stops_redelivery() {
    let mut config = Config::default();
    config.ui.redelivery_interval_ms = 50;
    let mut h = Harness::new(config);
    h.mem.notifications.answer_with(Some(Action::Send));
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);
    h.next(|e| matches!(e, Event::PromptResolved { .. })).await;
    h.handle.acknowledge();
    h.next(|e| matches!(e, Event::EmergencyEventAcknowledged { .. })).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.mem.ui.confirmations(), 1);
    h.finish().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_running_job() {
    let mut h = Harness::new(Config::default());
    h.mem.notifications.answer_with(Some(Action::Send));
    h.handle.start(StartSource::Control).await.unwrap();
    h.shake(0);
    h.next(is_dispatch_started).await;

    h.handle.shutdown();
    h.next(|e| matches!(e, Event::DispatchFinished { .. })).await;
    timeout(Duration::from_secs(3), h.task)
        .await
        .expect("runtime did not exit")
        .unwrap();
    assert!(!h.handle.status().running);
}
