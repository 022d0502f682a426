use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::confirm::Action;
use crate::dispatch::DispatchReport;
use crate::monitor::StartSource;
use crate::watchdog::WatchdogOutcome;

/// Every state change in the runtime produces an Event.
/// Hosts and the CLI subscribe to them through `RuntimeHandle::subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    MonitorStarted {
        source: StartSource,
        at: DateTime<Utc>,
    },
    MonitorStopped {
        at: DateTime<Utc>,
    },
    MonitorStartFailed {
        source: StartSource,
        reason: String,
        at: DateTime<Utc>,
    },
    GestureDetected {
        seq: u64,
        first_shake_ms: u64,
        at_ms: u64,
        at: DateTime<Utc>,
    },
    PromptPosted {
        seq: u64,
        at: DateTime<Utc>,
    },
    /// A prompt answer was routed. `duplicate` answers start nothing.
    PromptResolved {
        action: Action,
        seq: Option<u64>,
        duplicate: bool,
        at: DateTime<Utc>,
    },
    /// The prompt timed out; treated as a cancel.
    PromptExpired {
        seq: u64,
        at: DateTime<Utc>,
    },
    DispatchStarted {
        job_id: Uuid,
        gesture_seq: u64,
        at: DateTime<Utc>,
    },
    DispatchFinished {
        report: DispatchReport,
        at: DateTime<Utc>,
    },
    WatchdogFired {
        outcome: WatchdogOutcome,
        at: DateTime<Utc>,
    },
    EmergencyEventAcknowledged {
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::MonitorStarted { at, .. }
            | Event::MonitorStopped { at }
            | Event::MonitorStartFailed { at, .. }
            | Event::GestureDetected { at, .. }
            | Event::PromptPosted { at, .. }
            | Event::PromptResolved { at, .. }
            | Event::PromptExpired { at, .. }
            | Event::DispatchStarted { at, .. }
            | Event::DispatchFinished { at, .. }
            | Event::WatchdogFired { at, .. }
            | Event::EmergencyEventAcknowledged { at } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = Event::PromptPosted {
            seq: 4,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PromptPosted");
        assert_eq!(json["seq"], 4);

        let back: Event = serde_json::from_value(json).unwrap();
        assert!(matches!(back, Event::PromptPosted { seq: 4, .. }));
    }

    #[test]
    fn watchdog_outcome_is_snake_case() {
        let event = Event::WatchdogFired {
            outcome: WatchdogOutcome::AlreadyRunning,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["outcome"], "already_running");
    }
}
