//! Per-job dispatch worker.
//!
//! Everything here blocks (contact read, geocoding, SMS submission), so each
//! job runs on its own named thread and reports back once with a
//! [`DispatchReport`]. A started job is never cancelled and never retried.

use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::message::{compose, ResolvedLocation};
use super::recipients::parse_recipients;
use super::segment::divide;
use crate::platform::{Capability, Host, LocationSource, SmsTransport, StatusEntity};
use crate::storage::config::DispatchConfig;

pub const THREAD_NAME: &str = "safeher-dispatch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Completed,
    NoContacts,
    PermissionDenied { capability: Capability },
    /// The contact store could not be read.
    Failed { reason: String },
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Completed => "completed",
            DispatchOutcome::NoContacts => "no_contacts",
            DispatchOutcome::PermissionDenied { .. } => "permission_denied",
            DispatchOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientFailure {
    pub recipient: String,
    pub reason: String,
}

/// Result of one job, persisted to the dispatch history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub job_id: Uuid,
    pub gesture_seq: u64,
    pub outcome: DispatchOutcome,
    pub attempted: usize,
    /// Recipients whose segments were all handed to the SMS service. Not a delivery receipt.
    pub submitted: usize,
    pub failures: Vec<RecipientFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Tally of one fan-out over recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub attempted: usize,
    pub submitted: usize,
    pub failures: Vec<RecipientFailure>,
}

/// Send `message` to every recipient in order.
///
/// Segments go out in sequence; the first failing segment abandons that
/// recipient and the loop moves on to the next one.
pub fn send_to_all(sms: &dyn SmsTransport, recipients: &[String], message: &str) -> SendSummary {
    let segments = divide(message);
    let mut summary = SendSummary::default();

    for recipient in recipients {
        summary.attempted += 1;
        let failed = segments
            .iter()
            .find_map(|segment| sms.send_segment(recipient, segment).err().map(|e| (segment.index, e)));

        match failed {
            None => {
                summary.submitted += 1;
                debug!(%recipient, segments = segments.len(), "SMS submitted");
            }
            Some((index, e)) => {
                warn!(%recipient, segment = index, error = %e, "SMS submission failed");
                summary.failures.push(RecipientFailure {
                    recipient: recipient.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    summary
}

pub struct DispatchWorker {
    host: Host,
    config: DispatchConfig,
}

impl DispatchWorker {
    pub fn new(host: Host, config: DispatchConfig) -> Self {
        Self { host, config }
    }

    /// Run the job on a new `safeher-dispatch` thread; `on_done` gets the report.
    pub fn spawn<F>(self, job_id: Uuid, gesture_seq: u64, on_done: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce(DispatchReport) + Send + 'static,
    {
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || on_done(self.run(job_id, gesture_seq)))
    }

    pub fn run(&self, job_id: Uuid, gesture_seq: u64) -> DispatchReport {
        self.run_at(job_id, gesture_seq, Local::now().naive_local())
    }

    /// Run the job with an explicit local wall-clock time for the message.
    pub fn run_at(&self, job_id: Uuid, gesture_seq: u64, now: NaiveDateTime) -> DispatchReport {
        let started_at = Utc::now();
        info!(%job_id, gesture_seq, "dispatch started");
        self.status("Sending emergency alert...");

        let finish = |outcome: DispatchOutcome, summary: SendSummary| DispatchReport {
            job_id,
            gesture_seq,
            outcome,
            attempted: summary.attempted,
            submitted: summary.submitted,
            failures: summary.failures,
            started_at,
            finished_at: Utc::now(),
        };

        let raw = match self.host.contacts.load_raw() {
            Ok(raw) => raw,
            Err(e) => {
                error!(%job_id, error = %e, "failed to read emergency contacts");
                self.status("Emergency alert failed: contacts unreadable.");
                return finish(
                    DispatchOutcome::Failed {
                        reason: e.to_string(),
                    },
                    SendSummary::default(),
                );
            }
        };

        let recipients = parse_recipients(&raw, &self.config.country_prefix);
        if recipients.is_empty() {
            warn!(%job_id, "no emergency contacts saved");
            self.status("No emergency contacts saved.");
            return finish(DispatchOutcome::NoContacts, SendSummary::default());
        }

        if !self.host.permissions.is_granted(Capability::Sms) {
            warn!(%job_id, "SMS permission not granted");
            self.status("SMS permission not granted.");
            return finish(
                DispatchOutcome::PermissionDenied {
                    capability: Capability::Sms,
                },
                SendSummary::default(),
            );
        }

        let location = self.resolve_location();
        let message = compose(&now, location.as_ref(), &self.config);
        let summary = send_to_all(self.host.sms.as_ref(), &recipients, &message);

        self.status(&format!(
            "Emergency alert submitted to {} of {} contacts",
            summary.submitted, summary.attempted
        ));
        info!(
            %job_id,
            submitted = summary.submitted,
            attempted = summary.attempted,
            "dispatch finished"
        );
        finish(DispatchOutcome::Completed, summary)
    }

    /// Last-known GPS fix, then network. Never waits for a fresh fix.
    fn resolve_location(&self) -> Option<ResolvedLocation> {
        if !self.host.permissions.is_granted(Capability::Location) {
            warn!("location permission not granted, sending without location");
            return None;
        }

        let fix = self
            .host
            .location
            .last_known(LocationSource::Gps)
            .or_else(|| self.host.location.last_known(LocationSource::Network));
        let Some(fix) = fix else {
            warn!("no last-known location from any provider");
            return None;
        };

        let address = match self.host.geocoder.reverse(&fix) {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "reverse geocoding failed");
                None
            }
        };
        Some(ResolvedLocation::new(fix.latitude, fix.longitude, address))
    }

    fn status(&self, text: &str) {
        if let Err(e) = self.host.notifications.show_status(&StatusEntity::dispatch(text)) {
            warn!(error = %e, "failed to update dispatch status");
        }
    }
}
