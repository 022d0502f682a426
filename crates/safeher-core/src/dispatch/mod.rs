//! Emergency dispatch: recipients, message composition, SMS segmentation and
//! the per-job worker.

mod message;
mod recipients;
mod segment;
mod worker;

pub use message::{compose, format_timestamp, maps_url, ResolvedLocation, LOCATION_UNAVAILABLE, TIMESTAMP_LAYOUT};
pub use recipients::{normalize_recipient, parse_recipients};
pub use segment::{divide, Encoding, Segment};
pub use worker::{send_to_all, DispatchOutcome, DispatchReport, DispatchWorker, RecipientFailure, SendSummary};
