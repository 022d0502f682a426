//! Human confirmation between a recognized gesture and a dispatch job.
//!
//! The notifier posts an actionable prompt; the host routes the button press
//! back as an intent string, which becomes a typed [`Action`] and goes through
//! the [`ActionRouter`] before anything is sent.

mod notifier;
mod router;

pub use notifier::{ConfirmationNotifier, ConfirmationPrompt};
pub use router::{ActionRouter, RouteDecision};

use std::fmt;

use serde::{Deserialize, Serialize};

const SEND_SUFFIX: &str = "ACTION_SEND_EMERGENCY";
const CANCEL_SUFFIX: &str = "ACTION_CANCEL_EMERGENCY";

/// The user's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Send,
    Cancel,
}

impl Action {
    /// Intent string carried across the process boundary.
    pub fn intent(self, app_id: &str) -> String {
        let suffix = match self {
            Action::Send => SEND_SUFFIX,
            Action::Cancel => CANCEL_SUFFIX,
        };
        format!("{app_id}.{suffix}")
    }

    /// Parse an intent string. Intents from another namespace are ignored.
    pub fn from_intent(app_id: &str, intent: &str) -> Option<Self> {
        let suffix = intent.strip_prefix(app_id)?.strip_prefix('.')?;
        match suffix {
            SEND_SUFFIX => Some(Action::Send),
            CANCEL_SUFFIX => Some(Action::Cancel),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send => f.write_str("send"),
            Action::Cancel => f.write_str("cancel"),
        }
    }
}
