use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Action;
use crate::error::PlatformError;
use crate::gesture::TripleShake;
use crate::platform::{NotificationCenter, NotificationId, PROMPT_ID};
use crate::runtime::RuntimeHandle;

/// The yes/no prompt shown after a gesture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
    pub id: NotificationId,
    pub gesture_seq: u64,
    pub title: String,
    pub text: String,
    /// The host dismisses the prompt after this long.
    pub timeout_ms: u64,
    pub send_label: String,
    pub cancel_label: String,
    pub send_intent: String,
    pub cancel_intent: String,
}

impl ConfirmationPrompt {
    pub fn new(gesture_seq: u64, timeout: Duration, app_id: &str) -> Self {
        Self {
            id: PROMPT_ID,
            gesture_seq,
            title: "🚨 Emergency Detected!".to_string(),
            text: "Triple shake detected. Send emergency alert?".to_string(),
            timeout_ms: timeout.as_millis() as u64,
            send_label: "YES - SEND ALERT".to_string(),
            cancel_label: "NO - CANCEL".to_string(),
            send_intent: Action::Send.intent(app_id),
            cancel_intent: Action::Cancel.intent(app_id),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Posts and dismisses the confirmation prompt.
pub struct ConfirmationNotifier {
    center: Arc<dyn NotificationCenter>,
    timeout: Duration,
    app_id: String,
}

impl ConfirmationNotifier {
    pub fn new(center: Arc<dyn NotificationCenter>, timeout: Duration, app_id: impl Into<String>) -> Self {
        Self {
            center,
            timeout,
            app_id: app_id.into(),
        }
    }

    /// Post the prompt for `gesture`, replacing any prompt still showing.
    pub fn post(
        &self,
        gesture: &TripleShake,
        gesture_seq: u64,
        actions: &RuntimeHandle,
    ) -> Result<ConfirmationPrompt, PlatformError> {
        let prompt = ConfirmationPrompt::new(gesture_seq, self.timeout, &self.app_id);
        self.center.post_prompt(&prompt, actions)?;
        info!(
            gesture_seq,
            span_ms = gesture.at_ms.saturating_sub(gesture.first_shake_ms),
            timeout_ms = prompt.timeout_ms,
            "confirmation prompt posted"
        );
        Ok(prompt)
    }

    pub fn dismiss(&self) {
        debug!("confirmation prompt dismissed");
        self.center.cancel(PROMPT_ID);
    }
}
