//! Control surface for a UI.
//!
//! The only place in the core that hands structured errors back to a caller.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatch::{normalize_recipient, send_to_all};
use crate::error::{CoreError, Result};
use crate::monitor::StartSource;
use crate::platform::{Capability, Host};
use crate::runtime::RuntimeHandle;
use crate::state::ServiceStatus;
use crate::storage::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryOptimizationStatus {
    pub ignoring: bool,
}

pub struct ControlSurface {
    host: Host,
    runtime: RuntimeHandle,
    country_prefix: String,
}

impl ControlSurface {
    pub fn new(host: Host, runtime: RuntimeHandle, config: &Config) -> Self {
        Self {
            host,
            runtime,
            country_prefix: config.dispatch.country_prefix.clone(),
        }
    }

    /// Start shake detection.
    ///
    /// # Errors
    /// `PermissionDenied(Notifications)` without notification permission;
    /// `SensorUnavailable` or `DisplayDenied` when the host refuses a
    /// resource; `StartError` otherwise.
    pub async fn start_service(&self) -> Result<()> {
        if !self.host.permissions.is_granted(Capability::Notifications) {
            warn!("cannot start monitor without notification permission");
            return Err(CoreError::PermissionDenied(Capability::Notifications));
        }
        match self.runtime.start(StartSource::Control).await {
            Ok(_) => Ok(()),
            Err(e @ (CoreError::SensorUnavailable(_) | CoreError::DisplayDenied | CoreError::StartError(_))) => Err(e),
            Err(e) => Err(CoreError::StartError(e.to_string())),
        }
    }

    /// Best-effort stop; never fails.
    pub async fn stop_service(&self) -> Result<()> {
        self.runtime.stop().await;
        Ok(())
    }

    pub fn status(&self) -> ServiceStatus {
        self.runtime.status()
    }

    pub fn check_battery_optimization(&self) -> BatteryOptimizationStatus {
        BatteryOptimizationStatus {
            ignoring: self.host.power.is_ignoring_battery_optimizations(),
        }
    }

    /// Ask the host for an exemption. A no-op when already exempt.
    pub fn request_battery_optimization_exemption(&self) -> Result<()> {
        if self.host.power.is_ignoring_battery_optimizations() {
            return Ok(());
        }
        self.host.power.request_battery_optimization_exemption()?;
        Ok(())
    }

    pub fn check_sms_permission(&self) -> bool {
        self.host.permissions.is_granted(Capability::Sms)
    }

    /// Send `message` directly, bypassing gesture and confirmation. Blocks
    /// while segments are submitted.
    ///
    /// Returns how many recipients had every segment accepted by the SMS service.
    ///
    /// # Errors
    /// `PermissionDenied(Sms)`, `NoContacts` when every recipient is blank,
    /// `SendFailed` when no recipient could be reached.
    pub fn send_sms<S: AsRef<str>>(&self, recipients: &[S], message: &str) -> Result<usize> {
        if !self.check_sms_permission() {
            return Err(CoreError::PermissionDenied(Capability::Sms));
        }

        let recipients: Vec<String> = recipients
            .iter()
            .filter_map(|r| normalize_recipient(r.as_ref(), &self.country_prefix))
            .collect();
        if recipients.is_empty() {
            return Err(CoreError::NoContacts);
        }

        let summary = send_to_all(self.host.sms.as_ref(), &recipients, message);
        if summary.submitted == 0 {
            let first = summary.failures.into_iter().next();
            return Err(CoreError::SendFailed {
                recipient: first.as_ref().map(|f| f.recipient.clone()).unwrap_or_default(),
                reason: first.map(|f| f.reason).unwrap_or_default(),
            });
        }

        info!(submitted = summary.submitted, attempted = summary.attempted, "direct SMS sent");
        Ok(summary.submitted)
    }

    pub fn acknowledge_emergency_event(&self) {
        self.runtime.acknowledge();
    }
}
