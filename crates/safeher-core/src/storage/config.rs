//! TOML-based application configuration.
//!
//! Sections:
//! - `detection`: gesture recognizer thresholds
//! - `prompt`: confirmation prompt timing and intent namespace
//! - `watchdog`: self-healing wakeup interval
//! - `dispatch`: message composition and recipient normalization
//! - `ui`: redelivery of the confirmed-emergency UI event
//! - `simulation`: capabilities granted by the terminal host
//!
//! Configuration is stored at `~/.config/safeher/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

/// Gesture recognizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Gravity-subtracted magnitude (m/s²) a sample must exceed to count as a shake.
    #[serde(default = "default_shake_threshold")]
    pub shake_threshold: f64,
    /// Minimum spacing between two counted shakes.
    #[serde(default = "default_slop_ms")]
    pub slop_ms: u64,
    /// Maximum span from the first to the last shake of one gesture.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_threshold_count")]
    pub threshold_count: u32,
}

/// Confirmation prompt configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_prompt_timeout_ms")]
    pub timeout_ms: u64,
    /// Repeated `Send` actions inside this window are dropped.
    #[serde(default = "default_dedupe_window_ms")]
    pub dedupe_window_ms: u64,
    /// Namespace of the action intent strings.
    #[serde(default = "default_app_id")]
    pub app_id: String,
}

/// Watchdog configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_interval_secs")]
    pub interval_secs: u64,
}

/// Dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Prepended to recipients that do not start with `+`.
    #[serde(default = "default_country_prefix")]
    pub country_prefix: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Emit a `0.0,0.0` maps link when no location is known.
    #[serde(default)]
    pub zero_location_link: bool,
}

/// UI event redelivery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_redelivery_interval_ms")]
    pub redelivery_interval_ms: u64,
    /// Deliveries of the confirmed event before giving up without an acknowledgement.
    #[serde(default = "default_redelivery_max_attempts")]
    pub redelivery_max_attempts: u32,
}

/// Capabilities granted by the terminal host (`safeher run`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_true")]
    pub grant_sms: bool,
    #[serde(default = "default_true")]
    pub grant_notifications: bool,
    #[serde(default = "default_true")]
    pub grant_location: bool,
    #[serde(default = "default_true")]
    pub exact_alarms: bool,
    #[serde(default)]
    pub ignoring_battery_optimizations: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    /// `send`, `cancel` or `ignore`.
    #[serde(default = "default_answer")]
    pub answer: String,
    #[serde(default = "default_answer_delay_ms")]
    pub answer_delay_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/safeher/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

// Default functions
fn default_shake_threshold() -> f64 {
    15.0
}
fn default_slop_ms() -> u64 {
    500
}
fn default_window_ms() -> u64 {
    3000
}
fn default_threshold_count() -> u32 {
    3
}
fn default_prompt_timeout_ms() -> u64 {
    10_000
}
fn default_dedupe_window_ms() -> u64 {
    1000
}
fn default_app_id() -> String {
    "com.safeher.app".into()
}
fn default_watchdog_interval_secs() -> u64 {
    300
}
fn default_country_prefix() -> String {
    "+91".into()
}
fn default_app_name() -> String {
    "SafeHer".into()
}
fn default_redelivery_interval_ms() -> u64 {
    2000
}
fn default_redelivery_max_attempts() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_answer() -> String {
    "send".into()
}
fn default_answer_delay_ms() -> u64 {
    500
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            shake_threshold: default_shake_threshold(),
            slop_ms: default_slop_ms(),
            window_ms: default_window_ms(),
            threshold_count: default_threshold_count(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_prompt_timeout_ms(),
            dedupe_window_ms: default_dedupe_window_ms(),
            app_id: default_app_id(),
        }
    }
}

impl PromptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watchdog_interval_secs(),
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            country_prefix: default_country_prefix(),
            app_name: default_app_name(),
            zero_location_link: false,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            redelivery_interval_ms: default_redelivery_interval_ms(),
            redelivery_max_attempts: default_redelivery_max_attempts(),
        }
    }
}

impl UiConfig {
    pub fn redelivery_interval(&self) -> Duration {
        Duration::from_millis(self.redelivery_interval_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grant_sms: true,
            grant_notifications: true,
            grant_location: true,
            exact_alarms: true,
            ignoring_battery_optimizations: false,
            latitude: None,
            longitude: None,
            address: None,
            answer: default_answer(),
            answer_delay_ms: default_answer_delay_ms(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => parse_number(value)
                        .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Unset optional: infer the type from the text.
                    serde_json::Value::Null => {
                        if value.is_empty() || value == "none" {
                            serde_json::Value::Null
                        } else if let Some(n) = parse_number(value) {
                            n
                        } else {
                            serde_json::Value::String(value.into())
                        }
                    }
                    serde_json::Value::String(_) => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Location of `config.toml` in the data directory.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    /// Hand-edited files go through the same checks as `apply`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Self = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory by dot-separated key, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is rejected.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        let d = &self.detection;
        if !d.shake_threshold.is_finite() || d.shake_threshold < 0.0 {
            return Err(invalid("detection.shake_threshold", "must be a non-negative number"));
        }
        if d.threshold_count == 0 {
            return Err(invalid("detection.threshold_count", "must be at least 1"));
        }
        if d.window_ms < d.slop_ms {
            return Err(invalid("detection.window_ms", "must not be shorter than detection.slop_ms"));
        }
        if self.prompt.app_id.trim().is_empty() {
            return Err(invalid("prompt.app_id", "must not be empty"));
        }
        if self.watchdog.interval_secs == 0 {
            return Err(invalid("watchdog.interval_secs", "must be at least 1"));
        }
        if !matches!(self.simulation.answer.as_str(), "send" | "cancel" | "ignore") {
            return Err(invalid("simulation.answer", "expected send, cancel or ignore"));
        }
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

fn parse_number(value: &str) -> Option<serde_json::Value> {
    if let Ok(n) = value.parse::<u64>() {
        Some(serde_json::Value::Number(n.into()))
    } else {
        value
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let parsed: Config = toml::from_str("[detection]\nslop_ms = 100\n").unwrap();
        assert_eq!(parsed.detection.slop_ms, 100);
        assert_eq!(parsed.detection.window_ms, 3000);
        assert_eq!(parsed.prompt.timeout_ms, 10_000);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("detection.slop_ms").as_deref(), Some("500"));
        assert_eq!(cfg.get("dispatch.country_prefix").as_deref(), Some("+91"));
        assert_eq!(cfg.get("dispatch.zero_location_link").as_deref(), Some("false"));
        assert!(cfg.get("detection.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.apply("detection.shake_threshold", "26.5").unwrap();
        assert_eq!(cfg.detection.shake_threshold, 26.5);
        cfg.apply("detection.threshold_count", "4").unwrap();
        assert_eq!(cfg.detection.threshold_count, 4);
    }

    #[test]
    fn apply_accepts_integer_for_float_field() {
        let mut cfg = Config::default();
        cfg.apply("detection.shake_threshold", "20").unwrap();
        assert_eq!(cfg.detection.shake_threshold, 20.0);
    }

    #[test]
    fn apply_fills_unset_optional() {
        let mut cfg = Config::default();
        cfg.apply("simulation.latitude", "12.9716").unwrap();
        cfg.apply("simulation.address", "MG Road, Bengaluru").unwrap();
        assert_eq!(cfg.simulation.latitude, Some(12.9716));
        assert_eq!(cfg.simulation.address.as_deref(), Some("MG Road, Bengaluru"));
    }

    #[test]
    fn set_json_value_by_path_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "detection.nonexistent", "1");
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_json_value_by_path_rejects_invalid_type() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "dispatch.zero_location_link", "yes");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn apply_rejects_window_shorter_than_slop() {
        let mut cfg = Config::default();
        let err = cfg.apply("detection.window_ms", "100").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(cfg.detection.window_ms, 3000);
    }

    #[test]
    fn apply_rejects_unknown_answer() {
        let mut cfg = Config::default();
        assert!(cfg.apply("simulation.answer", "maybe").is_err());
        cfg.apply("simulation.answer", "ignore").unwrap();
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.apply("prompt.timeout_ms", "2500").unwrap();
        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.prompt.timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "detection = 5").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }

    #[test]
    fn load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nthreshold_count = 0\n").unwrap();
        match Config::load_from(&path) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "detection.threshold_count"),
            other => panic!("expected invalid value, got {other:?}"),
        }
    }
}
