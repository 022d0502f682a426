use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::storage::config::DispatchConfig;

/// `dd/MM/yyyy, hh:mm:ss a` with English AM/PM.
pub const TIMESTAMP_LAYOUT: &str = "%d/%m/%Y, %I:%M:%S %p";

pub const LOCATION_UNAVAILABLE: &str = "Location unavailable";

/// Position plus the text shown on the `Location:` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Geocoded address, or `lat,lon` when geocoding produced nothing.
    pub label: String,
}

impl ResolvedLocation {
    /// Use the address when present and non-blank, else the coordinates.
    pub fn new(latitude: f64, longitude: f64, address: Option<String>) -> Self {
        let label = match address {
            Some(a) if !a.trim().is_empty() => a.trim().to_string(),
            _ => format!("{},{}", coordinate(latitude), coordinate(longitude)),
        };
        Self {
            latitude,
            longitude,
            label,
        }
    }
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_LAYOUT).to_string()
}

pub fn maps_url(latitude: f64, longitude: f64) -> String {
    format!(
        "https://www.google.com/maps/search/?api=1&query={},{}",
        coordinate(latitude),
        coordinate(longitude)
    )
}

/// Whole values keep one decimal so `0` renders as `0.0`.
fn coordinate(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Build the distress message.
///
/// Deterministic for a given timestamp and location, so two confirmations
/// of the same gesture inside the same second produce identical texts.
pub fn compose(at: &NaiveDateTime, location: Option<&ResolvedLocation>, config: &DispatchConfig) -> String {
    let app = &config.app_name;
    let mut lines = vec![
        format!("🚨 EMERGENCY ALERT from {app}"),
        String::new(),
        "I NEED HELP IMMEDIATELY!".to_string(),
        String::new(),
        format!("Time: {}", format_timestamp(at)),
        format!(
            "Location: {}",
            location.map_or(LOCATION_UNAVAILABLE, |l| l.label.as_str())
        ),
        String::new(),
    ];

    let link = match location {
        Some(l) => Some(maps_url(l.latitude, l.longitude)),
        None if config.zero_location_link => Some(maps_url(0.0, 0.0)),
        None => None,
    };
    if let Some(url) = link {
        lines.push(format!("Google Maps: {url}"));
        lines.push(String::new());
    }

    lines.push("Please check on me or call emergency services!".to_string());
    lines.push(String::new());
    lines.push(format!("- Sent automatically by {app}"));
    lines.join("\n")
}
