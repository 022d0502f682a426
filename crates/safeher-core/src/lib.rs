//! # SafeHer Core Library
//!
//! Background shake-triggered emergency alert core. The library watches a
//! stream of accelerometer samples, recognizes a triple-shake gesture, asks the
//! user for confirmation through an actionable notification, and on
//! confirmation sends a location-bearing distress SMS to the saved contacts.
//!
//! ## Architecture
//!
//! - **Gesture Recognizer**: a timestamp-driven state machine over samples;
//!   no clocks, no threads, no I/O
//! - **Motion Monitor**: owns the sensor subscription, the persistent status
//!   entity and the watchdog alarm
//! - **Confirmation**: prompt posting plus a typed action router with
//!   duplicate suppression
//! - **Dispatch**: one thread per job; contacts, location, message, SMS
//! - **Runtime**: a single supervised tokio task wiring everything together
//! - **Platform**: capability traits the host implements, plus an in-memory
//!   host for tests and stubbing
//!
//! ## Key Components
//!
//! - [`ShakeRecognizer`]: gesture state machine
//! - [`Runtime`] / [`RuntimeHandle`]: supervisor and its command handle
//! - [`ControlSurface`]: start/stop/status operations for a UI
//! - [`Config`]: TOML configuration
//! - [`ContactStore`]: SQLite-backed contact list

pub mod confirm;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gesture;
pub mod monitor;
pub mod platform;
pub mod runtime;
pub mod state;
pub mod storage;
pub mod watchdog;

pub use confirm::{Action, ActionRouter, ConfirmationNotifier, ConfirmationPrompt, RouteDecision};
pub use control::{BatteryOptimizationStatus, ControlSurface};
pub use dispatch::{DispatchOutcome, DispatchReport, DispatchWorker};
pub use error::{ConfigError, CoreError, DatabaseError, PlatformError, SmsError, ValidationError};
pub use events::Event;
pub use gesture::{Sample, ShakeRecognizer, ShakeWindow, TripleShake};
pub use monitor::{MotionMonitor, StartSource};
pub use platform::{Capability, Host};
pub use runtime::{Runtime, RuntimeHandle};
pub use state::{ServiceState, ServiceStatus};
pub use storage::{Config, ContactStore, Database};
pub use watchdog::{Watchdog, WatchdogOutcome};
