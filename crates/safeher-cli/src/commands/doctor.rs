use safeher_core::{Capability, Config, ContactStore, ControlSurface, Runtime};
use serde_json::json;

use crate::host::{ReplaySource, TerminalHost};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let terminal = TerminalHost::build(&config, ReplaySource::Samples(Vec::new()), false)?;
    let exact_alarms = terminal.host.alarms.can_schedule_exact();
    let notifications = terminal.host.permissions.is_granted(Capability::Notifications);
    let location = terminal.host.permissions.is_granted(Capability::Location);

    let (_runtime, handle) = Runtime::new(terminal.host.clone(), config.clone());
    let control = ControlSurface::new(terminal.host, handle, &config);
    let contacts = ContactStore::open()?.count()?;

    let report = json!({
        "config_path": Config::path()?.display().to_string(),
        "contacts": contacts,
        "sms_permission": control.check_sms_permission(),
        "notification_permission": notifications,
        "location_permission": location,
        "exact_alarms": exact_alarms,
        "battery_optimization": control.check_battery_optimization(),
        "status": control.status(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if contacts == 0 {
        eprintln!("warning: no emergency contacts saved");
    }
    Ok(())
}
