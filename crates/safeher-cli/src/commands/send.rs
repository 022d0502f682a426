use clap::Args;
use safeher_core::{Config, ContactStore, ControlSurface, Runtime};
use serde_json::json;

use crate::host::{ReplaySource, TerminalHost};

#[derive(Args)]
pub struct SendArgs {
    /// Message body
    message: String,
    /// Recipient; repeatable. Defaults to the saved contacts.
    #[arg(long = "to")]
    to: Vec<String>,
}

pub fn run(args: SendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let recipients = if args.to.is_empty() {
        ContactStore::open()?.list()?
    } else {
        args.to
    };

    let terminal = TerminalHost::build(&config, ReplaySource::Samples(Vec::new()), false)?;
    let (_runtime, handle) = Runtime::new(terminal.host.clone(), config.clone());
    let control = ControlSurface::new(terminal.host, handle, &config);

    let submitted = control.send_sms(&recipients, &args.message)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "submitted": submitted,
            "attempted": recipients.iter().filter(|r| !r.trim().is_empty()).count(),
        }))?
    );
    Ok(())
}
