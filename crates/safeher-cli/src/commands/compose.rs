use chrono::Local;
use clap::Args;
use safeher_core::dispatch::{compose, divide, ResolvedLocation};
use safeher_core::Config;

#[derive(Args)]
pub struct ComposeArgs {
    /// Print the carrier segments as JSON instead of the message text
    #[arg(long)]
    segments: bool,
}

pub fn run(args: ComposeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let sim = &config.simulation;
    let location = match (sim.latitude, sim.longitude) {
        (Some(lat), Some(lon)) if sim.grant_location => {
            Some(ResolvedLocation::new(lat, lon, sim.address.clone()))
        }
        _ => None,
    };

    let message = compose(&Local::now().naive_local(), location.as_ref(), &config.dispatch);
    if args.segments {
        println!("{}", serde_json::to_string_pretty(&divide(&message))?);
    } else {
        println!("{message}");
    }
    Ok(())
}
