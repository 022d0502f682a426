use clap::Args;
use safeher_core::Database;

#[derive(Args)]
pub struct HistoryArgs {
    /// Most recent jobs to show
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

pub fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    println!("{}", serde_json::to_string_pretty(&db.list_dispatches(args.limit)?)?);
    Ok(())
}
