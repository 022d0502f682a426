use clap::Subcommand;
use safeher_core::Database;

#[derive(Subcommand)]
pub enum OutboxAction {
    /// List queued segments, oldest first
    List {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Drop every queued segment
    Clear,
}

pub fn run(action: OutboxAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        OutboxAction::List { limit } => {
            println!("{}", serde_json::to_string_pretty(&db.list_outbox(limit)?)?);
        }
        OutboxAction::Clear => {
            let removed = db.clear_outbox()?;
            println!("{removed} segments removed");
        }
    }
    Ok(())
}
