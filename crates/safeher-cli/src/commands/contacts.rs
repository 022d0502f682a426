use clap::Subcommand;
use safeher_core::ContactStore;

#[derive(Subcommand)]
pub enum ContactsAction {
    /// List saved contacts as JSON
    List,
    /// Add a phone number
    Add { phone: String },
    /// Remove a phone number
    Remove { phone: String },
    /// Remove every contact
    Clear,
    /// Replace the whole list
    Set {
        #[arg(required = true)]
        phones: Vec<String>,
    },
}

pub fn run(action: ContactsAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = ContactStore::open()?;
    match action {
        ContactsAction::List => {
            println!("{}", serde_json::to_string_pretty(&store.list()?)?);
        }
        ContactsAction::Add { phone } => {
            store.add(&phone)?;
            println!("contact added ({} saved)", store.count()?);
        }
        ContactsAction::Remove { phone } => {
            if !store.remove(&phone)? {
                return Err(format!("no such contact: {}", phone.trim()).into());
            }
            println!("contact removed ({} saved)", store.count()?);
        }
        ContactsAction::Clear => {
            store.clear()?;
            println!("contacts cleared");
        }
        ContactsAction::Set { phones } => {
            store.replace(&phones)?;
            println!("{} contacts saved", store.count()?);
        }
    }
    Ok(())
}
