//! Emergency contact list.
//!
//! Stored as one comma-joined string under `SafeHerPrefs/emergency_contacts`
//! so the layout matches what the UI side writes.

use std::sync::{Mutex, MutexGuard};

use tracing::info;

use super::Database;
use crate::error::{CoreError, ValidationError};
use crate::platform::ContactSource;

pub const PREFS_NAMESPACE: &str = "SafeHerPrefs";
pub const CONTACTS_KEY: &str = "emergency_contacts";

/// SQLite-backed contact list.
pub struct ContactStore {
    db: Mutex<Database>,
}

impl ContactStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the store in the default database.
    pub fn open() -> Result<Self, CoreError> {
        Ok(Self::new(Database::open()?))
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The stored string, empty when nothing is saved.
    pub fn raw(&self) -> Result<String, CoreError> {
        Ok(self
            .db()
            .pref_get(PREFS_NAMESPACE, CONTACTS_KEY)?
            .unwrap_or_default())
    }

    /// Saved contacts in insertion order.
    pub fn list(&self) -> Result<Vec<String>, CoreError> {
        Ok(split_contacts(&self.raw()?))
    }

    pub fn count(&self) -> Result<usize, CoreError> {
        Ok(self.list()?.len())
    }

    /// Append a contact.
    ///
    /// # Errors
    /// Rejects empty or malformed numbers and numbers already saved.
    pub fn add(&self, phone: &str) -> Result<(), CoreError> {
        let phone = validate_phone(phone)?;
        let mut contacts = self.list()?;
        if contacts.iter().any(|c| c == &phone) {
            return Err(ValidationError::Duplicate {
                field: "phone".into(),
                value: phone,
            }
            .into());
        }
        contacts.push(phone);
        self.write(&contacts)?;
        info!(count = contacts.len(), "emergency contact added");
        Ok(())
    }

    /// Returns `true` when the contact was present.
    pub fn remove(&self, phone: &str) -> Result<bool, CoreError> {
        let phone = phone.trim();
        let mut contacts = self.list()?;
        let before = contacts.len();
        contacts.retain(|c| c != phone);
        if contacts.len() == before {
            return Ok(false);
        }
        self.write(&contacts)?;
        info!(count = contacts.len(), "emergency contact removed");
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), CoreError> {
        self.db().pref_remove(PREFS_NAMESPACE, CONTACTS_KEY)?;
        info!("emergency contacts cleared");
        Ok(())
    }

    /// Replace the whole list. Every entry is validated; duplicates are collapsed.
    pub fn replace<S: AsRef<str>>(&self, phones: &[S]) -> Result<(), CoreError> {
        let mut contacts: Vec<String> = Vec::with_capacity(phones.len());
        for phone in phones {
            let phone = validate_phone(phone.as_ref())?;
            if !contacts.contains(&phone) {
                contacts.push(phone);
            }
        }
        self.write(&contacts)
    }

    fn write(&self, contacts: &[String]) -> Result<(), CoreError> {
        let db = self.db();
        if contacts.is_empty() {
            db.pref_remove(PREFS_NAMESPACE, CONTACTS_KEY)?;
        } else {
            db.pref_set(PREFS_NAMESPACE, CONTACTS_KEY, &contacts.join(","))?;
        }
        Ok(())
    }
}

impl ContactSource for ContactStore {
    fn load_raw(&self) -> Result<String, CoreError> {
        self.raw()
    }
}

/// Split a comma-joined list, trimming and dropping empty entries.
pub fn split_contacts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(ValidationError::Empty("phone".into()));
    }

    let body = phone.strip_prefix('+').unwrap_or(phone);
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')');
    if !body.chars().all(allowed) || !body.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidValue {
            field: "phone".into(),
            message: format!("'{phone}' is not a dialable number"),
        });
    }
    Ok(phone.to_string())
}
