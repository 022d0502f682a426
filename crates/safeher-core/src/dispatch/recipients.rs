use crate::storage::contacts::split_contacts;

/// Trim a recipient and prepend `country_prefix` unless it already starts with `+`.
///
/// Returns `None` for blank input.
pub fn normalize_recipient(raw: &str, country_prefix: &str) -> Option<String> {
    let number = raw.trim();
    if number.is_empty() {
        return None;
    }
    if number.starts_with('+') {
        Some(number.to_string())
    } else {
        Some(format!("{country_prefix}{number}"))
    }
}

/// Parse a comma-joined contact list into dialable recipients, in order.
pub fn parse_recipients(raw: &str, country_prefix: &str) -> Vec<String> {
    split_contacts(raw)
        .iter()
        .filter_map(|c| normalize_recipient(c, country_prefix))
        .collect()
}
