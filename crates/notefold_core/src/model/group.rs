//! Named access group model and email normalization.
//!
//! # Invariants
//! - Group names are unique per owner.
//! - Member emails are stored trimmed and lowercase, without duplicates.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+$").expect("valid email regex"));

/// Owner-scoped reusable list of member emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedGroup {
    pub owner: String,
    pub name: String,
    pub members: BTreeSet<String>,
}

/// Normalizes one email; returns `None` when it is not email-shaped.
pub fn normalize_email(value: &str) -> Option<String> {
    let normalized = value.trim().to_ascii_lowercase();
    EMAIL_RE.is_match(&normalized).then_some(normalized)
}

/// Normalizes a batch of emails, reporting the first malformed value.
pub fn normalize_emails<'a>(
    values: impl IntoIterator<Item = &'a String>,
) -> Result<BTreeSet<String>, String> {
    values
        .into_iter()
        .map(|value| normalize_email(value).ok_or_else(|| value.clone()))
        .collect()
}

/// Normalizes a group name; blank names are rejected.
pub fn normalize_group_name(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{normalize_email, normalize_emails, normalize_group_name};

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(
            normalize_email("  Bob@Example.COM ").as_deref(),
            Some("bob@example.com")
        );
        assert_eq!(normalize_email("not-an-email"), None);
        assert_eq!(normalize_email("a b@example.com"), None);
    }

    #[test]
    fn normalize_emails_dedupes_and_reports_bad_value() {
        let values = vec!["a@x.io".to_string(), "A@X.io".to_string()];
        assert_eq!(normalize_emails(&values).unwrap().len(), 1);

        let bad = vec!["a@x.io".to_string(), "nope".to_string()];
        assert_eq!(normalize_emails(&bad).unwrap_err(), "nope");
    }

    #[test]
    fn group_name_must_not_be_blank() {
        assert_eq!(normalize_group_name("  team "), Some("team".to_string()));
        assert_eq!(normalize_group_name("   "), None);
    }
}
