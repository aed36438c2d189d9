use serde::{Deserialize, Serialize};

use crate::constants::PUBLIC_DELETE_WINDOW_HOURS;

/// Private journal entry owned by a single user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub owner_id: String,
    /// Sanitized plain text
    pub content: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub published_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

/// Lifecycle state derived from an entry's timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Private,
    /// Published less than 24 hours ago
    Published,
    /// Published 24 hours ago or more; only a permanent delete removes it
    PublishedLocked,
    SoftDeleted,
}

impl Entry {
    pub fn state(&self, now: i64) -> EntryState {
        if self.deleted_at.is_some() {
            return EntryState::SoftDeleted;
        }
        match self.published_at {
            None => EntryState::Private,
            Some(published_at) if hours_since(published_at, now) < PUBLIC_DELETE_WINDOW_HOURS => {
                EntryState::Published
            }
            Some(_) => EntryState::PublishedLocked,
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Whole hours elapsed between `since` and `now`
pub fn hours_since(since: i64, now: i64) -> i64 {
    (now - since).max(0) / 3600
}

/// Public projection of an entry, keyed by the same id
///
/// After the owner's account is purged `owner_id` holds the anonymized
/// sentinel and `anonymized` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEntry {
    pub id: String,
    pub owner_id: String,
    /// Anonymized text (emails, phone numbers and handles stripped)
    pub content: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub published_at: i64,
    pub anonymized: bool,
}

impl PublishedEntry {
    pub fn from_entry(entry: &Entry, anonymized_content: String, now: i64) -> Self {
        Self {
            id: entry.id.clone(),
            owner_id: entry.owner_id.clone(),
            content: anonymized_content,
            mood: entry.mood.clone(),
            tags: entry.tags.clone(),
            published_at: now,
            anonymized: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(published_at: Option<i64>, deleted_at: Option<i64>) -> Entry {
        Entry {
            id: "e1".to_string(),
            owner_id: "u1".to_string(),
            content: "hello".to_string(),
            mood: Some("calm".to_string()),
            tags: vec!["walks".to_string()],
            created_at: 0,
            published_at,
            deleted_at,
        }
    }

    #[test]
    fn test_state_transitions_by_time() {
        let published_at = 1_000_000;

        assert_eq!(entry(None, None).state(published_at), EntryState::Private);
        assert_eq!(
            entry(Some(published_at), None).state(published_at + 23 * 3600),
            EntryState::Published
        );
        assert_eq!(
            entry(Some(published_at), None).state(published_at + 24 * 3600),
            EntryState::PublishedLocked
        );
        assert_eq!(
            entry(Some(published_at), Some(published_at + 1)).state(published_at + 2),
            EntryState::SoftDeleted
        );
    }

    #[test]
    fn test_projection_copies_metadata() {
        let source = entry(None, None);
        let projection = PublishedEntry::from_entry(&source, "anon".to_string(), 42);

        assert_eq!(projection.id, source.id);
        assert_eq!(projection.owner_id, source.owner_id);
        assert_eq!(projection.content, "anon");
        assert_eq!(projection.mood.as_deref(), Some("calm"));
        assert_eq!(projection.tags, vec!["walks".to_string()]);
        assert_eq!(projection.published_at, 42);
        assert!(!projection.anonymized);
    }

    #[test]
    fn test_hours_since_never_negative() {
        assert_eq!(hours_since(100, 50), 0);
        assert_eq!(hours_since(0, 25 * 3600 + 59), 25);
    }
}
