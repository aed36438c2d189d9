//! Entry lifecycle: private -> published -> soft-deleted / permanently deleted
//!
//! Every mutation runs in a single redb write transaction that re-reads the
//! private entry, its public projection and the owner's quota record, so the
//! state change and the counter update commit together or not at all.

use redb::{ReadableDatabase, ReadableTable, Table};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::anonymize::TextTransform;
use crate::constants::{MAX_FEED_LIMIT, MAX_LABEL_CHARS};
use crate::db::{self, Db, child_key, get_record, put_record, tables};
use crate::error::{AppError, Result};
use crate::models::entry::hours_since;
use crate::models::{
    DeletionStatus, Entry, EntryState, MoodRecord, PublishedEntry, QuotaKind, QuotaLimits,
    TagRecord, UserProfile,
};

const MAX_TAGS_PER_ENTRY: usize = 10;

/// Validated input for a new entry; `content` is already sanitized
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub content: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
}

impl NewEntry {
    /// Check the mood and tag labels, returning them trimmed
    pub fn validate(self) -> Result<NewEntry> {
        let mood = self
            .mood
            .as_deref()
            .map(|m| validate_label(m, "Mood"))
            .transpose()?;
        if self.tags.len() > MAX_TAGS_PER_ENTRY {
            return Err(AppError::InvalidInput(format!(
                "At most {} tags per entry",
                MAX_TAGS_PER_ENTRY
            )));
        }
        let tags = self
            .tags
            .iter()
            .map(|t| validate_label(t, "Tag"))
            .collect::<Result<Vec<_>>>()?;

        Ok(NewEntry {
            content: self.content,
            mood,
            tags,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeletionKind {
    /// Private record and projection are gone
    Removed,
    /// Private record kept with `deleted_at`, projection removed
    SoftDeleted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub entry_id: String,
    pub kind: DeletionKind,
    pub quota: QuotaKind,
    pub used: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub last_used_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub public_post_deletions: QuotaUsage,
    pub permanent_deletions: QuotaUsage,
    pub entries_published: u32,
    pub last_published_at: Option<i64>,
    pub deletion_status: DeletionStatus,
    pub delete_after: Option<i64>,
}

impl QuotaStatus {
    fn from_profile(profile: &UserProfile, limits: &QuotaLimits) -> Self {
        let usage = |kind: QuotaKind| QuotaUsage {
            used: profile.used(kind),
            limit: limits.limit(kind),
            remaining: limits.limit(kind).saturating_sub(profile.used(kind)),
            last_used_at: profile.last_used_at(kind),
        };

        Self {
            public_post_deletions: usage(QuotaKind::PublicPostDeletion),
            permanent_deletions: usage(QuotaKind::PermanentDeletion),
            entries_published: profile.entries_published,
            last_published_at: profile.last_published_at,
            deletion_status: profile.deletion_status,
            delete_after: profile.delete_after,
        }
    }
}

type RecordTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

/// Load the profile of an account that has not been purged
fn load_active_profile<Tbl>(profiles: &Tbl, user_id: &str) -> Result<UserProfile>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let profile: UserProfile =
        get_record(profiles, user_id)?.ok_or(AppError::NotFound("Profile"))?;
    if profile.deletion_status == DeletionStatus::Completed {
        return Err(AppError::NotFound("Account"));
    }
    Ok(profile)
}

/// Load a live entry and confirm the requester owns it
fn load_owned_entry(entries: &RecordTable<'_>, user_id: &str, entry_id: &str) -> Result<Entry> {
    let entry: Entry =
        get_record(entries, &child_key(user_id, entry_id))?.ok_or(AppError::NotFound("Entry"))?;

    if entry.owner_id != user_id {
        tracing::warn!(
            "Entry {} ownership mismatch: requested by {}, owned by {}",
            entry_id,
            user_id,
            entry.owner_id
        );
        return Err(AppError::AuthorizationDenied);
    }
    if !entry.is_live() {
        return Err(AppError::NotFound("Entry"));
    }
    Ok(entry)
}

/// Load the public projection, if any, and confirm it matches the owner too
fn load_owned_projection(
    published: &RecordTable<'_>,
    user_id: &str,
    entry_id: &str,
) -> Result<Option<PublishedEntry>> {
    let projection: Option<PublishedEntry> = get_record(published, entry_id)?;
    if let Some(projection) = &projection
        && projection.owner_id != user_id
    {
        tracing::warn!(
            "Published entry {} ownership mismatch: requested by {}, owned by {}",
            entry_id,
            user_id,
            projection.owner_id
        );
        return Err(AppError::AuthorizationDenied);
    }
    Ok(projection)
}

fn validate_label(label: &str, what: &str) -> Result<String> {
    let label = label.trim();
    if label.is_empty() || label.chars().count() > MAX_LABEL_CHARS {
        return Err(AppError::InvalidInput(format!(
            "{} must be 1-{} characters",
            what, MAX_LABEL_CHARS
        )));
    }
    Ok(label.to_string())
}

/// Store a new private entry
pub async fn create_entry(db: &Db, user_id: &str, new_entry: NewEntry, now: i64) -> Result<Entry> {
    let NewEntry { content, mood, tags } = new_entry.validate()?;

    let entry = Entry {
        id: Uuid::new_v4().to_string(),
        owner_id: user_id.to_string(),
        content,
        mood,
        tags,
        created_at: now,
        published_at: None,
        deleted_at: None,
    };

    let db = db.clone();
    tokio::task::spawn_blocking(move || -> Result<Entry> {
        let write_txn = db.begin_write()?;
        {
            let profiles = write_txn.open_table(tables::PROFILES)?;
            load_active_profile(&profiles, &entry.owner_id)?;
            drop(profiles);

            let mut entries = write_txn.open_table(tables::ENTRIES)?;
            put_record(&mut entries, &child_key(&entry.owner_id, &entry.id), &entry)?;
        }
        write_txn.commit()?;

        tracing::info!("Entry {} created for user {}", entry.id, entry.owner_id);
        Ok(entry)
    })
    .await?
}

/// Publish a private entry as an anonymized public projection
pub async fn publish_entry(
    db: &Db,
    transform: Arc<dyn TextTransform>,
    user_id: &str,
    entry_id: &str,
    now: i64,
) -> Result<PublishedEntry> {
    let db = db.clone();
    let user_id = user_id.to_string();
    let entry_id = entry_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<PublishedEntry> {
        let write_txn = db.begin_write()?;
        let projection = {
            let mut profiles = write_txn.open_table(tables::PROFILES)?;
            let mut profile = load_active_profile(&profiles, &user_id)?;

            let mut entries = write_txn.open_table(tables::ENTRIES)?;
            let mut entry = load_owned_entry(&entries, &user_id, &entry_id)?;

            let mut published = write_txn.open_table(tables::PUBLISHED)?;
            if entry.published_at.is_some()
                || load_owned_projection(&published, &user_id, &entry_id)?.is_some()
            {
                return Err(AppError::Conflict("Entry is already published".to_string()));
            }

            let projection =
                PublishedEntry::from_entry(&entry, transform.anonymize(&entry.content), now);
            entry.published_at = Some(now);
            profile.record_publish(now);

            put_record(&mut entries, &child_key(&user_id, &entry_id), &entry)?;
            put_record(&mut published, &entry_id, &projection)?;
            put_record(&mut profiles, &user_id, &profile)?;
            projection
        };
        write_txn.commit()?;

        tracing::info!("Entry {} published by user {}", entry_id, user_id);
        Ok(projection)
    })
    .await?
}

/// Delete an entry, charging the quota its current state requires
///
/// `permanent` is the override for posts whose 24 hour window has closed;
/// it has no effect on entries that can be deleted without it.
pub async fn delete_entry(
    db: &Db,
    limits: QuotaLimits,
    user_id: &str,
    entry_id: &str,
    permanent: bool,
    now: i64,
) -> Result<DeleteOutcome> {
    let db = db.clone();
    let user_id = user_id.to_string();
    let entry_id = entry_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<DeleteOutcome> {
        let write_txn = db.begin_write()?;
        let outcome = {
            let mut profiles = write_txn.open_table(tables::PROFILES)?;
            let mut profile = load_active_profile(&profiles, &user_id)?;

            let mut entries = write_txn.open_table(tables::ENTRIES)?;
            let mut entry = load_owned_entry(&entries, &user_id, &entry_id)?;

            let mut published = write_txn.open_table(tables::PUBLISHED)?;
            let projection = load_owned_projection(&published, &user_id, &entry_id)?;
            if entry.published_at.is_some() && projection.is_none() {
                tracing::warn!("Published entry {} has no public projection", entry_id);
            }

            let key = child_key(&user_id, &entry_id);
            let (quota, kind) = match entry.state(now) {
                EntryState::Private => {
                    profile.consume(QuotaKind::PermanentDeletion, &limits, now)?;
                    entries.remove(key.as_str())?;
                    (QuotaKind::PermanentDeletion, DeletionKind::Removed)
                }
                EntryState::Published => {
                    profile.consume(QuotaKind::PublicPostDeletion, &limits, now)?;
                    entries.remove(key.as_str())?;
                    published.remove(entry_id.as_str())?;
                    (QuotaKind::PublicPostDeletion, DeletionKind::Removed)
                }
                EntryState::PublishedLocked if !permanent => {
                    let hours_elapsed = hours_since(entry.published_at.unwrap_or(now), now);
                    tracing::info!(
                        "Delete of entry {} refused: published {} hours ago",
                        entry_id,
                        hours_elapsed
                    );
                    return Err(AppError::TemporalWindowClosed { hours_elapsed });
                }
                EntryState::PublishedLocked => {
                    profile.consume(QuotaKind::PermanentDeletion, &limits, now)?;
                    entry.deleted_at = Some(now);
                    put_record(&mut entries, &key, &entry)?;
                    published.remove(entry_id.as_str())?;
                    (QuotaKind::PermanentDeletion, DeletionKind::SoftDeleted)
                }
                EntryState::SoftDeleted => return Err(AppError::NotFound("Entry")),
            };

            put_record(&mut profiles, &user_id, &profile)?;

            DeleteOutcome {
                entry_id: entry_id.clone(),
                kind,
                quota,
                used: profile.used(quota),
                limit: limits.limit(quota),
            }
        };
        write_txn.commit()?;

        tracing::info!(
            "Entry {} deleted by user {} ({:?}, {} {}/{})",
            entry_id,
            user_id,
            outcome.kind,
            outcome.quota.label(),
            outcome.used,
            outcome.limit
        );
        Ok(outcome)
    })
    .await?
}

/// Live entries of one user, newest first
pub async fn list_entries(db: &Db, user_id: &str) -> Result<Vec<Entry>> {
    let db = db.clone();
    let user_id = user_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<Vec<Entry>> {
        let read_txn = db.begin_read()?;
        let entries = read_txn.open_table(tables::ENTRIES)?;
        let mut live: Vec<Entry> = db::list_children::<Entry, _>(&entries, &user_id)?
            .into_iter()
            .map(|(_, entry)| entry)
            .filter(Entry::is_live)
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(live)
    })
    .await?
}

/// Most recent public projections
pub async fn public_feed(db: &Db, limit: usize) -> Result<Vec<PublishedEntry>> {
    let db = db.clone();
    let limit = limit.clamp(1, MAX_FEED_LIMIT);

    tokio::task::spawn_blocking(move || -> Result<Vec<PublishedEntry>> {
        let read_txn = db.begin_read()?;
        let published = read_txn.open_table(tables::PUBLISHED)?;

        let mut feed = Vec::new();
        for item in published.iter()? {
            let (_, value) = item?;
            feed.push(db::decode::<PublishedEntry>(value.value())?);
        }
        feed.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        feed.truncate(limit);
        Ok(feed)
    })
    .await?
}

pub async fn quota_status(db: &Db, limits: QuotaLimits, user_id: &str) -> Result<QuotaStatus> {
    let db = db.clone();
    let user_id = user_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<QuotaStatus> {
        let read_txn = db.begin_read()?;
        let profiles = read_txn.open_table(tables::PROFILES)?;
        let profile: UserProfile =
            get_record(&profiles, &user_id)?.ok_or(AppError::NotFound("Profile"))?;
        Ok(QuotaStatus::from_profile(&profile, &limits))
    })
    .await?
}

/// Append to the user's mood log
pub async fn record_mood(db: &Db, user_id: &str, mood: &str, now: i64) -> Result<MoodRecord> {
    let record = MoodRecord {
        id: Uuid::new_v4().to_string(),
        mood: validate_label(mood, "Mood")?,
        logged_at: now,
    };

    let db = db.clone();
    let user_id = user_id.to_string();
    tokio::task::spawn_blocking(move || -> Result<MoodRecord> {
        let write_txn = db.begin_write()?;
        {
            let profiles = write_txn.open_table(tables::PROFILES)?;
            load_active_profile(&profiles, &user_id)?;
            drop(profiles);

            let mut moods = write_txn.open_table(tables::MOODS)?;
            put_record(&mut moods, &child_key(&user_id, &record.id), &record)?;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await?
}

/// Create a user tag; names are unique per user, case-insensitively
pub async fn create_tag(db: &Db, user_id: &str, name: &str, now: i64) -> Result<TagRecord> {
    let record = TagRecord {
        id: Uuid::new_v4().to_string(),
        name: validate_label(name, "Tag")?,
        created_at: now,
    };

    let db = db.clone();
    let user_id = user_id.to_string();
    tokio::task::spawn_blocking(move || -> Result<TagRecord> {
        let write_txn = db.begin_write()?;
        {
            let profiles = write_txn.open_table(tables::PROFILES)?;
            load_active_profile(&profiles, &user_id)?;
            drop(profiles);

            let mut tags = write_txn.open_table(tables::TAGS)?;
            let existing: Vec<(String, TagRecord)> = db::list_children(&tags, &user_id)?;
            if existing
                .iter()
                .any(|(_, tag)| tag.name.eq_ignore_ascii_case(&record.name))
            {
                return Err(AppError::Conflict(format!(
                    "Tag '{}' already exists",
                    record.name
                )));
            }
            put_record(&mut tags, &child_key(&user_id, &record.id), &record)?;
        }
        write_txn.commit()?;
        Ok(record)
    })
    .await?
}
