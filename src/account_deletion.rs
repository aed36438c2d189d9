//! Account deletion: 24 hour grace period, then a cascading purge
//!
//! A purge is an ordered list of idempotent [`PurgeStep`]s applied inside one
//! write transaction per user. The profile is marked `completed` by the last
//! step, so it only becomes terminal when every earlier step succeeded.

use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;

use crate::constants::ANONYMIZED_OWNER;
use crate::db::{self, Db, get_record, put_record, tables};
use crate::error::{AppError, Result};
use crate::identity::IdentityRemover;
use crate::models::{Entry, PublishedEntry, UserProfile};

/// One step of the account purge, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeStep {
    DeleteEntries,
    DeleteMoods,
    DeleteTags,
    AnonymizePublished,
    CompleteProfile,
}

impl PurgeStep {
    pub const ALL: [PurgeStep; 5] = [
        PurgeStep::DeleteEntries,
        PurgeStep::DeleteMoods,
        PurgeStep::DeleteTags,
        PurgeStep::AnonymizePublished,
        PurgeStep::CompleteProfile,
    ];

    /// Apply the step, returning how many records it touched
    fn apply(self, txn: &WriteTransaction, user_id: &str, now: i64) -> Result<usize> {
        match self {
            PurgeStep::DeleteEntries => {
                let mut entries = txn.open_table(tables::ENTRIES)?;
                for (key, entry) in db::list_children::<Entry, _>(&entries, user_id)? {
                    if entry.owner_id != user_id {
                        tracing::warn!(
                            "Purge of {} found {} owned by {}",
                            user_id,
                            key,
                            entry.owner_id
                        );
                        return Err(AppError::AuthorizationDenied);
                    }
                }
                db::remove_children(&mut entries, user_id)
            }
            PurgeStep::DeleteMoods => {
                let mut moods = txn.open_table(tables::MOODS)?;
                db::remove_children(&mut moods, user_id)
            }
            PurgeStep::DeleteTags => {
                let mut tags = txn.open_table(tables::TAGS)?;
                db::remove_children(&mut tags, user_id)
            }
            PurgeStep::AnonymizePublished => {
                let mut published = txn.open_table(tables::PUBLISHED)?;
                let mut owned = Vec::new();
                for item in published.iter()? {
                    let (key, value) = item?;
                    let projection: PublishedEntry = db::decode(value.value())?;
                    if projection.owner_id == user_id {
                        owned.push((key.value().to_string(), projection));
                    }
                }
                let count = owned.len();
                for (key, mut projection) in owned {
                    projection.owner_id = ANONYMIZED_OWNER.to_string();
                    projection.anonymized = true;
                    put_record(&mut published, &key, &projection)?;
                }
                Ok(count)
            }
            PurgeStep::CompleteProfile => {
                let mut profiles = txn.open_table(tables::PROFILES)?;
                let mut profile: UserProfile =
                    get_record(&profiles, user_id)?.ok_or(AppError::NotFound("Profile"))?;
                profile.mark_purged(now);
                put_record(&mut profiles, user_id, &profile)?;
                Ok(1)
            }
        }
    }
}

/// Records touched by one account purge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeSummary {
    pub entries_deleted: usize,
    pub moods_deleted: usize,
    pub tags_deleted: usize,
    pub posts_anonymized: usize,
}

impl PurgeSummary {
    fn record(&mut self, step: PurgeStep, touched: usize) {
        match step {
            PurgeStep::DeleteEntries => self.entries_deleted = touched,
            PurgeStep::DeleteMoods => self.moods_deleted = touched,
            PurgeStep::DeleteTags => self.tags_deleted = touched,
            PurgeStep::AnonymizePublished => self.posts_anonymized = touched,
            PurgeStep::CompleteProfile => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub user_id: String,
    pub error: String,
}

/// Outcome of one completion sweep
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Accounts found pending with an elapsed deadline
    pub due: usize,
    pub completed: Vec<String>,
    /// Accounts cancelled between the scan and their transaction
    pub skipped: Vec<String>,
    pub failures: Vec<SweepFailure>,
    /// Purged accounts whose identity could not be removed
    pub identity_failures: Vec<SweepFailure>,
    pub totals: PurgeSummary,
}

enum PurgeOutcome {
    Purged(PurgeSummary),
    NoLongerDue,
}

/// Schedule the purge of `user_id`, returning the deadline
pub async fn request_deletion(db: &Db, user_id: &str, now: i64) -> Result<i64> {
    let db = db.clone();
    let user_id = user_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<i64> {
        let write_txn = db.begin_write()?;
        let deadline = {
            let mut profiles = write_txn.open_table(tables::PROFILES)?;
            let mut profile: UserProfile =
                get_record(&profiles, &user_id)?.ok_or(AppError::NotFound("Profile"))?;
            let deadline = profile.request_deletion(now)?;
            put_record(&mut profiles, &user_id, &profile)?;
            deadline
        };
        write_txn.commit()?;

        tracing::info!("Account deletion for {} scheduled at {}", user_id, deadline);
        Ok(deadline)
    })
    .await?
}

/// Return a pending account to `none`
pub async fn cancel_deletion(db: &Db, user_id: &str, now: i64) -> Result<()> {
    let db = db.clone();
    let user_id = user_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let write_txn = db.begin_write()?;
        {
            let mut profiles = write_txn.open_table(tables::PROFILES)?;
            let mut profile: UserProfile =
                get_record(&profiles, &user_id)?.ok_or(AppError::NotFound("Profile"))?;
            profile.cancel_deletion(now)?;
            put_record(&mut profiles, &user_id, &profile)?;
        }
        write_txn.commit()?;

        tracing::info!("Account deletion for {} cancelled", user_id);
        Ok(())
    })
    .await?
}

/// Purge every account whose grace period has elapsed
///
/// Failures are per user: they are logged, reported and never stop the
/// sweep. Identity removal runs after the purge commits and cannot undo it.
pub async fn run_completion_sweep(
    db: &Db,
    identity: &dyn IdentityRemover,
    now: i64,
) -> Result<SweepReport> {
    let due = due_accounts(db, now).await?;
    let mut report = SweepReport {
        due: due.len(),
        ..SweepReport::default()
    };

    for user_id in due {
        match purge_account(db, &user_id, now).await {
            Ok(PurgeOutcome::Purged(summary)) => {
                tracing::info!("Account {} purged: {:?}", user_id, summary);
                report.totals.entries_deleted += summary.entries_deleted;
                report.totals.moods_deleted += summary.moods_deleted;
                report.totals.tags_deleted += summary.tags_deleted;
                report.totals.posts_anonymized += summary.posts_anonymized;

                if let Err(e) = identity.delete_identity(&user_id).await {
                    tracing::error!("Failed to remove identity of purged account {}: {}", user_id, e);
                    report.identity_failures.push(SweepFailure {
                        user_id: user_id.clone(),
                        error: e.to_string(),
                    });
                }
                report.completed.push(user_id);
            }
            Ok(PurgeOutcome::NoLongerDue) => {
                tracing::info!("Account {} no longer due for deletion, skipping", user_id);
                report.skipped.push(user_id);
            }
            Err(e) => {
                tracing::error!("Failed to purge account {}: {}", user_id, e);
                report.failures.push(SweepFailure {
                    user_id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        "Deletion sweep finished: {} due, {} completed, {} skipped, {} failed",
        report.due,
        report.completed.len(),
        report.skipped.len(),
        report.failures.len()
    );
    Ok(report)
}

async fn due_accounts(db: &Db, now: i64) -> Result<Vec<String>> {
    let db = db.clone();
    tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
        let read_txn = db.begin_read()?;
        let profiles = read_txn.open_table(tables::PROFILES)?;

        let mut due = Vec::new();
        for item in profiles.iter()? {
            let (key, value) = item?;
            match db::decode::<UserProfile>(value.value()) {
                Ok(profile) if profile.is_due(now) => due.push(key.value().to_string()),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable profile {}: {}", key.value(), e),
            }
        }
        Ok(due)
    })
    .await?
}

async fn purge_account(db: &Db, user_id: &str, now: i64) -> Result<PurgeOutcome> {
    let db = db.clone();
    let user_id = user_id.to_string();

    tokio::task::spawn_blocking(move || -> Result<PurgeOutcome> {
        let write_txn = db.begin_write()?;

        // Status may have changed since the scan
        {
            let profiles = write_txn.open_table(tables::PROFILES)?;
            let profile: Option<UserProfile> = get_record(&profiles, &user_id)?;
            if !profile.is_some_and(|p| p.is_due(now)) {
                return Ok(PurgeOutcome::NoLongerDue);
            }
        }

        let mut summary = PurgeSummary::default();
        for step in PurgeStep::ALL {
            let touched = step.apply(&write_txn, &user_id, now)?;
            tracing::debug!("Purge step {:?} for {} touched {}", step, user_id, touched);
            summary.record(step, touched);
        }
        write_txn.commit()?;

        Ok(PurgeOutcome::Purged(summary))
    })
    .await?
}
