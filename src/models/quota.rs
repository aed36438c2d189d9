use serde::{Deserialize, Serialize};

use crate::constants::ACCOUNT_DELETION_GRACE_SECS;
use crate::error::{AppError, Result};

/// Lifetime deletion quotas that bound a user's delete operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaKind {
    /// Deleting a published post inside its 24 hour window
    PublicPostDeletion,
    /// Deleting a private entry, or a published post after its window closed
    PermanentDeletion,
}

impl QuotaKind {
    pub fn label(&self) -> &'static str {
        match self {
            QuotaKind::PublicPostDeletion => "Public post deletion",
            QuotaKind::PermanentDeletion => "Permanent deletion",
        }
    }
}

/// Lifetime ceilings for each quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub public_post_deletions: u32,
    pub permanent_deletions: u32,
}

impl QuotaLimits {
    pub fn limit(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::PublicPostDeletion => self.public_post_deletions,
            QuotaKind::PermanentDeletion => self.permanent_deletions,
        }
    }
}

/// Account deletion lifecycle: none -> pending -> {none, completed}
///
/// A cancel returns a pending account straight to `None`; the instant is kept
/// in `UserProfile::deletion_cancelled_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStatus {
    None,
    Pending,
    Completed,
}

/// Per-user quota and profile record, created at signup
///
/// Never removed. A completed account purge scrubs `display_name` but keeps
/// the counters for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub created_at: i64,
    pub public_post_deletions: u32,
    pub permanent_deletions: u32,
    pub entries_published: u32,
    pub last_public_deletion_at: Option<i64>,
    pub last_permanent_deletion_at: Option<i64>,
    pub last_published_at: Option<i64>,
    pub deletion_status: DeletionStatus,
    pub deletion_requested_at: Option<i64>,
    pub deletion_cancelled_at: Option<i64>,
    pub delete_after: Option<i64>,
    pub scrubbed_at: Option<i64>,
}

impl UserProfile {
    pub fn new(display_name: Option<String>, now: i64) -> Self {
        Self {
            display_name,
            created_at: now,
            public_post_deletions: 0,
            permanent_deletions: 0,
            entries_published: 0,
            last_public_deletion_at: None,
            last_permanent_deletion_at: None,
            last_published_at: None,
            deletion_status: DeletionStatus::None,
            deletion_requested_at: None,
            deletion_cancelled_at: None,
            delete_after: None,
            scrubbed_at: None,
        }
    }

    pub fn used(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::PublicPostDeletion => self.public_post_deletions,
            QuotaKind::PermanentDeletion => self.permanent_deletions,
        }
    }

    pub fn last_used_at(&self, kind: QuotaKind) -> Option<i64> {
        match kind {
            QuotaKind::PublicPostDeletion => self.last_public_deletion_at,
            QuotaKind::PermanentDeletion => self.last_permanent_deletion_at,
        }
    }

    /// Fail with `QuotaExhausted` if no unit of `kind` is left
    pub fn ensure_available(&self, kind: QuotaKind, limits: &QuotaLimits) -> Result<()> {
        let used = self.used(kind);
        let limit = limits.limit(kind);
        if used >= limit {
            tracing::warn!("{} quota exhausted: {}/{}", kind.label(), used, limit);
            return Err(AppError::QuotaExhausted { kind, used, limit });
        }
        Ok(())
    }

    /// Check the ceiling and consume one unit of `kind`
    pub fn consume(&mut self, kind: QuotaKind, limits: &QuotaLimits, now: i64) -> Result<()> {
        self.ensure_available(kind, limits)?;
        match kind {
            QuotaKind::PublicPostDeletion => {
                self.public_post_deletions += 1;
                self.last_public_deletion_at = Some(now);
            }
            QuotaKind::PermanentDeletion => {
                self.permanent_deletions += 1;
                self.last_permanent_deletion_at = Some(now);
            }
        }
        Ok(())
    }

    pub fn record_publish(&mut self, now: i64) {
        self.entries_published += 1;
        self.last_published_at = Some(now);
    }

    /// Move to `Pending` and return the purge deadline
    ///
    /// Requesting again while pending keeps the original deadline.
    pub fn request_deletion(&mut self, now: i64) -> Result<i64> {
        match self.deletion_status {
            DeletionStatus::Pending => self
                .delete_after
                .ok_or_else(|| AppError::Conflict("Deletion pending without deadline".to_string())),
            DeletionStatus::Completed => Err(AppError::NotFound("Account")),
            DeletionStatus::None => {
                let deadline = now + ACCOUNT_DELETION_GRACE_SECS;
                self.deletion_status = DeletionStatus::Pending;
                self.deletion_requested_at = Some(now);
                self.delete_after = Some(deadline);
                Ok(deadline)
            }
        }
    }

    /// Reset a pending deletion to `None`
    pub fn cancel_deletion(&mut self, now: i64) -> Result<()> {
        if self.deletion_status != DeletionStatus::Pending {
            return Err(AppError::Conflict(
                "No pending account deletion to cancel".to_string(),
            ));
        }
        self.deletion_status = DeletionStatus::None;
        self.deletion_cancelled_at = Some(now);
        self.delete_after = None;
        Ok(())
    }

    /// Pending with an elapsed deadline
    pub fn is_due(&self, now: i64) -> bool {
        self.deletion_status == DeletionStatus::Pending
            && self.delete_after.is_some_and(|deadline| deadline <= now)
    }

    /// Terminal transition of the purge: scrub identifying fields, keep counters
    pub fn mark_purged(&mut self, now: i64) {
        self.display_name = None;
        self.deletion_status = DeletionStatus::Completed;
        self.delete_after = None;
        self.scrubbed_at = Some(now);
    }
}
