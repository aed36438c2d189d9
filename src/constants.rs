/// Hours after publishing during which a post can still be taken down
/// with the public-deletion quota
pub const PUBLIC_DELETE_WINDOW_HOURS: i64 = 24;

/// Grace period between an account deletion request and the purge
pub const ACCOUNT_DELETION_GRACE_SECS: i64 = 24 * 3600;

/// Maximum entry length in characters (after sanitization)
pub const MAX_ENTRY_CHARS: usize = 5000;

/// Maximum length of a mood label or tag name
pub const MAX_LABEL_CHARS: usize = 40;

/// Owner id written onto published entries of purged accounts
pub const ANONYMIZED_OWNER: &str = "anonymous";

/// Default page size for the public feed
pub const DEFAULT_FEED_LIMIT: usize = 50;

/// Upper bound on a requested feed page
pub const MAX_FEED_LIMIT: usize = 200;

// =============================================================================
// Limiter Housekeeping
// =============================================================================

/// Fraction of in-memory rate limit checks that sweep expired windows
pub const RATE_LIMIT_SWEEP_PROBABILITY: f64 = 0.01;

/// Fraction of post limiter checks that prune every user's log
pub const POST_LOG_PRUNE_PROBABILITY: f64 = 0.05;

/// Horizon of the post timestamp log (24 hours)
pub const POST_LOG_HORIZON_SECS: i64 = 86_400;

// =============================================================================
// Error Messages
// =============================================================================

/// Detailed error message for user ID validation in registration
pub const ERR_USER_ID_MUST_BE_SHA256: &str =
    "User ID must be a valid SHA-256 hash (64 hex characters)";

/// Error message for entries that are empty after sanitization
pub const ERR_EMPTY_ENTRY: &str = "Entry content cannot be empty";
