pub mod entry;
pub mod journal;
pub mod quota;
pub mod rate_limit;
pub mod user;

pub use entry::{Entry, EntryState, PublishedEntry};
pub use journal::{MoodRecord, TagRecord};
pub use quota::{DeletionStatus, QuotaKind, QuotaLimits, UserProfile};
pub use rate_limit::RateLimitRecord;
pub use user::{IdentityRecord, User};
