use redb::TableDefinition;

/// Profiles table: user_id -> UserProfile (quota counters, deletion status)
pub const PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("profiles");

/// Identities table: user_id -> IdentityRecord
pub const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");

/// Entries table: "{user_id}/{entry_id}" -> Entry
pub const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// Public projections: entry_id -> PublishedEntry
pub const PUBLISHED: TableDefinition<&str, &[u8]> = TableDefinition::new("published");

/// Mood log: "{user_id}/{mood_id}" -> MoodRecord
pub const MOODS: TableDefinition<&str, &[u8]> = TableDefinition::new("moods");

/// User tags: "{user_id}/{tag_id}" -> TagRecord
pub const TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("tags");

/// Durable rate-limit counters: identifier -> RateLimitRecord
pub const RATE_LIMITS: TableDefinition<&str, &[u8]> = TableDefinition::new("rate_limits");
