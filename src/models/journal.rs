use serde::{Deserialize, Serialize};

/// A mood check-in, stored in the owner's mood log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodRecord {
    pub id: String,
    pub mood: String,
    pub logged_at: i64,
}

/// A user-defined tag available for labelling entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}
