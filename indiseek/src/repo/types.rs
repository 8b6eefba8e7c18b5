use serde::Serialize;

/// Never indexed yet — distinct from "0 commits behind".
pub const COMMITS_BEHIND_UNKNOWN: i64 = -1;

#[derive(Serialize, PartialEq, Eq, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
    /// Indexed at the current HEAD
    Current,

    /// Indexed, but HEAD has moved since
    Stale,

    /// Cloned but never indexed
    NotIndexed,
}

#[derive(Serialize, Clone, Debug)]
pub struct FreshnessReport {
    pub indexed_sha: Option<String>,
    pub current_sha: String,
    pub commits_behind: i64,
    pub changed_files: Vec<String>,
    pub status: FreshnessStatus,
}
