use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{CandidateId, Slug};

/// One of the caller's own votes, named as the team currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub team_slug: Slug,
    /// The slug, if the team no longer exists.
    pub team_name: String,
    pub candidate_id: CandidateId,
    /// The candidate ID, if the candidate no longer stands.
    pub candidate_name: String,
    pub cast_at: DateTime<Utc>,
}

/// The caller's voting history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingHistory {
    pub votes: Vec<HistoryEntry>,
}
