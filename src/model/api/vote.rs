use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{optional_profile_url, CandidateId, ProfileUrl},
    db::Vote,
};

/// A vote attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub team_slug: String,
    pub candidate_id: CandidateId,
    /// Satisfies the LinkedIn requirement for this vote only; it is not saved
    /// to the voter's profile.
    #[serde(
        default,
        deserialize_with = "optional_profile_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub linkedin_url: Option<ProfileUrl>,
}

/// A vote as shown publicly alongside a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterDescription {
    pub voter_name: String,
    pub voter_linkedin_url: String,
    pub candidate_id: CandidateId,
    pub cast_at: DateTime<Utc>,
}

impl From<Vote> for VoterDescription {
    fn from(vote: Vote) -> Self {
        let vote = vote.vote;
        Self {
            voter_name: vote.voter_name,
            voter_linkedin_url: vote.voter_linkedin_url.into(),
            candidate_id: vote.candidate_id,
            cast_at: vote.cast_at,
        }
    }
}

/// The successful outcomes of a vote attempt.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoteResponse {
    Accepted(VoteAccepted),
    LinkedinRequired(LinkedinRequired),
}

/// The vote was recorded; here is everyone who has voted in the team so far.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccepted {
    pub ok: bool,
    pub voters: Vec<VoterDescription>,
}

/// Nothing was recorded. Resubmit with a `linkedinUrl` to complete the vote.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedinRequired {
    pub require_linkedin: bool,
    pub candidate_id: CandidateId,
}

/// Everyone who voted in a team, with the live tally.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotersSummary {
    pub voters: Vec<VoterDescription>,
    pub vote_counts: BTreeMap<CandidateId, u64>,
    pub total_votes: u64,
    /// Rounded independently, so these may not sum to exactly 100.
    pub percentages: BTreeMap<CandidateId, u64>,
}


#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json::{self, json};

    use super::*;

    #[test]
    fn outcomes_serialise_flat() {
        let accepted = VoteResponse::Accepted(VoteAccepted {
            ok: true,
            voters: vec![],
        });
        assert_eq!(
            serde_json::to_value(accepted).unwrap(),
            json!({"ok": true, "voters": []})
        );

        let gated = VoteResponse::LinkedinRequired(LinkedinRequired {
            require_linkedin: true,
            candidate_id: "c1".into(),
        });
        assert_eq!(
            serde_json::to_value(gated).unwrap(),
            json!({"requireLinkedin": true, "candidateId": "c1"})
        );
    }

    #[test]
    fn empty_inline_linkedin_is_absent() {
        let request: VoteRequest = serde_json::from_value(json!({
            "teamSlug": "team-alpha",
            "candidateId": "c1",
            "linkedinUrl": "",
        }))
        .unwrap();
        assert_eq!(request.linkedin_url, None);
    }
}
