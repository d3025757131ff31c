use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{CandidateId, Email, ProfileUrl, Slug},
    mongodb::{serde_optional_datetime, Id},
};

/// Every team is a head-to-head between exactly this many candidates.
pub const CANDIDATES_PER_TEAM: usize = 2;

/// Core team data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCore {
    /// External key; never changes after creation.
    pub slug: Slug,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Votes are refused at or after this instant.
    #[serde(default, with = "serde_optional_datetime")]
    pub deadline: Option<DateTime<Utc>>,
    pub candidates: Vec<Candidate>,
    pub owner_email: Email,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "serde_optional_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Stamped by every vote, in the vote's own transaction.
    #[serde(default, with = "serde_optional_datetime")]
    pub last_vote_at: Option<DateTime<Utc>>,
}

impl TeamCore {
    /// Is voting closed at the given instant?
    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        self.deadline.map_or(false, |deadline| now >= deadline)
    }

    /// Look up a current candidate by ID.
    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn is_owned_by(&self, email: &Email) -> bool {
        &self.owner_email == email
    }
}

/// A team without an ID.
pub type NewTeam = TeamCore;

/// A team from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub team: TeamCore,
}

impl Deref for Team {
    type Target = TeamCore;

    fn deref(&self) -> &Self::Target {
        &self.team
    }
}

impl DerefMut for Team {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.team
    }
}

/// One of the two people standing in a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique within the team.
    pub id: CandidateId,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    pub linkedin_url: ProfileUrl,
}


#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn deadline_is_inclusive() {
        let owner: Email = "olga@example.com".parse().unwrap();
        let mut team = TeamCore::example(owner);
        let deadline = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
        assert!(!team.is_closed(deadline));

        team.deadline = Some(deadline);
        assert!(!team.is_closed(deadline - Duration::milliseconds(1)));
        assert!(team.is_closed(deadline));
        assert!(team.is_closed(deadline + Duration::days(1)));
    }

    #[test]
    fn candidate_lookup() {
        let team = TeamCore::example("olga@example.com".parse().unwrap());
        assert_eq!(team.candidate("c2").unwrap().name, "Bob");
        assert!(team.candidate("c3").is_none());
    }
}
