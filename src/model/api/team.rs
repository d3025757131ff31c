use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, Bson, Document};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        common::{CandidateId, Email, ProfileUrl, Slug},
        db::{team::CANDIDATES_PER_TEAM, Candidate, NewTeam, Team},
    },
};

/// A candidate as submitted by a team organizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSpec {
    /// Defaults to the candidate's position, "1" or "2".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CandidateId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub linkedin_url: String,
}

/// Check a submitted candidate list and convert it for storage.
fn into_candidates(specs: Vec<CandidateSpec>) -> Result<Vec<Candidate>> {
    if specs.len() != CANDIDATES_PER_TEAM
        || specs
            .iter()
            .any(|c| c.name.trim().is_empty() || c.linkedin_url.trim().is_empty())
    {
        return Err(Error::InvalidCandidateCount);
    }

    let candidates = specs
        .into_iter()
        .enumerate()
        .map(|(i, spec)| {
            let id = spec
                .id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| (i + 1).to_string());
            let linkedin_url = spec.linkedin_url.parse::<ProfileUrl>().map_err(|e| {
                Error::bad_request(format!("Candidate '{}': {e}", spec.name.trim()))
            })?;
            Ok(Candidate {
                id,
                name: spec.name.trim().to_string(),
                bio: spec.bio.trim().to_string(),
                linkedin_url,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let distinct = candidates.iter().map(|c| &c.id).collect::<HashSet<_>>();
    if distinct.len() != candidates.len() {
        return Err(Error::bad_request("Candidate IDs must be distinct"));
    }
    Ok(candidates)
}

fn check_team_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("Team name must not be empty"));
    }
    Ok(name.to_string())
}

/// A team specification, as submitted to create a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub candidates: Vec<CandidateSpec>,
}

impl TeamSpec {
    /// Validate this spec and convert it into a team owned by `owner`.
    pub fn into_team(self, owner: Email, now: DateTime<Utc>) -> Result<NewTeam> {
        let slug: Slug = self
            .slug
            .parse()
            .map_err(|e| Error::bad_request(format!("Invalid slug '{}': {e}", self.slug)))?;
        Ok(NewTeam {
            slug,
            name: check_team_name(&self.name)?,
            description: self.description.trim().to_string(),
            deadline: self.deadline,
            candidates: into_candidates(self.candidates)?,
            owner_email: owner,
            created_at: now,
            updated_at: None,
            last_vote_at: None,
        })
    }
}

/// A partial update to a team. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamUpdate {
    /// Slugs cannot change; this is only accepted if it matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `null` clears the deadline.
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<CandidateSpec>>,
}

/// Distinguish an explicit `null` from an absent field.
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl TeamUpdate {
    /// Validate this update against the team's slug and build the `$set`
    /// document for it.
    pub fn into_changes(self, slug: &Slug, now: DateTime<Utc>) -> Result<Document> {
        if let Some(new_slug) = &self.slug {
            if new_slug != slug.as_str() {
                return Err(Error::bad_request("A team's slug cannot be changed"));
            }
        }

        let mut changes = Document::new();
        if let Some(name) = self.name {
            changes.insert("name", check_team_name(&name)?);
        }
        if let Some(description) = self.description {
            changes.insert("description", description.trim());
        }
        if let Some(deadline) = self.deadline {
            changes.insert(
                "deadline",
                deadline.map_or(Bson::Null, |d| Bson::DateTime(d.into())),
            );
        }
        if let Some(candidates) = self.candidates {
            let candidates = into_candidates(candidates)?;
            // Serialising plain strings and vectors of them cannot fail.
            changes.insert("candidates", to_bson(&candidates).expect("BSON candidates"));
        }
        changes.insert("updated_at", Bson::DateTime(now.into()));
        Ok(doc! { "$set": changes })
    }
}

/// A candidate, as shown to voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    pub id: CandidateId,
    pub name: String,
    pub bio: String,
    pub linkedin_url: String,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name,
            bio: candidate.bio,
            linkedin_url: candidate.linkedin_url.into(),
        }
    }
}

/// A team, as shown to anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDescription {
    pub slug: Slug,
    pub name: String,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
    pub candidates: Vec<CandidateDescription>,
    pub owner_email: Email,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Team> for TeamDescription {
    fn from(team: Team) -> Self {
        let team = team.team;
        Self {
            slug: team.slug,
            name: team.name,
            description: team.description,
            deadline: team.deadline,
            candidates: team.candidates.into_iter().map(Into::into).collect(),
            owner_email: team.owner_email,
            created_at: team.created_at,
            updated_at: team.updated_at,
        }
    }
}

/// A team in its owner's dashboard, with its live vote count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedTeam {
    #[serde(flatten)]
    pub team: TeamDescription,
    pub vote_count: u64,
}
