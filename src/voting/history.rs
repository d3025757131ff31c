use std::collections::HashMap;

use mongodb::{bson::doc, options::FindOptions};
use rocket::futures::TryStreamExt;

use crate::{
    error::Result,
    model::{
        api::history::HistoryEntry,
        common::{Email, Slug},
        db::{Team, Vote},
        mongodb::Coll,
    },
};

/// Every vote `voter` has cast, newest first, named as each team currently
/// stands. Renaming a team or candidate after the fact changes the history.
pub async fn voting_history(
    voter: &Email,
    votes: &Coll<Vote>,
    teams: &Coll<Team>,
) -> Result<Vec<HistoryEntry>> {
    let newest_first = FindOptions::builder().sort(doc! { "cast_at": -1 }).build();
    let cast: Vec<Vote> = votes
        .find(doc! { "voter_email": voter.as_str() }, newest_first)
        .await?
        .try_collect()
        .await?;
    if cast.is_empty() {
        return Ok(Vec::new());
    }

    let slugs = cast
        .iter()
        .map(|vote| vote.team_slug.as_str())
        .collect::<Vec<_>>();
    let by_slug: HashMap<Slug, Team> = teams
        .find(doc! { "slug": { "$in": slugs } }, None)
        .await?
        .map_ok(|team| (team.slug.clone(), team))
        .try_collect()
        .await?;

    Ok(cast
        .into_iter()
        .map(|vote| {
            let vote = vote.vote;
            let team = by_slug.get(&vote.team_slug);
            let team_name = team
                .map(|team| team.name.clone())
                .unwrap_or_else(|| vote.team_slug.to_string());
            let candidate_name = team
                .and_then(|team| team.candidate(&vote.candidate_id))
                .map(|candidate| candidate.name.clone())
                .unwrap_or_else(|| vote.candidate_id.clone());
            HistoryEntry {
                team_slug: vote.team_slug,
                team_name,
                candidate_id: vote.candidate_id,
                candidate_name,
                cast_at: vote.cast_at,
            }
        })
        .collect())
}
