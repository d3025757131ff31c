use chrono::Utc;
use mongodb::{
    bson::doc,
    options::{FindOptions, SessionOptions},
};
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            team::{OwnedTeam, TeamDescription, TeamSpec, TeamUpdate},
            vote::{VoterDescription, VotersSummary},
        },
        common::Slug,
        db::{NewTeam, Team, Vote},
        mongodb::Coll,
    },
    voting::{self, tally_by_candidate},
};

pub fn routes() -> Vec<Route> {
    routes![
        list_teams,
        get_team,
        get_voters,
        create_team,
        update_team,
        delete_team,
        organizer_teams
    ]
}

#[get("/teams")]
async fn list_teams(teams: Coll<Team>) -> Result<Json<Vec<TeamDescription>>> {
    let teams = voting::list_teams(&teams).await?;
    Ok(Json(teams.into_iter().map(Into::into).collect()))
}

#[get("/teams/<slug>")]
async fn get_team(slug: Slug, teams: Coll<Team>) -> Result<Json<TeamDescription>> {
    let team = voting::get_team(&slug, &teams).await?;
    Ok(Json(team.into()))
}

#[get("/teams/<slug>/voters")]
pub async fn get_voters(
    slug: Slug,
    db_client: &State<mongodb::Client>,
    teams: Coll<Team>,
    votes: Coll<Vote>,
) -> Result<Json<VotersSummary>> {
    // Read the team, tally and voters from one snapshot so that they agree.
    let session_options = SessionOptions::builder().snapshot(true).build();
    let mut session = db_client.start_session(Some(session_options)).await?;

    let team = teams
        .find_one_with_session(doc! { "slug": &slug }, None, &mut session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Team '{slug}'")))?;
    let tally = tally_by_candidate(&slug, &votes, &mut session).await?;

    let oldest_first = FindOptions::builder().sort(doc! { "cast_at": 1 }).build();
    let mut cursor = votes
        .find_with_session(doc! { "team_slug": &slug }, oldest_first, &mut session)
        .await?;
    let mut voters = Vec::new();
    while let Some(vote) = cursor.next(&mut session).await {
        voters.push(VoterDescription::from(vote?));
    }

    let percentages = tally.percentages(team.candidates.iter().map(|c| c.id.as_str()));
    Ok(Json(VotersSummary {
        voters,
        vote_counts: tally.counts().clone(),
        total_votes: tally.total(),
        percentages,
    }))
}

#[post("/teams", data = "<spec>", format = "json")]
pub async fn create_team(
    token: AuthToken,
    spec: Json<TeamSpec>,
    new_teams: Coll<NewTeam>,
    votes: Coll<Vote>,
) -> Result<Json<TeamDescription>> {
    let team = voting::create_team(token.email, spec.0, &new_teams, &votes, Utc::now()).await?;
    Ok(Json(team.into()))
}

#[put("/teams/<slug>", data = "<update>", format = "json")]
async fn update_team(
    token: AuthToken,
    slug: Slug,
    update: Json<TeamUpdate>,
    teams: Coll<Team>,
) -> Result<Json<TeamDescription>> {
    let team = voting::update_team(&slug, &token.email, update.0, &teams, Utc::now()).await?;
    Ok(Json(team.into()))
}

#[delete("/teams/<slug>")]
async fn delete_team(
    token: AuthToken,
    slug: Slug,
    db_client: &State<mongodb::Client>,
    teams: Coll<Team>,
    votes: Coll<Vote>,
) -> Result<()> {
    voting::delete_team(&slug, &token.email, db_client, &teams, &votes).await?;
    Ok(())
}

#[get("/organizer/teams")]
async fn organizer_teams(
    token: AuthToken,
    teams: Coll<Team>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<OwnedTeam>>> {
    let owned = voting::list_teams_by_owner(&token.email, &teams, &votes).await?;
    Ok(Json(owned))
}
