use chrono::{DateTime, Utc};
use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::FindOptions,
    Client,
};
use rocket::futures::TryStreamExt;

use crate::{
    error::{Error, Result},
    model::{
        api::team::{OwnedTeam, TeamSpec, TeamUpdate},
        common::{Email, Slug},
        db::{NewTeam, Team, Vote},
        mongodb::{is_duplicate_key_error, is_transient_transaction_error, Coll, Id},
    },
};

use super::tally::count_votes;

/// How many times a cascade delete is attempted before giving up. Each vote
/// writes the team document, so busy teams can conflict a few times.
const MAX_DELETE_ATTEMPTS: usize = 10;

/// Create a team owned by `owner`.
pub async fn create_team(
    owner: Email,
    spec: TeamSpec,
    new_teams: &Coll<NewTeam>,
    votes: &Coll<Vote>,
    now: DateTime<Utc>,
) -> Result<Team> {
    let team = spec.into_team(owner, now)?;

    // Votes left behind under this slug by an interrupted delete would be
    // counted for the new team, so treat the slug as taken.
    if count_votes(&team.slug, votes).await? > 0 {
        warn!("Refusing to reuse slug '{}', which still has votes", team.slug);
        return Err(Error::DuplicateSlug(team.slug.to_string()));
    }

    // The unique index on `slug` settles concurrent creations.
    let id: Id = match new_teams.insert_one(&team, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB
            .into(),
        Err(e) if is_duplicate_key_error(&e) => {
            return Err(Error::DuplicateSlug(team.slug.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    info!("Team '{}' created by {}", team.slug, team.owner_email);

    Ok(Team { id, team })
}

/// Get a team by its slug. Teams are public.
pub async fn get_team(slug: &Slug, teams: &Coll<Team>) -> Result<Team> {
    teams
        .find_one(doc! { "slug": slug }, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Team '{slug}'")))
}

/// Get a team, checking that `owner` owns it.
async fn owned_team(slug: &Slug, owner: &Email, teams: &Coll<Team>) -> Result<Team> {
    let team = get_team(slug, teams).await?;
    if !team.is_owned_by(owner) {
        return Err(Error::NotOwner(slug.to_string()));
    }
    Ok(team)
}

/// Apply a partial update to a team owned by `owner`.
pub async fn update_team(
    slug: &Slug,
    owner: &Email,
    update: TeamUpdate,
    teams: &Coll<Team>,
    now: DateTime<Utc>,
) -> Result<Team> {
    let team = owned_team(slug, owner, teams).await?;
    let changes = update.into_changes(&team.slug, now)?;

    // Filter on the owner too, so the check above cannot go stale.
    let filter = doc! {
        "_id": team.id,
        "owner_email": owner.as_str(),
    };
    let result = teams.update_one(filter, changes, None).await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!("Team '{slug}'")));
    }

    teams
        .find_one(team.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Team '{slug}'")))
}

/// Delete a team owned by `owner`, along with every vote cast in it.
///
/// Returns the number of votes deleted.
pub async fn delete_team(
    slug: &Slug,
    owner: &Email,
    db_client: &Client,
    teams: &Coll<Team>,
    votes: &Coll<Vote>,
) -> Result<u64> {
    let team = owned_team(slug, owner, teams).await?;

    let mut attempt = 1;
    loop {
        match delete_cascade(&team, db_client, teams, votes).await {
            Ok(deleted) => {
                info!("Team '{slug}' deleted with {deleted} votes");
                return Ok(deleted);
            }
            Err(e) if attempt < MAX_DELETE_ATTEMPTS && is_transient_transaction_error(&e) => {
                warn!("Retrying delete of team '{slug}' (attempt {attempt}): {e}");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Delete the votes and then the team, as one transaction.
///
/// Votes go first, so that if transactions are ever unavailable the worst
/// case is an empty team that can be deleted again.
async fn delete_cascade(
    team: &Team,
    db_client: &Client,
    teams: &Coll<Team>,
    votes: &Coll<Vote>,
) -> std::result::Result<u64, DbError> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let deleted = votes
        .delete_many_with_session(doc! { "team_slug": &team.slug }, None, &mut session)
        .await?
        .deleted_count;
    teams
        .delete_one_with_session(team.id.as_doc(), None, &mut session)
        .await?;

    session.commit_transaction().await?;
    Ok(deleted)
}

/// Every team, newest first.
pub async fn list_teams(teams: &Coll<Team>) -> Result<Vec<Team>> {
    let newest_first = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    Ok(teams
        .find(None, newest_first)
        .await?
        .try_collect()
        .await?)
}

/// The teams `owner` runs, newest first, each with its current vote count.
pub async fn list_teams_by_owner(
    owner: &Email,
    teams: &Coll<Team>,
    votes: &Coll<Vote>,
) -> Result<Vec<OwnedTeam>> {
    let newest_first = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let owned: Vec<Team> = teams
        .find(doc! { "owner_email": owner.as_str() }, newest_first)
        .await?
        .try_collect()
        .await?;

    let mut result = Vec::with_capacity(owned.len());
    for team in owned {
        let vote_count = count_votes(&team.slug, votes).await?;
        result.push(OwnedTeam {
            team: team.into(),
            vote_count,
        });
    }
    Ok(result)
}
