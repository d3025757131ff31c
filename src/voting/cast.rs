use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    error::Error as DbError,
    options::FindOptions,
    Client,
};
use rocket::futures::TryStreamExt;

use crate::{
    error::{Error, Result},
    model::{
        api::{auth::AuthToken, vote::VoteRequest},
        common::{CandidateId, Slug},
        db::{NewVote, Team, User, Vote},
        mongodb::{is_duplicate_key_error, is_transient_transaction_error, Coll},
    },
};

/// What happened to an accepted vote attempt.
#[derive(Debug)]
pub enum CastOutcome {
    /// The vote was recorded. Carries every vote in the team, oldest first.
    Committed(Vec<Vote>),
    /// Nothing was recorded: the voter has no LinkedIn profile on file and
    /// supplied none. Resubmitting with one completes the vote.
    LinkedinRequired { candidate_id: CandidateId },
}

/// How long a vote keeps retrying after conflicting with other writes to its team.
const COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempt to cast a vote.
///
/// Checks run in a fixed order and the first failure wins: authentication,
/// team, deadline, candidate, duplicate vote, then the LinkedIn requirement.
/// The duplicate check here only gives a fast answer; the unique ledger
/// index is what actually prevents two racing attempts both committing.
#[allow(clippy::too_many_arguments)]
pub async fn cast_vote(
    voter: Option<&AuthToken>,
    request: VoteRequest,
    db_client: &Client,
    teams: &Coll<Team>,
    users: &Coll<User>,
    votes: &Coll<Vote>,
    new_votes: &Coll<NewVote>,
    now: DateTime<Utc>,
) -> Result<CastOutcome> {
    let voter = voter.ok_or(Error::Unauthenticated)?;
    let slug = request.team_slug.clone();

    let result = attempt(voter, request, db_client, teams, users, votes, new_votes, now).await;
    match &result {
        Ok(CastOutcome::Committed(_)) => info!("{} voted in team '{slug}'", voter.email),
        Ok(CastOutcome::LinkedinRequired { .. }) => {
            info!("{} must supply a LinkedIn URL to vote in '{slug}'", voter.email)
        }
        Err(e) if e.status().code < 500 => {
            info!("Vote by {} in '{slug}' rejected: {e}", voter.email)
        }
        Err(e) => error!("Vote by {} in '{slug}' failed: {e}", voter.email),
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn attempt(
    voter: &AuthToken,
    request: VoteRequest,
    db_client: &Client,
    teams: &Coll<Team>,
    users: &Coll<User>,
    votes: &Coll<Vote>,
    new_votes: &Coll<NewVote>,
    now: DateTime<Utc>,
) -> Result<CastOutcome> {
    // A malformed slug cannot name any team.
    let slug: Slug = request
        .team_slug
        .parse()
        .map_err(|_| Error::TeamNotFound(request.team_slug.clone()))?;
    let team = teams
        .find_one(doc! { "slug": &slug }, None)
        .await?
        .ok_or_else(|| Error::TeamNotFound(slug.to_string()))?;

    // Server clock only.
    if team.is_closed(now) {
        return Err(Error::VotingClosed(slug.to_string()));
    }

    if team.candidate(&request.candidate_id).is_none() {
        return Err(Error::InvalidCandidate(request.candidate_id));
    }

    let ballot_filter = doc! {
        "team_slug": &slug,
        "voter_email": voter.email.as_str(),
    };
    if votes.find_one(ballot_filter, None).await?.is_some() {
        return Err(Error::AlreadyVoted);
    }

    let user = users
        .find_one(voter.id.as_doc(), None)
        .await?
        .ok_or(Error::Unauthenticated)?;

    // An inline URL counts for this vote only and takes precedence.
    let Some(linkedin_url) = request.linkedin_url.or_else(|| user.linkedin_url.clone()) else {
        return Ok(CastOutcome::LinkedinRequired {
            candidate_id: request.candidate_id,
        });
    };

    let voter_name = if user.display_name.trim().is_empty() {
        user.email.split('@').next().unwrap_or_default().to_string()
    } else {
        user.display_name.clone()
    };
    let vote = NewVote {
        team_slug: slug.clone(),
        candidate_id: request.candidate_id,
        voter_email: user.email.clone(),
        voter_name,
        voter_linkedin_url: linkedin_url,
        cast_at: now,
    };
    commit_vote(&team, &vote, db_client, teams, new_votes).await?;

    let oldest_first = FindOptions::builder().sort(doc! { "cast_at": 1 }).build();
    let team_votes = votes
        .find(doc! { "team_slug": &slug }, oldest_first)
        .await?
        .try_collect()
        .await?;
    Ok(CastOutcome::Committed(team_votes))
}

/// Record `vote`, provided its team has not been deleted since it was read.
async fn commit_vote(
    team: &Team,
    vote: &NewVote,
    db_client: &Client,
    teams: &Coll<Team>,
    new_votes: &Coll<NewVote>,
) -> Result<()> {
    let started = Instant::now();
    loop {
        match try_commit_vote(team, vote, db_client, teams, new_votes).await {
            Ok(true) => return Ok(()),
            Ok(false) => return Err(Error::TeamNotFound(team.slug.to_string())),
            // Lost a race with another attempt by the same voter.
            Err(e) if is_duplicate_key_error(&e) => return Err(Error::AlreadyVoted),
            Err(e) if is_transient_transaction_error(&e) && started.elapsed() < COMMIT_TIMEOUT => {
                debug!("Retrying vote by {} in '{}': {e}", vote.voter_email, team.slug);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Insert the vote and stamp the team in one transaction. A cascade delete
/// writes the same team document, so the two cannot interleave.
///
/// Returns false, having written nothing, if the team no longer exists.
async fn try_commit_vote(
    team: &Team,
    vote: &NewVote,
    db_client: &Client,
    teams: &Coll<Team>,
    new_votes: &Coll<NewVote>,
) -> std::result::Result<bool, DbError> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let stamp = doc! { "$set": { "last_vote_at": BsonDateTime::from_chrono(vote.cast_at) } };
    let stamped = teams
        .update_one_with_session(team.id.as_doc(), stamp, None, &mut session)
        .await?;
    if stamped.matched_count == 0 {
        session.abort_transaction().await?;
        return Ok(false);
    }
    new_votes
        .insert_one_with_session(vote, None, &mut session)
        .await?;

    session.commit_transaction().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{futures::future::join_all, local::asynchronous::Client};

    use super::*;
    use crate::model::{
        common::{Email, ProfileUrl},
        db::{NewTeam, NewUser, TeamCore},
        mongodb::Id,
    };

    /// The collections a vote touches.
    struct Ledger {
        db_client: mongodb::Client,
        teams: Coll<Team>,
        users: Coll<User>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    }

    impl Ledger {
        async fn cast(
            &self,
            voter: Option<&AuthToken>,
            request: VoteRequest,
            now: DateTime<Utc>,
        ) -> Result<CastOutcome> {
            cast_vote(
                voter,
                request,
                &self.db_client,
                &self.teams,
                &self.users,
                &self.votes,
                &self.new_votes,
                now,
            )
            .await
        }

        /// Insert a user and return a token for them.
        async fn sign_in(&self, user: NewUser) -> AuthToken {
            let id: Id = self
                .users
                .clone_with_type::<NewUser>()
                .insert_one(&user, None)
                .await
                .unwrap()
                .inserted_id
                .as_object_id()
                .unwrap()
                .into();
            let user = self.users.find_one(id.as_doc(), None).await.unwrap().unwrap();
            AuthToken::new(&user)
        }
    }

    /// The server's own connection, so that sessions match its collections.
    fn db_client(client: &Client) -> mongodb::Client {
        client.rocket().state::<mongodb::Client>().unwrap().clone()
    }

    fn organizer() -> Email {
        "olga@example.com".parse().unwrap()
    }

    #[backend_test]
    async fn unauthenticated(
        client: Client,
        teams: Coll<Team>,
        users: Coll<User>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    ) {
        let ledger = Ledger {
            db_client: db_client(&client),
            teams,
            users,
            votes,
            new_votes,
        };
        let result = ledger.cast(None, VoteRequest::example(), Utc::now()).await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }

    #[backend_test]
    async fn linkedin_round_trip(
        client: Client,
        new_teams: Coll<NewTeam>,
        teams: Coll<Team>,
        users: Coll<User>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    ) {
        new_teams
            .insert_one(TeamCore::example(organizer()), None)
            .await
            .unwrap();
        let ledger = Ledger {
            db_client: db_client(&client),
            teams,
            users,
            votes,
            new_votes,
        };
        let voter = ledger.sign_in(NewUser::example()).await;

        // No LinkedIn on file or supplied: nothing is recorded.
        let outcome = ledger
            .cast(Some(&voter), VoteRequest::example(), Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CastOutcome::LinkedinRequired { ref candidate_id } if candidate_id == "c1"
        ));
        assert_eq!(ledger.votes.count_documents(None, None).await.unwrap(), 0);

        // Supplying it completes the vote with that URL.
        let outcome = ledger
            .cast(Some(&voter), VoteRequest::example_with_linkedin(), Utc::now())
            .await
            .unwrap();
        let CastOutcome::Committed(team_votes) = outcome else {
            panic!("vote was not committed");
        };
        assert_eq!(team_votes.len(), 1);
        assert_eq!(team_votes[0].candidate_id, "c1");
        assert_eq!(team_votes[0].voter_linkedin_url, ProfileUrl::example());
        assert_eq!(team_votes[0].voter_name, "Una Voter");

        // The inline URL is not saved to the profile.
        let user = ledger
            .users
            .find_one(voter.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.linkedin_url, None);

        // A second vote, even for the other candidate, is refused.
        let request = VoteRequest {
            candidate_id: "c2".into(),
            ..VoteRequest::example_with_linkedin()
        };
        let result = ledger.cast(Some(&voter), request, Utc::now()).await;
        assert!(matches!(result, Err(Error::AlreadyVoted)));
        assert_eq!(ledger.votes.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn stored_linkedin_satisfies_gate(
        client: Client,
        new_teams: Coll<NewTeam>,
        teams: Coll<Team>,
        users: Coll<User>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    ) {
        new_teams
            .insert_one(TeamCore::example(organizer()), None)
            .await
            .unwrap();
        let ledger = Ledger {
            db_client: db_client(&client),
            teams,
            users,
            votes,
            new_votes,
        };
        let voter = ledger.sign_in(NewUser::example2()).await;

        let outcome = ledger
            .cast(Some(&voter), VoteRequest::example(), Utc::now())
            .await
            .unwrap();
        let CastOutcome::Committed(team_votes) = outcome else {
            panic!("vote was not committed");
        };
        assert_eq!(
            team_votes[0].voter_linkedin_url.as_str(),
            "https://www.linkedin.com/in/olga"
        );
    }

    #[backend_test]
    async fn rejection_order(
        client: Client,
        new_teams: Coll<NewTeam>,
        teams: Coll<Team>,
        users: Coll<User>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    ) {
        new_teams
            .insert_many(
                [
                    TeamCore::example(organizer()),
                    TeamCore::closed_example(organizer()),
                ],
                None,
            )
            .await
            .unwrap();
        let ledger = Ledger {
            db_client: db_client(&client),
            teams,
            users,
            votes,
            new_votes,
        };
        let voter = ledger.sign_in(NewUser::example()).await;
        let now = Utc::now();

        let request = VoteRequest {
            team_slug: "team-gamma".into(),
            ..VoteRequest::example()
        };
        let result = ledger.cast(Some(&voter), request, now).await;
        assert!(matches!(result, Err(Error::TeamNotFound(_))));

        let request = VoteRequest {
            team_slug: "Not A Slug".into(),
            ..VoteRequest::example()
        };
        let result = ledger.cast(Some(&voter), request, now).await;
        assert!(matches!(result, Err(Error::TeamNotFound(_))));

        // Closed beats an invalid candidate.
        let request = VoteRequest {
            team_slug: "team-beta".into(),
            candidate_id: "c3".into(),
            ..VoteRequest::example()
        };
        let result = ledger.cast(Some(&voter), request, now).await;
        assert!(matches!(result, Err(Error::VotingClosed(_))));

        let request = VoteRequest {
            candidate_id: "c3".into(),
            ..VoteRequest::example()
        };
        let result = ledger.cast(Some(&voter), request, now).await;
        assert!(matches!(result, Err(Error::InvalidCandidate(_))));
    }

    #[backend_test]
    async fn deadline_uses_given_clock(
        client: Client,
        new_teams: Coll<NewTeam>,
        teams: Coll<Team>,
        users: Coll<User>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    ) {
        let deadline = Utc::now() + Duration::hours(1);
        let team = TeamCore {
            deadline: Some(deadline),
            ..TeamCore::example(organizer())
        };
        new_teams.insert_one(team, None).await.unwrap();
        let ledger = Ledger {
            db_client: db_client(&client),
            teams,
            users,
            votes,
            new_votes,
        };
        let voter = ledger.sign_in(NewUser::example()).await;

        let result = ledger
            .cast(Some(&voter), VoteRequest::example_with_linkedin(), deadline)
            .await;
        assert!(matches!(result, Err(Error::VotingClosed(_))));

        let just_before = deadline - Duration::seconds(1);
        let outcome = ledger
            .cast(Some(&voter), VoteRequest::example_with_linkedin(), just_before)
            .await
            .unwrap();
        assert!(matches!(outcome, CastOutcome::Committed(_)));
    }

    #[backend_test]
    async fn concurrent_attempts_commit_once(
        client: Client,
        new_teams: Coll<NewTeam>,
        teams: Coll<Team>,
        users: Coll<User>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    ) {
        new_teams
            .insert_one(TeamCore::example(organizer()), None)
            .await
            .unwrap();
        let ledger = Ledger {
            db_client: db_client(&client),
            teams,
            users,
            votes,
            new_votes,
        };
        let voter = ledger.sign_in(NewUser::example()).await;

        let attempts = (0..8).map(|i| {
            let request = VoteRequest {
                candidate_id: if i % 2 == 0 { "c1" } else { "c2" }.into(),
                ..VoteRequest::example_with_linkedin()
            };
            ledger.cast(Some(&voter), request, Utc::now())
        });
        let results = join_all(attempts).await;

        let committed = results
            .iter()
            .filter(|r| matches!(r, Ok(CastOutcome::Committed(_))))
            .count();
        assert_eq!(committed, 1);
        assert!(results
            .iter()
            .all(|r| matches!(r, Ok(CastOutcome::Committed(_)) | Err(Error::AlreadyVoted))));

        let ledger_filter = doc! {
            "team_slug": "team-alpha",
            "voter_email": voter.email.as_str(),
        };
        assert_eq!(
            ledger.votes.count_documents(ledger_filter, None).await.unwrap(),
            1
        );
    }

    #[backend_test]
    async fn deleted_team_takes_no_late_vote(
        client: Client,
        new_teams: Coll<NewTeam>,
        teams: Coll<Team>,
        votes: Coll<Vote>,
        new_votes: Coll<NewVote>,
    ) {
        new_teams
            .insert_one(TeamCore::example(organizer()), None)
            .await
            .unwrap();
        let db_client = db_client(&client);

        // Two attempts have each read the team.
        let team = teams
            .find_one(doc! { "slug": "team-alpha" }, None)
            .await
            .unwrap()
            .unwrap();
        let first = NewVote::example(Slug::example(), "c1", "u1@example.com");
        let late = NewVote::example(Slug::example(), "c2", "u2@example.com");

        commit_vote(&team, &first, &db_client, &teams, &new_votes)
            .await
            .unwrap();
        let stamped = teams.find_one(team.id.as_doc(), None).await.unwrap().unwrap();
        assert_eq!(
            stamped.last_vote_at.map(|at| at.timestamp_millis()),
            Some(first.cast_at.timestamp_millis())
        );

        // The owner deletes the team before the second one commits.
        crate::voting::delete_team(&team.slug, &organizer(), &db_client, &teams, &votes)
            .await
            .unwrap();

        let result = commit_vote(&team, &late, &db_client, &teams, &new_votes).await;
        assert!(matches!(result, Err(Error::TeamNotFound(_))));
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 0);
    }
}
