use chrono::Utc;
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            history::VotingHistory,
            vote::{LinkedinRequired, VoteAccepted, VoteRequest, VoteResponse},
        },
        db::{NewVote, Team, User, Vote},
        mongodb::Coll,
    },
    voting::{cast_vote, voting_history, CastOutcome},
};

pub fn routes() -> Vec<Route> {
    routes![vote, history]
}

#[post("/vote", data = "<request>", format = "json")]
async fn vote(
    token: std::result::Result<AuthToken, Error>,
    request: Json<VoteRequest>,
    db_client: &State<mongodb::Client>,
    teams: Coll<Team>,
    users: Coll<User>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
) -> Result<Json<VoteResponse>> {
    // Authentication is checked alongside everything else, in order.
    let token = match token {
        Ok(token) => Some(token),
        Err(Error::Unauthenticated) => None,
        Err(e) => return Err(e),
    };

    let outcome = cast_vote(
        token.as_ref(),
        request.0,
        db_client,
        &teams,
        &users,
        &votes,
        &new_votes,
        Utc::now(),
    )
    .await?;

    let response = match outcome {
        CastOutcome::Committed(voters) => VoteResponse::Accepted(VoteAccepted {
            ok: true,
            voters: voters.into_iter().map(Into::into).collect(),
        }),
        CastOutcome::LinkedinRequired { candidate_id } => {
            VoteResponse::LinkedinRequired(LinkedinRequired {
                require_linkedin: true,
                candidate_id,
            })
        }
    };
    Ok(Json(response))
}

#[get("/user/voting-history")]
async fn history(
    token: AuthToken,
    votes: Coll<Vote>,
    teams: Coll<Team>,
) -> Result<Json<VotingHistory>> {
    let votes = voting_history(&token.email, &votes, &teams).await?;
    Ok(Json(VotingHistory { votes }))
}
