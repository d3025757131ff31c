use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use mongodb::error::Error as DbError;
use reqwest::Error as HttpError;
use rocket::{http::Status, response::Responder, serde::json::Json, Request};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a request can fail.
///
/// The named variants are expected outcomes that the caller can act on, and
/// each is rendered with its own kind so clients can tell them apart.
/// Storage and other infrastructure faults are logged and reported as a
/// generic internal failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("Team '{0}' not found")]
    TeamNotFound(String),
    #[error("Candidate '{0}' is not standing in this team")]
    InvalidCandidate(String),
    #[error("Voting for team '{0}' has closed")]
    VotingClosed(String),
    #[error("You have already voted in this team")]
    AlreadyVoted,
    #[error("A team with slug '{0}' already exists")]
    DuplicateSlug(String),
    #[error("A team needs exactly two candidates, each with a name and a LinkedIn URL")]
    InvalidCandidateCount,
    #[error("Only the owner of team '{0}' may change it")]
    NotOwner(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{1}")]
    Status(Status, String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, msg.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Unauthenticated => Status::Unauthorized,
            Self::TeamNotFound(_) | Self::NotFound(_) => Status::NotFound,
            Self::InvalidCandidate(_) | Self::InvalidCandidateCount => Status::BadRequest,
            Self::VotingClosed(_) | Self::NotOwner(_) => Status::Forbidden,
            Self::AlreadyVoted | Self::DuplicateSlug(_) => Status::Conflict,
            Self::Status(status, _) => *status,
            Self::Db(_) | Self::Jwt(_) | Self::Argon2(_) | Self::Http(_) => {
                Status::InternalServerError
            }
        }
    }

    /// The machine-readable kind reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthenticated",
            Self::TeamNotFound(_) => "TeamNotFound",
            Self::InvalidCandidate(_) => "InvalidCandidate",
            Self::VotingClosed(_) => "VotingClosed",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::DuplicateSlug(_) => "DuplicateSlug",
            Self::InvalidCandidateCount => "InvalidCandidateCount",
            Self::NotOwner(_) => "NotOwner",
            Self::NotFound(_) => "NotFound",
            Self::Status(status, _) => status_kind(*status),
            Self::Db(_) | Self::Jwt(_) | Self::Argon2(_) | Self::Http(_) => "Internal",
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub expired: bool,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        let message = match err.status().class() {
            rocket::http::StatusClass::ServerError => "Internal server error".to_string(),
            _ => err.to_string(),
        };
        Self {
            error: err.kind(),
            message,
            expired: matches!(err, Error::VotingClosed(_)),
        }
    }
}

/// Kind names for plain status errors, shared with the catchers.
pub fn status_kind(status: Status) -> &'static str {
    match status.code {
        400 => "BadRequest",
        401 => "Unauthenticated",
        403 => "Forbidden",
        404 => "NotFound",
        409 => "Conflict",
        422 => "UnprocessableEntity",
        500..=599 => "Internal",
        _ => "Error",
    }
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            error!("Internal failure handling {} {}: {self}", req.method(), req.uri());
        } else {
            debug!("Rejected {} {}: {self}", req.method(), req.uri());
        }
        (status, Json(ErrorBody::from(&self))).respond_to(req)
    }
}
