//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//! - Field names are snake_case.

pub mod team;
pub mod user;
pub mod vote;

pub use team::{Candidate, NewTeam, Team, TeamCore};
pub use user::{NewUser, PasswordReset, User, UserCore};
pub use vote::{NewVote, Vote, VoteCore};
