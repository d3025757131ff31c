//! The voting service.
//!
//! Handlers in [`crate::api`] deal with HTTP; everything here deals with the
//! rules: who owns which team, when a vote may be cast, and how votes are
//! counted. All shared state lives in the database, so these are plain async
//! functions over collections.

pub mod cast;
pub mod history;
pub mod profile;
pub mod registry;
pub mod tally;

pub use cast::{cast_vote, CastOutcome};
pub use history::voting_history;
pub use profile::{reconcile_profile, update_profile};
pub use registry::{
    create_team, delete_team, get_team, list_teams, list_teams_by_owner, update_team,
};
pub use tally::{count_votes, tally_by_candidate, Tally};
