//! Types compatible with both API and DB.
//!
//! Each of these validates itself on deserialisation, so anything that
//! reaches the voting logic is already well-formed.

mod email;
mod role;
mod slug;
mod url;

pub use email::Email;
pub use role::Role;
pub use slug::Slug;
pub use url::{optional_profile_url, ProfileUrl};

/// Candidate IDs are short strings, unique within their team.
pub type CandidateId = String;
