//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Field names are camelCase.
//! - Datetimes are serialised as RFC 3339 strings.
//! - Internal fields such as document IDs and password hashes are never exposed.

pub mod auth;
pub mod history;
pub mod profile;
pub mod team;
pub mod vote;
