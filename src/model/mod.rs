//! Data types, split by where they are used:
//!
//! - [`api`]: request and response bodies, camelCase JSON.
//! - [`db`]: documents as stored in MongoDB, snake_case BSON.
//! - [`common`]: validated value types shared by both.
//! - [`mongodb`]: collection handles and driver helpers.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;
