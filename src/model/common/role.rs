use std::fmt::Display;

use mongodb::bson::Bson;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// What a user signed up as.
///
/// This is informational: any authenticated user may vote and may run teams.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Role {
    Voter = 0,
    Organizer = 1,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voter => "voter",
            Self::Organizer => "organizer",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        Bson::Int32(role as i32)
    }
}
