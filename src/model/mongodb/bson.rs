use std::{fmt::Display, ops::Deref, str::FromStr};

use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use serde::{Deserialize, Serialize};

/// A MongoDB document ID.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(ObjectId);

impl Id {
    /// Generate a fresh ID.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// A filter document matching exactly this ID.
    pub fn as_doc(&self) -> Document {
        doc! { "_id": self.0 }
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Id {
    type Target = ObjectId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = mongodb::bson::oid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse::<ObjectId>()?))
    }
}

impl From<ObjectId> for Id {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

impl From<Id> for Bson {
    fn from(id: Id) -> Self {
        Bson::ObjectId(id.0)
    }
}

/// (De)serialise an optional chrono datetime as an optional BSON datetime.
///
/// `bson`'s own `chrono_datetime_as_bson_datetime` helper does not handle
/// `Option`, and deadlines are optional.
pub mod serde_optional_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson::DateTime as BsonDateTime;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(BsonDateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<BsonDateTime>::deserialize(deserializer)?;
        Ok(value.map(BsonDateTime::to_chrono))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mongodb::bson::{from_document, to_document};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Deadline {
        #[serde(default, with = "serde_optional_datetime")]
        at: Option<chrono::DateTime<Utc>>,
    }

    #[test]
    fn optional_datetime_is_stored_as_bson_datetime() {
        let deadline = Deadline {
            at: Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()),
        };
        let document = to_document(&deadline).unwrap();
        assert!(matches!(document.get("at"), Some(Bson::DateTime(_))));
        assert_eq!(from_document::<Deadline>(document).unwrap(), deadline);

        let none = Deadline { at: None };
        let document = to_document(&none).unwrap();
        assert_eq!(document.get("at"), Some(&Bson::Null));
        assert_eq!(from_document::<Deadline>(document).unwrap(), none);
        assert_eq!(from_document::<Deadline>(doc! {}).unwrap(), none);
    }

    #[test]
    fn id_filter() {
        let id = Id::new();
        assert_eq!(id.as_doc(), doc! { "_id": *id });
        assert_eq!(id.to_string().parse::<Id>().unwrap(), id);
    }
}
