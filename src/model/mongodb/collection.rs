use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    team::{NewTeam, Team},
    user::{NewUser, User},
    vote::{NewVote, Vote},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }

    /// View the same collection through a different document type.
    pub fn clone_with_type<U: MongoCollection>(&self) -> Coll<U> {
        Coll(self.0.clone_with_type())
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

// Team collections
const TEAMS: &str = "teams";
impl MongoCollection for Team {
    const NAME: &'static str = TEAMS;
}
impl MongoCollection for NewTeam {
    const NAME: &'static str = TEAMS;
}

// Vote ledger collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // User collection: one profile per identity.
    let user_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique.clone())
        .build();
    Coll::<User>::from_db(db)
        .create_index(user_index, None)
        .await?;

    // Team collection: slugs are the external key.
    let slug_index = IndexModel::builder()
        .keys(doc! {"slug": 1})
        .options(unique.clone())
        .build();
    let owner_index = IndexModel::builder().keys(doc! {"owner_email": 1}).build();
    Coll::<Team>::from_db(db)
        .create_indexes([slug_index, owner_index], None)
        .await?;

    // Vote ledger: at most one vote per voter per team. This is what makes
    // two racing vote attempts safe; the second insert fails here.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"team_slug": 1, "voter_email": 1})
        .options(unique)
        .build();
    let history_index = IndexModel::builder()
        .keys(doc! {"voter_email": 1, "cast_at": -1})
        .build();
    Coll::<Vote>::from_db(db)
        .create_indexes([ballot_index, history_index], None)
        .await?;

    Ok(())
}
