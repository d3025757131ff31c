use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, Bson, Document},
    options::UpdateOptions,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{auth::ProviderIdentity, profile::ProfileUpdate},
        common::Role,
        db::User,
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

/// An aggregation expression that keeps `field` if it has a non-empty value,
/// and otherwise takes `value`.
fn backfill(field: &str, value: impl Into<Bson>) -> Document {
    let path = format!("${field}");
    let value: Bson = value.into();
    doc! {
        "$cond": [
            { "$eq": [{ "$ifNull": [path.as_str(), ""] }, ""] },
            { "$literal": value },
            path.as_str(),
        ]
    }
}

/// Make sure a profile exists for an identity observed at sign-in.
///
/// Creates a voter profile if there is none. Otherwise only empty fields are
/// filled in: anything the user already has is never overwritten by provider
/// data. Running this twice with the same input changes nothing.
pub async fn reconcile_profile(
    identity: &ProviderIdentity,
    users: &Coll<User>,
    now: DateTime<Utc>,
) -> Result<User> {
    let filter = doc! { "email": identity.email.as_str() };
    // One pipeline update does the create and the backfill atomically.
    let merge = vec![doc! {
        "$set": {
            "display_name": backfill("display_name", identity.name.as_str()),
            "photo_url": backfill("photo_url", identity.picture.as_deref()),
            "linkedin_url": backfill("linkedin_url", identity.linkedin_url.as_deref()),
            "role": { "$ifNull": ["$role", Role::Voter] },
            "created_at": { "$ifNull": ["$created_at", Bson::DateTime(now.into())] },
        }
    }];
    let upsert = UpdateOptions::builder().upsert(true).build();

    match users
        .update_one(filter.clone(), merge.clone(), upsert.clone())
        .await
    {
        Ok(_) => {}
        // Two first sign-ins raced and the other one created the profile.
        Err(e) if is_duplicate_key_error(&e) => {
            users.update_one(filter.clone(), merge, upsert).await?;
        }
        Err(e) => return Err(e.into()),
    }

    users
        .find_one(filter, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {}", identity.email)))
}

/// Apply an explicit profile edit.
pub async fn update_profile(
    user_id: Id,
    update: ProfileUpdate,
    users: &Coll<User>,
) -> Result<User> {
    let changes = update.into_changes()?;
    let result = users.update_one(user_id.as_doc(), changes, None).await?;
    if result.matched_count == 0 {
        return Err(Error::not_found("User"));
    }
    users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found("User"))
}
