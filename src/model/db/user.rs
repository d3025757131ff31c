use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    model::{
        common::{Email, ProfileUrl, Role},
        mongodb::Id,
    },
    Config,
};

pub type HmacSha256 = Hmac<Sha256>;

/// Core user profile data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    /// Stable identity of the user.
    pub email: Email,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Stored LinkedIn profile, which satisfies the vote identity gate.
    #[serde(default)]
    pub linkedin_url: Option<ProfileUrl>,
    /// Absent for accounts that only ever signed in through a provider.
    #[serde(default)]
    pub password_hash: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub password_reset: Option<PasswordReset>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserCore {
    /// Check whether the given password is correct.
    ///
    /// Always false for accounts without a password.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        self.password_hash
            .as_deref()
            .map(|hash| argon2::verify_encoded(hash, password.as_ref()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// The user's LinkedIn profile, if one is on file.
    pub fn linkedin_url(&self) -> Option<&ProfileUrl> {
        self.linkedin_url.as_ref()
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// A pending password reset.
///
/// Only the HMAC of the token is stored, so a database leak does not leak
/// usable reset links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordReset {
    pub token_hmac: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    /// HMAC a raw reset token with the configured key, as lowercase hex.
    pub fn hmac_token(token: &str, config: &Config) -> String {
        let mut hmac = HmacSha256::new_from_slice(config.hmac_secret())
            .expect("HMAC can take key of any size");
        hmac.update(token.as_bytes());
        HEXLOWER.encode(&hmac.finalize().into_bytes())
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use crate::model::api::auth::hash_password;

    impl UserCore {
        /// A voter with no LinkedIn profile on file.
        pub fn example() -> Self {
            Self {
                email: "u1@example.com".parse().unwrap(),
                display_name: "Una Voter".to_string(),
                photo_url: None,
                linkedin_url: None,
                password_hash: Some(hash_password("correcthorse").unwrap()),
                role: Role::Voter,
                organization: None,
                password_reset: None,
                created_at: Utc::now(),
            }
        }

        /// An organizer with a LinkedIn profile on file.
        pub fn example2() -> Self {
            Self {
                email: "olga@example.com".parse().unwrap(),
                display_name: "Olga Organizer".to_string(),
                photo_url: Some("https://example.com/olga.png".to_string()),
                linkedin_url: Some("https://www.linkedin.com/in/olga".parse().unwrap()),
                password_hash: None,
                role: Role::Organizer,
                organization: Some("Acme".to_string()),
                password_reset: None,
                created_at: Utc::now(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwordless_accounts_never_verify() {
        let user = UserCore::example2();
        assert!(!user.verify_password(""));
        assert!(!user.verify_password("anything"));
    }

    #[test]
    fn malformed_hash_does_not_verify() {
        let mut user = UserCore::example();
        user.password_hash = Some("not a hash".to_string());
        assert!(!user.verify_password("correcthorse"));
    }

    #[test]
    fn verifies_own_password() {
        let user = UserCore::example();
        assert!(user.verify_password("correcthorse"));
        assert!(!user.verify_password("wronghorse"));
    }
}
