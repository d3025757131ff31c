use argon2::Config as Argon2Config;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        common::{optional_profile_url, Email, ProfileUrl, Role},
        db::NewUser,
    },
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(password: &str) -> std::result::Result<String, argon2::Error> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &Argon2Config::default())
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("Name must not be empty"));
    }
    Ok(name.to_string())
}

/// Raw login credentials, received from a user. These are never stored
/// directly, since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub email: Email,
    pub password: String,
}

/// Voter signup.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: Email,
    pub password: String,
    #[serde(default, deserialize_with = "optional_profile_url")]
    pub linkedin_url: Option<ProfileUrl>,
}

impl SignupRequest {
    /// Validate the request and build the user to insert.
    pub fn into_user(self) -> Result<NewUser> {
        let display_name = check_name(&self.name)?;
        check_password(&self.password)?;
        Ok(NewUser {
            email: self.email,
            display_name,
            photo_url: None,
            linkedin_url: self.linkedin_url,
            password_hash: Some(hash_password(&self.password)?),
            role: Role::Voter,
            organization: None,
            password_reset: None,
            created_at: Utc::now(),
        })
    }
}

/// Organizer (candidate) signup. Organizers must be identifiable, so a
/// LinkedIn profile is mandatory.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerSignupRequest {
    pub name: String,
    pub email: Email,
    pub password: String,
    pub linkedin_url: ProfileUrl,
    #[serde(default)]
    pub organization: Option<String>,
}

impl OrganizerSignupRequest {
    /// Validate the request and build the user to insert.
    pub fn into_user(self) -> Result<NewUser> {
        let display_name = check_name(&self.name)?;
        check_password(&self.password)?;
        if !self.linkedin_url.is_linkedin() {
            return Err(Error::bad_request("LinkedIn URL must point at linkedin.com"));
        }
        let organization = self
            .organization
            .map(|org| org.trim().to_string())
            .filter(|org| !org.is_empty());
        Ok(NewUser {
            email: self.email,
            display_name,
            photo_url: None,
            linkedin_url: Some(self.linkedin_url),
            password_hash: Some(hash_password(&self.password)?),
            role: Role::Organizer,
            organization,
            password_reset: None,
            created_at: Utc::now(),
        })
    }
}

/// Request a password reset link.
#[derive(Clone, Deserialize, Serialize)]
pub struct ForgotRequest {
    pub email: Email,
}

/// Complete a password reset.
#[derive(Clone, Deserialize, Serialize)]
pub struct ResetRequest {
    pub token: String,
    pub password: String,
}

impl ResetRequest {
    /// Check the new password and hash it.
    pub fn new_password_hash(&self) -> Result<String> {
        check_password(&self.password)?;
        Ok(hash_password(&self.password)?)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Credentials {
        pub fn example1() -> Self {
            Self {
                email: "u1@example.com".parse().unwrap(),
                password: "correcthorse".into(),
            }
        }

        pub fn example2() -> Self {
            Self {
                email: "olga@example.com".parse().unwrap(),
                password: "batterystaple".into(),
            }
        }

        pub fn wrong_password() -> Self {
            Self {
                password: "incorrecthorse".into(),
                ..Self::example1()
            }
        }
    }

    impl SignupRequest {
        /// Signs up as [`Credentials::example1`], with no LinkedIn profile.
        pub fn example() -> Self {
            let credentials = Credentials::example1();
            Self {
                name: "Una Voter".into(),
                email: credentials.email,
                password: credentials.password,
                linkedin_url: None,
            }
        }
    }

    impl OrganizerSignupRequest {
        /// Signs up as [`Credentials::example2`].
        pub fn example() -> Self {
            let credentials = Credentials::example2();
            Self {
                name: "Olga Organizer".into(),
                email: credentials.email,
                password: credentials.password,
                linkedin_url: "https://www.linkedin.com/in/olga".parse().unwrap(),
                organization: Some("Acme".into()),
            }
        }
    }
}
