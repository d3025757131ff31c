use std::fmt::Display;

use rocket::{http::Status, request::FromParam};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::common::{Email, ProfileUrl},
    Config,
};

#[cfg(test)]
pub const TEST_ACCESS_TOKEN: &str = "this access token will succeed in test mode";

/// A third-party identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Linkedin,
}

impl Provider {
    fn userinfo_url(self, config: &Config) -> &str {
        match self {
            Self::Google => config.google_userinfo_url(),
            Self::Linkedin => config.linkedin_userinfo_url(),
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Google => "google",
            Self::Linkedin => "linkedin",
        })
    }
}

impl<'a> FromParam<'a> for Provider {
    type Error = &'a str;

    fn from_param(param: &'a str) -> std::result::Result<Self, Self::Error> {
        match param {
            "google" => Ok(Self::Google),
            "linkedin" => Ok(Self::Linkedin),
            _ => Err(param),
        }
    }
}

/// An access token the client obtained from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthRequest {
    access_token: String, // Deliberately not public, so it can only be used via `verify()`
}

/// The standard OpenID Connect userinfo claims we care about.
#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

/// A verified identity observed at a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub email: Email,
    pub name: String,
    pub picture: Option<String>,
    /// Only LinkedIn can vouch for a LinkedIn profile.
    pub linkedin_url: Option<ProfileUrl>,
}

impl OAuthRequest {
    /// Ask the provider who this access token belongs to.
    pub async fn verify(
        self,
        provider: Provider,
        http: &reqwest::Client,
        config: &Config,
    ) -> Result<ProviderIdentity> {
        // In test mode, accept a dummy token without contacting the provider.
        #[cfg(test)]
        if self.access_token == TEST_ACCESS_TOKEN {
            return UserInfo::example().into_identity(provider);
        }

        let response = http
            .get(provider.userinfo_url(config))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            warn!(
                "{provider} rejected an access token with status {}",
                response.status()
            );
            return Err(Error::Status(
                Status::Unauthorized,
                format!("Could not verify {provider} sign-in"),
            ));
        }
        response.json::<UserInfo>().await?.into_identity(provider)
    }
}

impl UserInfo {
    fn into_identity(self, provider: Provider) -> Result<ProviderIdentity> {
        let unverified = || {
            Error::Status(
                Status::Unauthorized,
                format!("{provider} did not provide a verified email address"),
            )
        };
        if self.email_verified == Some(false) {
            return Err(unverified());
        }
        let email: Email = self
            .email
            .as_deref()
            .and_then(|email| email.parse().ok())
            .ok_or_else(unverified)?;

        let linkedin_url = match provider {
            Provider::Linkedin => format!("https://www.linkedin.com/in/{}", self.sub)
                .parse()
                .ok(),
            Provider::Google => None,
        };
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(ProviderIdentity {
            email,
            name,
            picture: self.picture.filter(|p| !p.is_empty()),
            linkedin_url,
        })
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl UserInfo {
        pub fn example() -> Self {
            Self {
                sub: "ola-auth".to_string(),
                email: Some("ola@example.com".to_string()),
                email_verified: Some(true),
                name: Some("Ola Auth".to_string()),
                picture: Some("https://example.com/ola.png".to_string()),
            }
        }
    }

    impl OAuthRequest {
        pub fn example() -> Self {
            Self {
                access_token: TEST_ACCESS_TOKEN.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linkedin_identity_carries_profile() {
        let identity = UserInfo::example().into_identity(Provider::Linkedin).unwrap();
        assert_eq!(identity.email.as_str(), "ola@example.com");
        assert_eq!(
            identity.linkedin_url.unwrap().as_str(),
            "https://www.linkedin.com/in/ola-auth"
        );

        let identity = UserInfo::example().into_identity(Provider::Google).unwrap();
        assert_eq!(identity.linkedin_url, None);
        assert_eq!(identity.name, "Ola Auth");
    }

    #[test]
    fn unverified_email_rejected() {
        let info = UserInfo {
            email_verified: Some(false),
            ..UserInfo::example()
        };
        assert!(info.into_identity(Provider::Google).is_err());

        let info = UserInfo {
            email: None,
            ..UserInfo::example()
        };
        assert!(info.into_identity(Provider::Google).is_err());
    }

    #[test]
    fn missing_name_falls_back_to_email() {
        let info = UserInfo {
            name: None,
            ..UserInfo::example()
        };
        assert_eq!(info.into_identity(Provider::Google).unwrap().name, "ola");
    }

    #[test]
    fn providers_from_path() {
        assert_eq!(Provider::from_param("google"), Ok(Provider::Google));
        assert_eq!(Provider::from_param("linkedin"), Ok(Provider::Linkedin));
        assert!(Provider::from_param("github").is_err());
    }
}
