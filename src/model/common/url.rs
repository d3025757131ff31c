use std::{fmt::Display, ops::Deref, str::FromStr};

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// An absolute http(s) URL to a public profile page, usually LinkedIn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileUrl(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not an http(s) URL")]
pub struct ProfileUrlError(String);

impl ProfileUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this URL points at linkedin.com or one of its subdomains.
    pub fn is_linkedin(&self) -> bool {
        Url::parse(&self.0)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .map_or(false, |host| host == "linkedin.com" || host.ends_with(".linkedin.com"))
    }
}

impl Deref for ProfileUrl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ProfileUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProfileUrl {
    type Err = ProfileUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ProfileUrlError(s.to_string());
        let url = Url::parse(trimmed).map_err(|_| invalid())?;

        let web = matches!(url.scheme(), "http" | "https");
        let has_host = url.host_str().map_or(false, |host| !host.is_empty());
        // The parser silently drops embedded tabs and newlines.
        let clean = !trimmed.contains(char::is_whitespace);
        let anonymous = url.username().is_empty() && url.password().is_none();
        if web && has_host && clean && anonymous {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for ProfileUrl {
    type Error = ProfileUrlError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ProfileUrl> for String {
    fn from(url: ProfileUrl) -> Self {
        url.0
    }
}

/// Deserialise an optional profile URL, treating an empty or blank string the
/// same as an absent one. Forms commonly submit empty fields.
pub fn optional_profile_url<'de, D>(deserializer: D) -> Result<Option<ProfileUrl>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.trim().is_empty() => s.parse().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
