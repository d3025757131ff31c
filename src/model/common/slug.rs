use std::{fmt::Display, ops::Deref, str::FromStr};

use mongodb::bson::Bson;
use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Formatter, Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_SLUG_LENGTH: usize = 64;

/// The human-readable external key of a team, e.g. `team-alpha`.
///
/// Lowercase ASCII letters, digits and inner hyphens only, so it can be
/// used in a URL path unescaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("Slug must be between 1 and {MAX_SLUG_LENGTH} characters")]
    Length,
    #[error("Slug may only contain lowercase letters, digits and hyphens")]
    Charset,
    #[error("Slug may not start or end with a hyphen")]
    Hyphen,
}

impl Slug {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Slug {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Slug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_SLUG_LENGTH {
            return Err(SlugError::Length);
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(SlugError::Charset);
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(SlugError::Hyphen);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl From<&Slug> for Bson {
    fn from(slug: &Slug) -> Self {
        Bson::String(slug.0.clone())
    }
}

impl<'a> FromParam<'a> for Slug {
    type Error = SlugError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

impl UriDisplay<Path> for Slug {
    fn fmt(&self, formatter: &mut Formatter<'_, Path>) -> std::fmt::Result {
        formatter.write_value(&self.0)
    }
}

impl_from_uri_param_identity!([Path] Slug);


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_url_safe_slugs() {
        for s in ["team-alpha", "a", "2024-board-vote", "x1"] {
            assert_eq!(s.parse::<Slug>().unwrap().as_str(), s);
        }
    }

    #[test]
    fn rejects_bad_slugs() {
        assert_eq!("".parse::<Slug>(), Err(SlugError::Length));
        assert_eq!("a".repeat(65).parse::<Slug>(), Err(SlugError::Length));
        assert_eq!("Team-Alpha".parse::<Slug>(), Err(SlugError::Charset));
        assert_eq!("team alpha".parse::<Slug>(), Err(SlugError::Charset));
        assert_eq!("team/alpha".parse::<Slug>(), Err(SlugError::Charset));
        assert_eq!("-alpha".parse::<Slug>(), Err(SlugError::Hyphen));
        assert_eq!("alpha-".parse::<Slug>(), Err(SlugError::Hyphen));
    }
}
