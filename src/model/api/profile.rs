use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{common::ProfileUrl, db::User},
};

/// A user's own profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDescription {
    pub email: String,
    pub display_name: String,
    pub linkedin_url: Option<String>,
    pub photo_url: Option<String>,
    pub role: String,
    pub organization: Option<String>,
}

impl From<User> for ProfileDescription {
    fn from(user: User) -> Self {
        let user = user.user;
        Self {
            email: user.email.into(),
            display_name: user.display_name,
            linkedin_url: user.linkedin_url.map(Into::into),
            photo_url: user.photo_url,
            role: user.role.to_string(),
            organization: user.organization,
        }
    }
}

/// An edit to the caller's own profile.
///
/// An empty `linkedinUrl` removes the stored profile URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
}

impl ProfileUpdate {
    /// Validate this edit and build the update document for it.
    pub fn into_changes(self) -> Result<Document> {
        if self.display_name.is_none() && self.linkedin_url.is_none() {
            return Err(Error::bad_request(
                "Nothing to update: supply displayName or linkedinUrl",
            ));
        }

        let mut set = Document::new();
        let mut unset = Document::new();
        if let Some(name) = self.display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::bad_request("Display name must not be empty"));
            }
            set.insert("display_name", name);
        }
        if let Some(url) = self.linkedin_url {
            if url.trim().is_empty() {
                unset.insert("linkedin_url", "");
            } else {
                let url = url
                    .parse::<ProfileUrl>()
                    .map_err(|e| Error::bad_request(e.to_string()))?;
                set.insert("linkedin_url", url.as_str());
            }
        }

        let mut changes = Document::new();
        if !set.is_empty() {
            changes.insert("$set", set);
        }
        if !unset.is_empty() {
            changes.insert("$unset", unset);
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_update_rejected() {
        assert!(ProfileUpdate::default().into_changes().is_err());
    }

    #[test]
    fn sets_linkedin() {
        let update = ProfileUpdate {
            linkedin_url: Some(" https://www.linkedin.com/in/u1 ".into()),
            ..Default::default()
        };
        assert_eq!(
            update.into_changes().unwrap(),
            doc! { "$set": { "linkedin_url": "https://www.linkedin.com/in/u1" } }
        );
    }

    #[test]
    fn blank_linkedin_clears() {
        let update = ProfileUpdate {
            display_name: Some("Una".into()),
            linkedin_url: Some(String::new()),
        };
        assert_eq!(
            update.into_changes().unwrap(),
            doc! { "$set": { "display_name": "Una" }, "$unset": { "linkedin_url": "" } }
        );
    }

    #[test]
    fn malformed_linkedin_rejected() {
        let update = ProfileUpdate {
            linkedin_url: Some("linkedin.com/in/u1".into()),
            ..Default::default()
        };
        assert!(update.into_changes().is_err());
    }
}
