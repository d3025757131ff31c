use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    logging::RequestIdentity,
    model::{
        common::{Email, Role},
        db::User,
        mongodb::{Coll, Id},
    },
    Config,
};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token naming a specific user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: Id,
    pub email: Email,
    #[serde(rename = "rgt")]
    pub role: Role,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given user.
    pub fn new(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }

    #[allow(clippy::missing_panics_doc)]
    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize a token from a cookie, checking its signature and expiry.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and check that its user still exists.
    ///
    /// Fails with [`Error::Unauthenticated`] if there is no valid token, so
    /// handlers that take `Result<AuthToken, Error>` can decide for themselves.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) else {
            return Outcome::Failure((Status::Unauthorized, Error::Unauthenticated));
        };

        let token = match Self::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(e) => {
                debug!("Rejecting auth token: {e}");
                return Outcome::Failure((Status::Unauthorized, Error::Unauthenticated));
            }
        };

        // The account may have been removed since the token was issued.
        let db = req.guard::<&State<mongodb::Database>>().await.unwrap();
        match Coll::<User>::from_db(db)
            .find_one(token.id.as_doc(), None)
            .await
        {
            Ok(Some(_)) => {
                RequestIdentity::record(req, &token.email);
                Outcome::Success(token)
            }
            Ok(None) => Outcome::Failure((Status::Unauthorized, Error::Unauthenticated)),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}
