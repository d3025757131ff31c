use chrono::Utc;
use data_encoding::HEXLOWER;
use mongodb::bson::{doc, Bson};
use rand::Rng;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{
                AuthToken, Credentials, ForgotRequest, OAuthRequest, OrganizerSignupRequest,
                Provider, ResetRequest, SignupRequest, AUTH_TOKEN_COOKIE,
            },
            profile::ProfileDescription,
        },
        db::{NewUser, PasswordReset, User},
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    voting::reconcile_profile,
    Config,
};

/// Length in bytes of a password reset token.
const RESET_TOKEN_BYTES: usize = 20;

pub fn routes() -> Vec<Route> {
    routes![
        signup,
        organizer_signup,
        login,
        oauth,
        logout,
        forgot_password,
        reset_password
    ]
}

/// Insert a freshly signed-up user, refusing duplicate emails.
async fn insert_user(user: NewUser, new_users: &Coll<NewUser>) -> Result<User> {
    let id: Id = match new_users.insert_one(&user, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB
            .into(),
        Err(e) if is_duplicate_key_error(&e) => {
            return Err(Error::Status(
                Status::Conflict,
                format!("An account for {} already exists", user.email),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    info!("New {} account for {}", user.role, user.email);
    Ok(User { id, user })
}

#[post("/auth/signup", data = "<request>", format = "json")]
pub async fn signup(
    cookies: &CookieJar<'_>,
    request: Json<SignupRequest>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
) -> Result<Json<ProfileDescription>> {
    let user = insert_user(request.0.into_user()?, &new_users).await?;
    cookies.add(AuthToken::new(&user).into_cookie(config));
    Ok(Json(user.into()))
}

#[post("/auth/organizer/signup", data = "<request>", format = "json")]
pub async fn organizer_signup(
    cookies: &CookieJar<'_>,
    request: Json<OrganizerSignupRequest>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
) -> Result<Json<ProfileDescription>> {
    let user = insert_user(request.0.into_user()?, &new_users).await?;
    cookies.add(AuthToken::new(&user).into_cookie(config));
    Ok(Json(user.into()))
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<Credentials>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<ProfileDescription>> {
    let with_email = doc! {
        "email": credentials.email.as_str(),
    };

    let user = users
        .find_one(with_email, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No account found with the provided email and password combination.".to_string(),
            )
        })?;

    cookies.add(AuthToken::new(&user).into_cookie(config));
    Ok(Json(user.into()))
}

#[post("/auth/oauth/<provider>", data = "<request>", format = "json")]
pub async fn oauth(
    provider: Provider,
    cookies: &CookieJar<'_>,
    request: Json<OAuthRequest>,
    users: Coll<User>,
    http: &State<reqwest::Client>,
    config: &State<Config>,
) -> Result<Json<ProfileDescription>> {
    let identity = request.0.verify(provider, http, config).await?;
    let user = reconcile_profile(&identity, &users, Utc::now()).await?;
    info!("{} signed in with {provider}", user.email);

    cookies.add(AuthToken::new(&user).into_cookie(config));
    Ok(Json(user.into()))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

/// Start a password reset. Always succeeds, so that callers cannot probe
/// which emails have accounts.
#[post("/auth/forgot", data = "<request>", format = "json")]
pub async fn forgot_password(
    request: Json<ForgotRequest>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<()> {
    let with_email = doc! {
        "email": request.email.as_str(),
    };
    let Some(user) = users.find_one(with_email, None).await? else {
        debug!("Password reset requested for unknown email {}", request.email);
        return Ok(());
    };
    if user.password_hash.is_none() {
        debug!("Password reset requested for passwordless account {}", user.email);
        return Ok(());
    }

    let mut raw = [0_u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill(&mut raw);
    let token = HEXLOWER.encode(&raw);
    let reset = PasswordReset {
        token_hmac: PasswordReset::hmac_token(&token, config),
        expires_at: Utc::now() + config.reset_ttl(),
    };

    let update = doc! {
        "$set": {
            "password_reset": {
                "token_hmac": &reset.token_hmac,
                "expires_at": Bson::DateTime(reset.expires_at.into()),
            }
        }
    };
    users.update_one(user.id.as_doc(), update, None).await?;

    // Email delivery is not wired up; the link goes to the log instead.
    info!(
        "Password reset link for {}: {}/reset/{token}",
        user.email,
        config.hostname()
    );
    Ok(())
}

#[post("/auth/reset", data = "<request>", format = "json")]
pub async fn reset_password(
    request: Json<ResetRequest>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<()> {
    let token_hmac = PasswordReset::hmac_token(request.token.trim(), config);
    let pending = doc! {
        "password_reset.token_hmac": &token_hmac,
        "password_reset.expires_at": { "$gt": Bson::DateTime(Utc::now().into()) },
    };
    let user = users.find_one(pending, None).await?.ok_or_else(|| {
        Error::bad_request("This password reset link is invalid or has expired")
    })?;

    let password_hash = request.new_password_hash()?;
    let filter = doc! {
        "_id": user.id,
        "password_reset.token_hmac": &token_hmac,
    };
    let update = doc! {
        "$set": { "password_hash": password_hash },
        "$unset": { "password_reset": "" },
    };
    let result = users.update_one(filter, update, None).await?;
    if result.modified_count == 0 {
        // Someone else used the token first.
        return Err(Error::bad_request(
            "This password reset link is invalid or has expired",
        ));
    }
    info!("Password reset completed for {}", user.email);
    Ok(())
}
