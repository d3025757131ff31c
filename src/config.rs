use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::ensure_indexes_exist;

const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const LINKEDIN_USERINFO_URL: &str = "https://api.linkedin.com/v2/userinfo";

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    hostname: String,
    auth_ttl: u32,
    #[serde(default = "default_reset_ttl")]
    reset_ttl: u32,
    #[serde(default = "default_google_userinfo_url")]
    google_userinfo_url: String,
    #[serde(default = "default_linkedin_userinfo_url")]
    linkedin_userinfo_url: String,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

impl Config {
    /// The public base URL of the site.
    /// Used to build password reset links.
    pub fn hostname(&self) -> &str {
        self.hostname.trim_end_matches('/')
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Valid lifetime of password reset tokens in seconds.
    pub fn reset_ttl(&self) -> Duration {
        Duration::seconds(self.reset_ttl.into())
    }

    /// OpenID Connect userinfo endpoint for Google sign-in.
    pub fn google_userinfo_url(&self) -> &str {
        &self.google_userinfo_url
    }

    /// OpenID Connect userinfo endpoint for LinkedIn sign-in.
    pub fn linkedin_userinfo_url(&self) -> &str {
        &self.linkedin_userinfo_url
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign HMACs of password reset tokens.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

fn default_reset_ttl() -> u32 {
    3600
}

fn default_google_userinfo_url() -> String {
    GOOGLE_USERINFO_URL.to_string()
}

fn default_linkedin_userinfo_url() -> String {
    LINKEDIN_USERINFO_URL.to_string()
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(DATABASE_NAME);

        // The vote uniqueness guarantee lives in these indexes, so refuse to
        // start without them.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Name of the production database.
const DATABASE_NAME: &str = "teamvote";
