#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod voting;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;

/// Assemble the server: routes, catchers, configuration, and the database connection.
pub fn build() -> Rocket<Build> {
    assemble(rocket::build()).attach(DatabaseFairing)
}

/// Everything except the database connection, which differs between the
/// real server and tests.
fn assemble(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(ConfigFairing)
        .attach(LoggerFairing)
        .manage(reqwest::Client::new())
}

/// Connect to the database named in the test configuration.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` must be configured for tests");
    mongodb::Client::with_uri_str(db_uri)
        .await
        .expect("Could not connect to the test database")
}

/// A random database name, so that concurrently running tests do not collide.
#[cfg(test)]
pub(crate) fn database() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// Build a server around an existing database connection.
#[cfg(test)]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    log4rs_test_utils::test_logging::init_logging_once_for(["teamvote_backend"], None, None);

    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create test indexes");
    assemble(rocket::build()).manage(client).manage(db)
}
