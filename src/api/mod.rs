use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::{status_kind, ErrorBody};

pub mod auth;
pub mod teams;
pub mod user;
pub mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(teams::routes());
    routes.extend(user::routes());
    routes.extend(voting::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized, not_found, unprocessable, internal, default_catcher]
}

fn error_body(status: Status, message: &str) -> (Status, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: status_kind(status),
            message: message.to_string(),
            expired: false,
        }),
    )
}

#[catch(401)]
fn unauthorized() -> (Status, Json<ErrorBody>) {
    error_body(Status::Unauthorized, "Not authenticated")
}

#[catch(404)]
fn not_found(req: &Request) -> (Status, Json<ErrorBody>) {
    error_body(Status::NotFound, &format!("Nothing found at {}", req.uri()))
}

#[catch(422)]
fn unprocessable() -> (Status, Json<ErrorBody>) {
    error_body(Status::UnprocessableEntity, "Malformed request body")
}

#[catch(500)]
fn internal() -> (Status, Json<ErrorBody>) {
    error_body(Status::InternalServerError, "Internal server error")
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<ErrorBody>) {
    error_body(status, status.reason().unwrap_or("Request failed"))
}
