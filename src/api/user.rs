use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            profile::{ProfileDescription, ProfileUpdate},
        },
        db::User,
        mongodb::Coll,
    },
    voting::update_profile,
};

pub fn routes() -> Vec<Route> {
    routes![get_profile, put_profile]
}

#[get("/user/profile")]
pub async fn get_profile(token: AuthToken, users: Coll<User>) -> Result<Json<ProfileDescription>> {
    let user = users
        .find_one(token.id.as_doc(), None)
        .await?
        .ok_or(Error::Unauthenticated)?;
    Ok(Json(user.into()))
}

#[put("/user/profile", data = "<update>", format = "json")]
pub async fn put_profile(
    token: AuthToken,
    update: Json<ProfileUpdate>,
    users: Coll<User>,
) -> Result<Json<ProfileDescription>> {
    let user = update_profile(token.id, update.0, &users).await?;
    info!("{} updated their profile", user.email);
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::{self, json},
    };

    use super::*;

    async fn put(client: &Client, body: serde_json::Value) -> Status {
        client
            .put(uri!(put_profile))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
            .status()
    }

    async fn profile(client: &Client) -> ProfileDescription {
        let response = client.get(uri!(get_profile)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    #[backend_test(voter)]
    async fn get_own_profile(client: Client) {
        let profile = profile(&client).await;
        assert_eq!(profile.email, "u1@example.com");
        assert_eq!(profile.display_name, "Una Voter");
        assert_eq!(profile.role, "voter");
        assert_eq!(profile.linkedin_url, None);
    }

    #[backend_test]
    async fn profile_needs_auth(client: Client) {
        let response = client.get(uri!(get_profile)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(Status::Unauthorized, put(&client, json!({ "displayName": "X" })).await);
    }

    #[backend_test(voter)]
    async fn edit_profile(client: Client) {
        assert_eq!(Status::BadRequest, put(&client, json!({})).await);
        assert_eq!(
            Status::BadRequest,
            put(&client, json!({ "linkedinUrl": "not a url" })).await
        );

        let update = json!({
            "displayName": "Una V.",
            "linkedinUrl": "https://www.linkedin.com/in/u1",
        });
        assert_eq!(Status::Ok, put(&client, update).await);
        let updated = profile(&client).await;
        assert_eq!(updated.display_name, "Una V.");
        assert_eq!(
            updated.linkedin_url.as_deref(),
            Some("https://www.linkedin.com/in/u1")
        );

        // A blank URL clears it again.
        assert_eq!(Status::Ok, put(&client, json!({ "linkedinUrl": "" })).await);
        assert_eq!(profile(&client).await.linkedin_url, None);
    }
}
