//! Integration tests for registration, login and token refresh

mod common;

use common::{spawn_app, ADMIN_USERNAME};
use musify_auth::auth::{TokenCodec, TokenKind, TokenLedger};
use musify_auth::store::CredentialStore;
use uuid::Uuid;

#[tokio::test]
async fn register_returns_201_with_message() {
    let app = spawn_app();

    let response = app.register("alice", "alice@x.com", "pw123").await;

    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Successfully registered!");

    let user = app.store.find_user_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.role_names(), vec!["ROLE_USER".to_string()]);
    // Registration does not log the user in.
    assert!(app.store.tokens_for(user.id).is_empty());
}

#[tokio::test]
async fn register_stores_uploaded_image_url() {
    let app = spawn_app();

    let response = app
        .register_with_image("alice", "alice@x.com", "pw123", Some(vec![7u8; 32]))
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let user = app.store.find_user_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.image_url.as_deref(), Some("https://img.test/albums/users/32.png"));
}

#[tokio::test]
async fn register_returns_409_for_taken_username_or_email() {
    let app = spawn_app();
    app.register("alice", "alice@x.com", "pw123").await;

    let same_username = app.register("alice", "other@x.com", "pw123").await;
    assert_eq!(same_username.status().as_u16(), 409);
    let body: serde_json::Value = same_username.json().await.unwrap();
    assert_eq!(body["message"], "Username already exists.");

    let same_email = app.register("alice2", "alice@x.com", "pw123").await;
    assert_eq!(same_email.status().as_u16(), 409);
    let body: serde_json::Value = same_email.json().await.unwrap();
    assert_eq!(body["message"], "Email is already in use.");

    assert_eq!(app.store.user_count(), 1);
}

#[tokio::test]
async fn register_returns_400_for_invalid_fields() {
    let app = spawn_app();

    let test_cases = vec![
        ("al", "alice@x.com", "pw123", "short username"),
        ("alice", "not-an-email", "pw123", "invalid email"),
        ("alice", "alice@x.com", "pw", "short password"),
    ];

    for (username, email, password, description) in test_cases {
        let response = app.register(username, email, password).await;
        assert_eq!(
            response.status().as_u16(),
            400,
            "Expected 400 for {}",
            description
        );
    }
    assert_eq!(app.store.user_count(), 0);
}

#[tokio::test]
async fn register_returns_400_without_user_part() {
    let app = spawn_app();

    let form = reqwest::multipart::Form::new()
        .part("image", reqwest::multipart::Part::bytes(vec![1, 2, 3]).file_name("a.png"));
    let response = app
        .client
        .post(&format!("{}/auth/register", app.address))
        .multipart(form)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn allow_listed_username_registers_as_admin() {
    let app = spawn_app();

    let body = app.signed_in(ADMIN_USERNAME, "reze@csm.com", "mgla").await;

    assert_eq!(body["roles"], serde_json::json!(["ROLE_USER", "ROLE_ADMIN"]));
}

#[tokio::test]
async fn login_returns_tokens_and_profile() {
    let app = spawn_app();
    app.register("alice", "alice@x.com", "pw123").await;

    let response = app.login("alice@x.com", "pw123").await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["accessToken"].as_str().map_or(false, |t| !t.is_empty()));
    assert!(body["refreshToken"].as_str().map_or(false, |t| !t.is_empty()));
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@x.com");
    assert!(body["imageUrl"].is_null());
    assert_eq!(body["roles"], serde_json::json!(["ROLE_USER"]));

    let user_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let valid = app.store.list_valid_tokens(user_id).await.unwrap();
    assert_eq!(valid.len(), 1);
    assert!(valid[0].matches(body["refreshToken"].as_str().unwrap()));
}

#[tokio::test]
async fn login_returns_401_for_bad_credentials() {
    let app = spawn_app();
    app.register("alice", "alice@x.com", "pw123").await;

    let wrong_password = app.login("alice@x.com", "wrong").await;
    let unknown_email = app.login("nobody@x.com", "pw123").await;

    assert_eq!(wrong_password.status().as_u16(), 401);
    assert_eq!(unknown_email.status().as_u16(), 401);

    let a: serde_json::Value = wrong_password.json().await.unwrap();
    let b: serde_json::Value = unknown_email.json().await.unwrap();
    assert_eq!(a["message"], b["message"]);
    assert_eq!(a["code"], b["code"]);
}

#[tokio::test]
async fn login_returns_400_for_malformed_json() {
    let app = spawn_app();

    let response = app
        .client
        .post(&format!("{}/auth/login", app.address))
        .header("Content-Type", "application/json")
        .body("{\"email\": ")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn second_login_revokes_first_refresh_token() {
    let app = spawn_app();
    let first = app.signed_in("alice", "alice@x.com", "pw123").await;

    let second: serde_json::Value = app.login("alice@x.com", "pw123").await.json().await.unwrap();

    let old = app
        .store
        .find_by_token_string(first["refreshToken"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(old.expired && old.revoked);

    let user_id: Uuid = second["id"].as_str().unwrap().parse().unwrap();
    let valid = app.store.list_valid_tokens(user_id).await.unwrap();
    assert_eq!(valid.len(), 1);
    assert!(valid[0].matches(second["refreshToken"].as_str().unwrap()));
}

#[tokio::test]
async fn refresh_returns_new_access_token_and_same_refresh_token() {
    let app = spawn_app();
    let login = app.signed_in("alice", "alice@x.com", "pw123").await;
    let refresh_token = login["refreshToken"].as_str().unwrap();

    let response = app.refresh(Some(refresh_token)).await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response
            .headers()
            .get("X-Rate-Limit-Remaining")
            .and_then(|h| h.to_str().ok()),
        Some("2")
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["refreshToken"], refresh_token);
    assert_ne!(body["accessToken"], login["accessToken"]);

    let user_id: Uuid = login["id"].as_str().unwrap().parse().unwrap();
    let valid = app.store.list_valid_tokens(user_id).await.unwrap();
    assert_eq!(valid.len(), 1);
    assert!(valid[0].matches(body["accessToken"].as_str().unwrap()));
}

#[tokio::test]
async fn refresh_without_bearer_returns_empty_200() {
    let app = spawn_app();

    let response = app.refresh(None).await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_with_undecodable_token_returns_404() {
    let app = spawn_app();

    let response = app.refresh(Some("garbage")).await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn refresh_with_expired_token_returns_403() {
    let app = spawn_app();
    app.signed_in("alice", "alice@x.com", "pw123").await;

    let codec = TokenCodec::new(&app.settings.jwt);
    let expired = codec
        .issue("alice@x.com", vec!["ROLE_USER".to_string()], TokenKind::Refresh, 0)
        .unwrap();

    let response = app.refresh(Some(&expired)).await;

    assert_eq!(response.status().as_u16(), 403);
    // The rejected token is not echoed back.
    assert!(!response.text().await.unwrap().contains(&expired));
}

#[tokio::test]
async fn refresh_is_rate_limited_globally() {
    let app = spawn_app();

    for _ in 0..3 {
        assert_eq!(app.refresh(None).await.status().as_u16(), 200);
    }

    let response = app.refresh(None).await;
    assert_eq!(response.status().as_u16(), 429);

    let retry_ms: u64 = response
        .headers()
        .get("X-Rate-Limit-Retry-After-Milliseconds")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.parse().ok())
        .expect("retry header present");
    assert!(retry_ms > 0 && retry_ms <= 10_000);
    assert!(response.headers().get("Retry-After").is_some());
}

#[tokio::test]
async fn me_requires_access_token() {
    let app = spawn_app();
    let login = app.signed_in("alice", "alice@x.com", "pw123").await;

    let anonymous = app
        .client
        .get(&format!("{}/auth/me", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(anonymous.status().as_u16(), 401);

    // Refresh tokens do not authenticate ordinary requests.
    let with_refresh = app
        .client
        .get(&format!("{}/auth/me", app.address))
        .bearer_auth(login["refreshToken"].as_str().unwrap())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(with_refresh.status().as_u16(), 401);

    let response = app
        .client
        .get(&format!("{}/auth/me", app.address))
        .bearer_auth(login["accessToken"].as_str().unwrap())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["username"], "alice");
    assert!(body.get("passwordHash").is_none());
}
