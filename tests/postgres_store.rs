//! Store tests against a real Postgres, one fresh database per test.
//!
//! Connection details come from `configuration.yaml` and `APP__DATABASE__*`.
//! When no server answers, each test reports it and returns early.

use std::sync::Arc;

use musify_auth::auth::TokenLedger;
use musify_auth::configuration::{get_configuration, DatabaseSettings};
use musify_auth::domain::{NewUser, RoleName};
use musify_auth::error::AppError;
use musify_auth::store::{CredentialStore, PgStore, EMAIL_TAKEN, USERNAME_TAKEN};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

pub async fn configure_database(config: &DatabaseSettings) -> Option<PgPool> {
    let mut connection = match PgConnection::connect(&config.connection_string_without_db()).await {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("Postgres unavailable, skipping: {}", e);
            return None;
        }
    };
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    Some(connection_pool)
}

async fn spawn_store() -> Option<Arc<PgStore>> {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();

    let pool = configure_database(&configuration.database).await?;
    Some(Arc::new(PgStore::new(pool)))
}

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: "$2b$04$not-a-real-hash".to_string(),
        image_url: None,
        roles: vec![RoleName::User],
    }
}

#[tokio::test]
async fn insert_user_round_trips_roles() {
    let Some(store) = spawn_store().await else { return };

    let user = store.insert_user(new_user("alice", "alice@x.com")).await.unwrap();

    let found = store.find_user_by_email("alice@x.com").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.role_names(), vec!["ROLE_USER".to_string()]);
    assert!(store.username_exists("alice").await.unwrap());
    assert!(!store.email_exists("bob@x.com").await.unwrap());
}

#[tokio::test]
async fn insert_user_with_taken_identity_is_duplicate() {
    let Some(store) = spawn_store().await else { return };
    store.insert_user(new_user("alice", "alice@x.com")).await.unwrap();

    let same_username = store.insert_user(new_user("alice", "other@x.com")).await;
    assert!(matches!(same_username, Err(AppError::DuplicateIdentity(msg)) if msg == USERNAME_TAKEN));

    let same_email = store.insert_user(new_user("alicia", "alice@x.com")).await;
    assert!(matches!(same_email, Err(AppError::DuplicateIdentity(msg)) if msg == EMAIL_TAKEN));

    assert!(store.find_user_by_username("alicia").await.unwrap().is_none());
}

#[tokio::test]
async fn update_profile_to_taken_username_is_duplicate() {
    let Some(store) = spawn_store().await else { return };
    store.insert_user(new_user("bob", "bob@x.com")).await.unwrap();
    let alice = store.insert_user(new_user("alice", "alice@x.com")).await.unwrap();

    let result = store.update_profile(alice.id, "bob", None).await;
    assert!(matches!(result, Err(AppError::DuplicateIdentity(msg)) if msg == USERNAME_TAKEN));

    let unchanged = store.find_user_by_id(alice.id).await.unwrap().unwrap();
    assert_eq!(unchanged.username, "alice");
}

#[tokio::test]
async fn concurrent_rotation_leaves_one_valid_entry() {
    let Some(store) = spawn_store().await else { return };
    let user_id = store.insert_user(new_user("alice", "alice@x.com")).await.unwrap().id;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .revoke_all_and_record(user_id, &format!("token-{}", i))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("Rotation task panicked").unwrap();
    }

    let valid = store.list_valid_tokens(user_id).await.unwrap();
    assert_eq!(valid.len(), 1);
}

#[tokio::test]
async fn rotation_for_missing_user_is_not_found() {
    let Some(store) = spawn_store().await else { return };

    let result = store.revoke_all_and_record(Uuid::new_v4(), "token").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn role_change_for_missing_user_is_not_found() {
    let Some(store) = spawn_store().await else { return };

    let granted = store.set_user_role(Uuid::new_v4(), RoleName::Admin, true).await;
    assert!(matches!(granted, Err(AppError::NotFound(_))));

    let withdrawn = store.set_user_role(Uuid::new_v4(), RoleName::User, false).await;
    assert!(matches!(withdrawn, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn role_grant_and_withdraw() {
    let Some(store) = spawn_store().await else { return };
    let alice = store.insert_user(new_user("alice", "alice@x.com")).await.unwrap();

    let granted = store.set_user_role(alice.id, RoleName::Admin, true).await.unwrap();
    assert!(granted.has_role(RoleName::Admin));

    let withdrawn = store.set_user_role(alice.id, RoleName::Admin, false).await.unwrap();
    assert!(!withdrawn.has_role(RoleName::Admin));
}

#[tokio::test]
async fn delete_user_removes_ledger_rows() {
    let Some(store) = spawn_store().await else { return };
    let alice = store.insert_user(new_user("alice", "alice@x.com")).await.unwrap();
    store.record_issued_token(alice.id, "old").await.unwrap();
    store.revoke_all_and_record(alice.id, "new").await.unwrap();

    assert!(store.delete_user(alice.id).await.unwrap());

    assert!(store.find_user_by_id(alice.id).await.unwrap().is_none());
    assert!(store.find_by_token_string("old").await.unwrap().is_none());
    assert!(store.find_by_token_string("new").await.unwrap().is_none());
    assert!(!store.delete_user(alice.id).await.unwrap());
}
