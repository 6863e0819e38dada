//! Shared harness: spawns the server on a random port over in-memory storage.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::TcpListener;
use std::sync::Arc;

use musify_auth::auth::MIN_BCRYPT_COST;
use musify_auth::configuration::{
    ApplicationSettings, BootstrapSettings, DatabaseSettings, JwtSettings, PasswordSettings,
    RateLimitSettings, Settings, StorageBackend,
};
use musify_auth::error::AppError;
use musify_auth::startup::{run, AppState};
use musify_auth::store::InMemoryStore;
use musify_auth::upload_client::{ImageCategory, ImageUploader};

pub const ADMIN_USERNAME: &str = "reze";

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryStore>,
    pub settings: Settings,
    pub client: reqwest::Client,
}

/// Echoes a deterministic URL instead of talking to a real image store.
pub struct FakeUploader;

#[async_trait]
impl ImageUploader for FakeUploader {
    async fn upload_image(&self, bytes: Vec<u8>, category: ImageCategory) -> Result<String, AppError> {
        Ok(format!("https://img.test{}/{}.png", category.folder(), bytes.len()))
    }
}

pub fn test_settings() -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "musify".to_string(),
            max_connections: 1,
        },
        application: ApplicationSettings {
            port: 0,
            host: "127.0.0.1".to_string(),
            storage: StorageBackend::Memory,
        },
        jwt: JwtSettings {
            secret: "integration-test-secret-at-least-32-bytes".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "musify-test".to_string(),
        },
        rate_limit: RateLimitSettings::default(),
        bootstrap: BootstrapSettings {
            admin_usernames: vec![ADMIN_USERNAME.to_string()],
            seed_admin: None,
        },
        password: PasswordSettings {
            bcrypt_cost: MIN_BCRYPT_COST,
        },
        upload: None,
    }
}

pub fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let settings = test_settings();
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::build(store.clone(), &settings, Arc::new(FakeUploader));

    let server = run(listener, state).expect("Failed to create server");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        settings,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub async fn register(&self, username: &str, email: &str, password: &str) -> reqwest::Response {
        self.register_with_image(username, email, password, None).await
    }

    pub async fn register_with_image(
        &self,
        username: &str,
        email: &str,
        password: &str,
        image: Option<Vec<u8>>,
    ) -> reqwest::Response {
        let user = serde_json::json!({
            "username": username,
            "email": email,
            "password": password
        });
        let mut form = reqwest::multipart::Form::new().part(
            "user",
            reqwest::multipart::Part::text(user.to_string())
                .mime_str("application/json")
                .unwrap(),
        );
        if let Some(bytes) = image {
            form = form.part("image", reqwest::multipart::Part::bytes(bytes).file_name("avatar.png"));
        }

        self.client
            .post(&format!("{}/auth/register", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(&format!("{}/auth/login", self.address))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Register then log in, returning the login body.
    pub async fn signed_in(&self, username: &str, email: &str, password: &str) -> serde_json::Value {
        assert_eq!(self.register(username, email, password).await.status().as_u16(), 201);
        let response = self.login(email, password).await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }

    pub async fn refresh(&self, bearer: Option<&str>) -> reqwest::Response {
        let mut request = self.client.post(&format!("{}/auth/refresh-token", self.address));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }
}
