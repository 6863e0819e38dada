use std::net::TcpListener;
use std::sync::Arc;

use musify_auth::auth::PasswordHasher;
use musify_auth::bootstrap;
use musify_auth::configuration::{get_configuration, SeedAdminSettings, Settings, StorageBackend};
use musify_auth::startup::{run, AppState};
use musify_auth::store::{CredentialStore, InMemoryStore, PgStore};
use musify_auth::telemetry::init_telemetry;
use musify_auth::upload_client::{DisabledUploader, ImageUploader, UploadClient};
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
        }
    };

    if let Err(e) = configuration.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(startup_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
    }
    tracing::info!(storage = ?configuration.application.storage, "Configuration loaded successfully");

    let uploader = build_uploader(&configuration)?;
    let hasher = PasswordHasher::new(configuration.password.bcrypt_cost);
    let seed_admin = configuration.bootstrap.seed_admin.as_ref();

    let state = match configuration.application.storage {
        StorageBackend::Postgres => {
            tracing::info!("Attempting to connect to database");

            let pool = PgPoolOptions::new()
                .max_connections(configuration.database.max_connections)
                .connect(&configuration.database.connection_string())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
                })?;

            sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                startup_error(std::io::ErrorKind::Other, "Database migration error")
            })?;
            tracing::info!("Database ready");

            let store = Arc::new(PgStore::new(pool));
            seed(store.as_ref(), &hasher, seed_admin).await?;
            AppState::build(store, &configuration, uploader)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all accounts are lost on restart");

            let store = Arc::new(InMemoryStore::new());
            seed(store.as_ref(), &hasher, seed_admin).await?;
            AppState::build(store, &configuration, uploader)
        }
    };

    let address = format!("{}:{}", configuration.application.host, configuration.application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, state)?;
    server.await
}

fn build_uploader(configuration: &Settings) -> std::io::Result<Arc<dyn ImageUploader>> {
    match &configuration.upload {
        Some(settings) => {
            let client = UploadClient::new(settings).map_err(|e| {
                tracing::error!("Failed to build upload client: {}", e);
                startup_error(std::io::ErrorKind::InvalidInput, "Upload client error")
            })?;
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!("No upload service configured; image uploads will be rejected");
            Ok(Arc::new(DisabledUploader))
        }
    }
}

async fn seed(
    store: &dyn CredentialStore,
    hasher: &PasswordHasher,
    seed_admin: Option<&SeedAdminSettings>,
) -> std::io::Result<()> {
    bootstrap::seed(store, hasher, seed_admin).await.map_err(|e| {
        tracing::error!("Failed to seed roles: {}", e);
        startup_error(std::io::ErrorKind::Other, "Bootstrap error")
    })
}
