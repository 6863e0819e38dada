use actix_web::dev::Server;
use actix_web::{error, middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::account::AccountService;
use crate::auth::{AuthService, PasswordHasher, TokenCodec, TokenLedger};
use crate::configuration::Settings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::rate_limit::RefreshRateLimiter;
use crate::routes::{
    delete_user, grant_role, health_check, login, me, refresh_token, register, update_password,
    update_profile, withdraw_role,
};
use crate::store::CredentialStore;
use crate::upload_client::ImageUploader;

/// Everything the handlers share. Built once per process.
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub accounts: Arc<AccountService>,
    pub limiter: Arc<RefreshRateLimiter>,
}

impl AppState {
    /// Wire the services over one storage backend that holds both users and the ledger.
    pub fn build<S>(store: Arc<S>, settings: &Settings, uploader: Arc<dyn ImageUploader>) -> Self
    where
        S: CredentialStore + TokenLedger + 'static,
    {
        let hasher = PasswordHasher::new(settings.password.bcrypt_cost);

        let auth = AuthService::new(
            store.clone(),
            store.clone(),
            TokenCodec::new(&settings.jwt),
            hasher,
            uploader.clone(),
            settings.bootstrap.admin_usernames.clone(),
        );
        let accounts = AccountService::new(store, hasher, uploader);

        Self {
            auth: Arc::new(auth),
            accounts: Arc::new(accounts),
            limiter: Arc::new(RefreshRateLimiter::new(&settings.rate_limit)),
        }
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let auth = web::Data::from(state.auth);
    let accounts = web::Data::from(state.accounts);
    let limiter = web::Data::from(state.limiter);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(auth.clone())
            .app_data(accounts.clone())
            .app_data(limiter.clone())
            .app_data(json_config())

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh-token", web::post().to(refresh_token))
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware)
                            .route(web::get().to(me)),
                    ),
            )
            // Protected routes (require an access token)
            .service(
                web::scope("/users")
                    .wrap(JwtMiddleware)
                    .route("/me", web::put().to(update_profile))
                    .route("/me/password", web::put().to(update_password))
                    .route("/{id}/roles", web::put().to(grant_role))
                    .route("/{id}/roles", web::delete().to(withdraw_role))
                    .route("/{id}", web::delete().to(delete_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Malformed JSON bodies surface through the same error envelope as everything else.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let app_error = AppError::from(ValidationError::Rejected(format!("Malformed JSON body: {}", err)));
        error::Error::from(app_error)
    })
}
