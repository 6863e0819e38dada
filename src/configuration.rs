use crate::auth::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::error::ConfigError as SettingsError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub password: PasswordSettings,
    #[serde(default)]
    pub upload: Option<UploadSettings>,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub storage: StorageBackend,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Where users, roles and the token ledger live.
#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local storage, lost on restart. Meant for local runs and tests.
    Memory,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

const MIN_SECRET_LENGTH: usize = 32;

impl JwtSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(SettingsError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(SettingsError::InvalidValue(
                "jwt token expiries must be positive".to_string(),
            ));
        }
        if self.refresh_token_expiry < self.access_token_expiry {
            return Err(SettingsError::InvalidValue(
                "jwt.refresh_token_expiry must not be shorter than jwt.access_token_expiry"
                    .to_string(),
            ));
        }
        if self.issuer.trim().is_empty() {
            return Err(SettingsError::MissingRequired("jwt.issuer".to_string()));
        }
        Ok(())
    }
}

/// Global token bucket in front of the refresh endpoint.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct RateLimitSettings {
    pub capacity: u64,
    pub refill_tokens: u64,
    pub refill_period_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 3,
            refill_tokens: 3,
            refill_period_secs: 30,
        }
    }
}

/// Startup seeding and registration-time privilege grants
#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct BootstrapSettings {
    /// Usernames that receive the administrator role when they register.
    #[serde(default)]
    pub admin_usernames: Vec<String>,
    /// Administrator account created at startup when missing.
    #[serde(default)]
    pub seed_admin: Option<SeedAdminSettings>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct SeedAdminSettings {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    pub bcrypt_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Remote image store (Cloudinary-style unsigned upload endpoint)
#[derive(serde::Deserialize, Clone, Debug)]
pub struct UploadSettings {
    pub base_url: String,
    pub upload_preset: String,
    #[serde(default = "default_upload_timeout")]
    pub timeout_millis: u64,
}

fn default_upload_timeout() -> u64 {
    10_000
}

impl Settings {
    /// Reject settings the service cannot run safely with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.jwt.validate()?;

        let limits = &self.rate_limit;
        if limits.capacity == 0 || limits.refill_tokens == 0 || limits.refill_period_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "rate_limit values must all be positive".to_string(),
            ));
        }

        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.password.bcrypt_cost) {
            return Err(SettingsError::InvalidValue(format!(
                "password.bcrypt_cost must be between {} and {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST
            )));
        }

        Ok(())
    }
}

/// Load settings from `configuration.*` overlaid with `APP__SECTION__KEY` env vars.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
