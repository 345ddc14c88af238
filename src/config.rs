use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings of the upstream OpenID Connect provider users authenticate with.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub database_url: String,
    pub redis_uri: String,

    pub provider: ProviderConfig,

    // EC private keys (PEM). Generated on first start when missing.
    pub signing_key_path: PathBuf,
    pub encryption_key_path: PathBuf,

    // Token lifetimes (seconds)
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,

    pub ledger_sweep_interval: Duration,
    pub shutdown_grace: Duration,

    // Used for discovery documents when running behind a proxy that does not
    // forward Host / X-Forwarded-* headers.
    pub public_base_url: Option<String>,

    // Production only; development allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let database_url = required("DATABASE_URL")?;
        let redis_uri = required("REDIS_URI")?;

        let provider = ProviderConfig {
            issuer: required("OIDC_ISSUER")?,
            client_id: required("OIDC_CLIENT_ID")?,
            client_secret: required("OIDC_CLIENT_SECRET")?,
            redirect_uri: required("OIDC_REDIRECT_URI")?,
        };

        let signing_key_path = env::var("SIGNING_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.certs/signing.pem"));
        let encryption_key_path = env::var("ENCRYPTION_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.certs/encryption.pem"));
        if signing_key_path == encryption_key_path {
            return Err(ConfigError::Invalid("ENCRYPTION_KEY_PATH"));
        }

        let access_token_ttl_seconds = seconds("ACCESS_TOKEN_TTL_SECONDS", 900); // 15 min
        let refresh_token_ttl_seconds = seconds("REFRESH_TOKEN_TTL_SECONDS", 43_200); // 12 h
        let ledger_sweep_interval =
            Duration::from_secs(seconds("LEDGER_SWEEP_INTERVAL_SECONDS", 15).max(1));
        let shutdown_grace = Duration::from_secs(seconds("SHUTDOWN_GRACE_SECONDS", 10));

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            addr,
            app_env,
            database_url,
            redis_uri,
            provider,
            signing_key_path,
            encryption_key_path,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
            ledger_sweep_interval,
            shutdown_grace,
            public_base_url,
            cors_allowed_origins,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    let value = env::var(key).map_err(|_| ConfigError::Missing(key))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(key));
    }
    Ok(value.trim().to_string())
}

fn seconds(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
