pub mod config;

use std::{env, net::SocketAddr};

pub use config::{AppConfig, ConfigError, Environment};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5555";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://app.db";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Returns the address the HTTP server should bind to.
///
/// The value is resolved from the `APP_BIND_ADDR` environment variable and
/// falls back to [`DEFAULT_BIND_ADDR`] when the variable is not set.
pub fn server_bind_address() -> Result<SocketAddr, std::net::AddrParseError> {
    let value = env::var("APP_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    value.parse()
}

/// Returns the SQLite connection string.
///
/// `APP_DATABASE_URL` wins over the legacy `DB_URI` variable; when neither is
/// set [`DEFAULT_DATABASE_URL`] is used.
pub fn database_url() -> String {
    env::var("APP_DATABASE_URL")
        .or_else(|_| env::var("DB_URI"))
        .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}
