use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// WebSocket keepalive settings
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// How often the server pings each client
    pub heartbeat_interval: Duration,
    /// Drop the connection after this long without a ping/pong
    pub client_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs against the in-process store
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub ws: WsConfig,
}

impl Config {
    fn env_flag(name: &str, default: bool) -> bool {
        env::var(name)
            .ok()
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(default)
    }

    fn env_secs(name: &str, default: u64) -> Result<Duration, AppError> {
        match env::var(name) {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| AppError::Config(format!("{name} must be a positive integer"))),
            Err(_) => Ok(Duration::from_secs(default)),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let run_migrations = Self::env_flag("RUN_MIGRATIONS", true);

        let ws = WsConfig {
            heartbeat_interval: Self::env_secs("WS_HEARTBEAT_INTERVAL_SECS", 5)?,
            client_timeout: Self::env_secs("WS_CLIENT_TIMEOUT_SECS", 30)?,
        };
        if ws.client_timeout <= ws.heartbeat_interval {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must be greater than WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        Ok(Self {
            port,
            database_url,
            run_migrations,
            ws,
        })
    }
}
