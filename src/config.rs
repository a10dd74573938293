use std::env;
use std::net::SocketAddr;

/// Runtime configuration, read once at startup from the environment
/// (`.env` files are loaded by `main` via dotenvy before this runs).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Mail-gateway endpoint for status-change notifications. When unset,
    /// notifications stay queued and no dispatcher task is spawned.
    pub notify_sink_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid bind address {0}")]
    InvalidBindAddr(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr))?;

        let notify_sink_url = env::var("NOTIFY_SINK_URL").ok().filter(|s| !s.is_empty());

        Ok(Config {
            database_url,
            bind_addr,
            notify_sink_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_an_error() {
        // Restore the variable afterwards; other tests may read it.
        let saved = env::var("DATABASE_URL").ok();
        env::remove_var("DATABASE_URL");
        assert!(Config::from_env().is_err());
        if let Some(url) = saved {
            env::set_var("DATABASE_URL", url);
        }
    }
}
