use std::env;

use crate::error::HubError;

/// Which `StateStore` / `Bus` adapter pair to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Process configuration, loaded once from the environment at startup.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind_addr: String,
    pub redis_url: Option<String>,
    pub auth_shared_secret: String,
    pub log_level: String,
    pub store_backend: StoreBackend,
}

impl HubConfig {
    pub fn from_env() -> Result<Self, HubError> {
        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("redis") | Err(_) => StoreBackend::Redis,
            Ok(other) => {
                return Err(HubError::Config(format!(
                    "unknown STORE_BACKEND '{other}', expected 'redis' or 'memory'"
                )));
            }
        };

        let redis_url = match store_backend {
            StoreBackend::Redis => Some(env::var("REDIS_URL").map_err(|_| {
                HubError::Config("REDIS_URL is required when STORE_BACKEND=redis".into())
            })?),
            StoreBackend::Memory => None,
        };

        let auth_shared_secret = env::var("AUTH_SHARED_SECRET")
            .map_err(|_| HubError::Config("AUTH_SHARED_SECRET is required".into()))?;

        Ok(HubConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            redis_url,
            auth_shared_secret,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            store_backend,
        })
    }
}
