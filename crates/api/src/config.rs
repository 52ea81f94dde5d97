//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

use posledger_infra::{EngineConfig, TransferMatching};
use posledger_observability::{LogConfig, LogFormat};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Postgres ledger when set; in-memory otherwise.
    pub database_url: Option<String>,
    pub log: LogConfig,
    pub engine: EngineConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and blank variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid("BIND_ADDR", e))?;

        let format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| invalid("LOG_FORMAT", e))?,
            None => LogFormat::default(),
        };

        let mut engine = EngineConfig::default();
        if let Some(raw) = get("DEFAULT_PAGE_SIZE") {
            engine.default_page_size = page_size("DEFAULT_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = get("MAX_PAGE_SIZE") {
            engine.max_page_size = page_size("MAX_PAGE_SIZE", &raw)?;
        }
        if engine.default_page_size > engine.max_page_size {
            return Err(invalid(
                "DEFAULT_PAGE_SIZE",
                format!("exceeds MAX_PAGE_SIZE ({})", engine.max_page_size),
            ));
        }
        if let Some(raw) = get("TRANSFER_MATCHING") {
            engine.transfer_matching = raw
                .parse::<TransferMatching>()
                .map_err(|e| invalid("TRANSFER_MATCHING", e))?;
        }

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            log: LogConfig {
                format,
                filter: get("RUST_LOG"),
            },
            engine,
        })
    }
}

fn page_size(var: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.parse::<u32>() {
        Ok(0) => Err(invalid(var, "must be at least 1")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(var, e)),
    }
}

fn invalid(var: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.engine, EngineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/pos"),
            ("LOG_FORMAT", "pretty"),
            ("DEFAULT_PAGE_SIZE", "20"),
            ("MAX_PAGE_SIZE", "200"),
            ("TRANSFER_MATCHING", "strict"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/pos"));
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.engine.default_page_size, 20);
        assert_eq!(cfg.engine.max_page_size, 200);
        assert_eq!(cfg.engine.transfer_matching, TransferMatching::Strict);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("MAX_PAGE_SIZE", "0")]),
            Err(ConfigError::Invalid { var: "MAX_PAGE_SIZE", .. })
        ));
        assert!(matches!(
            config(&[("DEFAULT_PAGE_SIZE", "500"), ("MAX_PAGE_SIZE", "100")]),
            Err(ConfigError::Invalid { var: "DEFAULT_PAGE_SIZE", .. })
        ));
        assert!(config(&[("LOG_FORMAT", "xml")]).is_err());
        assert!(config(&[("TRANSFER_MATCHING", "fuzzy")]).is_err());
        assert!(config(&[("BIND_ADDR", "not-an-addr")]).is_err());
    }
}
