//! Configuration module for receivables-service.

use crate::services::allocator::OverpaymentPolicy;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReceivablesConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// No URL means catalog calls are skipped.
    pub url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub overpayment_policy: OverpaymentPolicy,
    pub cache_enabled: bool,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ReceivablesConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let overpayment_policy = match env::var("OVERPAYMENT_POLICY") {
            Ok(raw) => raw
                .parse::<OverpaymentPolicy>()
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
            Err(_) => OverpaymentPolicy::default(),
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "receivables-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: Secret::new(env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parsed("DATABASE_MIN_CONNECTIONS", 2),
            },
            catalog: CatalogConfig {
                url: env::var("CATALOG_SERVICE_URL").ok().filter(|s| !s.is_empty()),
                timeout: Duration::from_secs(parsed("CATALOG_TIMEOUT_SECS", 5)),
            },
            ledger: LedgerConfig {
                overpayment_policy,
                cache_enabled: parsed("RECEIVABLE_CACHE_ENABLED", false),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_requires_database_url() {
        env::remove_var("DATABASE_URL");
        assert!(matches!(
            ReceivablesConfig::from_env(),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        env::set_var("DATABASE_URL", "postgres://localhost/receivables");
        env::remove_var("OVERPAYMENT_POLICY");
        env::remove_var("CATALOG_SERVICE_URL");
        env::remove_var("RECEIVABLE_CACHE_ENABLED");

        let config = ReceivablesConfig::from_env().unwrap();
        assert_eq!(config.database.url.expose_secret(), "postgres://localhost/receivables");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.ledger.overpayment_policy, OverpaymentPolicy::Report);
        assert!(!config.ledger.cache_enabled);
        assert!(config.catalog.url.is_none());
        assert_eq!(config.catalog.timeout, Duration::from_secs(5));

        env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_policy() {
        env::set_var("DATABASE_URL", "postgres://localhost/receivables");
        env::set_var("OVERPAYMENT_POLICY", "donate");

        assert!(ReceivablesConfig::from_env().is_err());

        env::remove_var("OVERPAYMENT_POLICY");
        env::remove_var("DATABASE_URL");
    }
}
