use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::vendor_settlement::PayoutMethod;
use crate::services::commission::CommissionCalculator;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DATABASE_URL: &str = "sqlite://marketplace.db?mode=rwc";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_CURRENCY_PRECISION: u32 = 2;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAYOUT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SETTLEMENT_INTERVAL_SECS: u64 = 3600;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Application configuration, layered from defaults, `config/*.toml` and `APP__*` variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Environment name (development, test, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 1000))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// ISO-4217 code applied to new orders and payouts
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// Decimal places money is rounded to when splitting
    #[serde(default = "default_currency_precision")]
    #[validate(range(max = 8))]
    pub currency_precision: u32,

    /// Platform commission applied when a vendor has no rate of its own (0.15 = 15%)
    #[serde(default = "default_commission_rate")]
    #[validate(custom = "validate_commission_rate")]
    pub default_commission_rate: Decimal,

    /// Payout rail used when a vendor has not chosen one
    #[serde(default = "default_payout_method")]
    pub default_payout_method: PayoutMethod,

    /// Base URL of the card/PSP gateway; required outside development and test
    #[serde(default)]
    pub gateway_base_url: Option<String>,

    #[serde(default)]
    pub gateway_api_key: Option<String>,

    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub gateway_timeout_secs: u64,

    #[serde(default = "default_payout_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub payout_timeout_secs: u64,

    /// How often the `settle` command runs a settlement batch
    #[serde(default = "default_settlement_interval_secs")]
    #[validate(range(min = 1))]
    pub settlement_interval_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Configuration with built-in defaults for everything except the database.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_currency: default_currency(),
            currency_precision: default_currency_precision(),
            default_commission_rate: default_commission_rate(),
            default_payout_method: default_payout_method(),
            gateway_base_url: None,
            gateway_api_key: None,
            gateway_timeout_secs: default_gateway_timeout_secs(),
            payout_timeout_secs: default_payout_timeout_secs(),
            settlement_interval_secs: default_settlement_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        matches!(
            self.environment.to_ascii_lowercase().as_str(),
            "development" | "dev" | "local" | "test"
        )
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn payout_timeout(&self) -> Duration {
        Duration::from_secs(self.payout_timeout_secs)
    }

    pub fn settlement_interval(&self) -> Duration {
        Duration::from_secs(self.settlement_interval_secs)
    }

    pub fn commission_calculator(&self) -> CommissionCalculator {
        CommissionCalculator::new(self.default_commission_rate, self.currency_precision)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if !self.is_development() && self.gateway_base_url.is_none() {
            let mut err = ValidationError::new("gateway_base_url_required");
            err.message =
                Some("Set APP__GATEWAY_BASE_URL outside development and test environments".into());
            errors.add("gateway_base_url", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_acquire_timeout_secs() -> u64 {
    30
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_currency_precision() -> u32 {
    DEFAULT_CURRENCY_PRECISION
}

fn default_commission_rate() -> Decimal {
    dec!(0.15)
}

fn default_payout_method() -> PayoutMethod {
    PayoutMethod::BankTransfer
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_payout_timeout_secs() -> u64 {
    DEFAULT_PAYOUT_TIMEOUT_SECS
}

fn default_settlement_interval_secs() -> u64 {
    DEFAULT_SETTLEMENT_INTERVAL_SECS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_commission_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate < Decimal::ZERO || *rate >= Decimal::ONE {
        let mut err = ValidationError::new("commission_rate");
        err.message = Some("Must be a fraction in [0, 1)".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("marketplace_payments={},sea_orm=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    // try_init so repeated initialization from tests is harmless
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads configuration from `config/` for the environment named by `RUN_ENV` (or `APP_ENV`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads configuration from an explicit directory. Missing files are skipped.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", dir.display())).required(false))
        .add_source(File::with_name(&format!("{}/{}", dir.display(), run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new("sqlite::memory:".into(), "test".into())
    }

    #[test]
    fn defaults_validate() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert!(config.validate_additional_constraints().is_ok());
        assert_eq!(config.default_commission_rate, dec!(0.15));
        assert_eq!(config.currency_precision, 2);
        assert_eq!(config.gateway_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn commission_rate_must_be_a_fraction() {
        let mut config = base_config();
        config.default_commission_rate = dec!(15);
        assert!(config.validate().is_err());

        config.default_commission_rate = dec!(-0.01);
        assert!(config.validate().is_err());

        config.default_commission_rate = dec!(1);
        assert!(config.validate().is_err());

        config.default_commission_rate = Decimal::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn production_requires_gateway_url() {
        let mut config = base_config();
        config.environment = "production".into();
        assert!(config.validate_additional_constraints().is_err());

        config.gateway_base_url = Some("https://psp.example.com".into());
        assert!(config.validate_additional_constraints().is_ok());
    }

    #[test]
    fn min_connections_cannot_exceed_max() {
        let mut config = base_config();
        config.db_min_connections = 20;
        config.db_max_connections = 5;
        assert!(config.validate_additional_constraints().is_err());
    }

    #[test]
    fn loads_layered_files() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(
            dir.path().join("default.toml"),
            "database_url = \"sqlite::memory:\"\ndefault_commission_rate = \"0.10\"\n",
        )
        .expect("write default");
        fs::write(
            dir.path().join("test.toml"),
            "default_currency = \"EUR\"\ndefault_payout_method = \"stripe_connect\"\n",
        )
        .expect("write env file");

        let config = load_config_from(dir.path(), "test").expect("config loads");
        assert_eq!(config.environment, "test");
        assert_eq!(config.default_commission_rate, dec!(0.10));
        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.default_payout_method, PayoutMethod::StripeConnect);
    }
}
