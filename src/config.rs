use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
pub const GOOGLE_MAPS_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Secret used to verify HS256 bearer tokens
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Lifetime of issued tokens in seconds
    #[serde(default = "default_jwt_expiration_secs")]
    pub jwt_expiration_secs: i64,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    // ========== Maps provider ==========
    /// Google Maps API key; tracking features fail with an external service
    /// error while it is unset
    #[serde(default)]
    pub google_maps_api_key: Option<String>,

    #[serde(default = "default_maps_base_url")]
    pub maps_base_url: String,

    #[serde(default = "default_maps_request_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub maps_request_timeout_secs: u64,

    #[serde(default = "default_maps_language")]
    pub maps_language: String,

    // ========== Delivery tracking ==========
    /// Distance (km) at or below which the customer gets a near-delivery notice
    #[serde(default = "default_near_delivery_distance_km")]
    #[validate(custom = "validate_positive_f64")]
    pub near_delivery_distance_km: f64,

    /// Average courier speed used for ETA estimates
    #[serde(default = "default_average_speed_kmh")]
    #[validate(custom = "validate_positive_f64")]
    pub average_speed_kmh: f64,

    /// Suggested interval between courier location pings
    #[serde(default = "default_tracking_update_interval_secs")]
    pub tracking_update_interval_secs: u64,

    // ========== Checkout pricing ==========
    #[serde(default = "default_flat_shipping_cost")]
    #[validate(range(min = 0))]
    pub flat_shipping_cost: i64,

    /// Orders with a subtotal at or above this ship for free
    #[serde(default = "default_free_shipping_threshold")]
    #[validate(range(min = 0))]
    pub free_shipping_threshold: i64,

    /// Tax rate (as decimal, e.g., 0.19 for 19%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub tax_rate: f64,

    /// Upper bound on order-number collision retries during checkout
    #[serde(default = "default_order_number_max_attempts")]
    #[validate(range(min = 1, max = 1000))]
    pub order_number_max_attempts: u32,

    // ========== Guest carts ==========
    /// Idle time after which a guest cart is dropped and its stock released
    #[serde(default = "default_guest_cart_ttl_secs")]
    #[validate(range(min = 60))]
    pub guest_cart_ttl_secs: u64,

    #[serde(default = "default_guest_cart_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub guest_cart_sweep_interval_secs: u64,
}

impl AppConfig {
    /// Creates a configuration with every optional setting at its default.
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration_secs: default_jwt_expiration_secs(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            google_maps_api_key: None,
            maps_base_url: default_maps_base_url(),
            maps_request_timeout_secs: default_maps_request_timeout_secs(),
            maps_language: default_maps_language(),
            near_delivery_distance_km: default_near_delivery_distance_km(),
            average_speed_kmh: default_average_speed_kmh(),
            tracking_update_interval_secs: default_tracking_update_interval_secs(),
            flat_shipping_cost: default_flat_shipping_cost(),
            free_shipping_threshold: default_free_shipping_threshold(),
            tax_rate: default_tax_rate(),
            order_number_max_attempts: default_order_number_max_attempts(),
            guest_cart_ttl_secs: default_guest_cart_ttl_secs(),
            guest_cart_sweep_interval_secs: default_guest_cart_sweep_interval_secs(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Parsed CORS origins; empty means permissive in development only.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn maps_request_timeout(&self) -> Duration {
        Duration::from_secs(self.maps_request_timeout_secs)
    }

    pub fn guest_cart_ttl(&self) -> Duration {
        Duration::from_secs(self.guest_cart_ttl_secs)
    }

    pub fn guest_cart_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.guest_cart_sweep_interval_secs)
    }

    pub fn tax_rate_decimal(&self) -> Decimal {
        Decimal::from_f64(self.tax_rate).unwrap_or_default()
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

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_jwt_expiration_secs() -> i64 {
    3600
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
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_maps_base_url() -> String {
    GOOGLE_MAPS_BASE_URL.to_string()
}

fn default_maps_request_timeout_secs() -> u64 {
    10
}

fn default_maps_language() -> String {
    "es".to_string()
}

fn default_near_delivery_distance_km() -> f64 {
    1.0
}

fn default_average_speed_kmh() -> f64 {
    30.0
}

fn default_tracking_update_interval_secs() -> u64 {
    30
}

fn default_flat_shipping_cost() -> i64 {
    15_000
}

fn default_free_shipping_threshold() -> i64 {
    200_000
}

fn default_tax_rate() -> f64 {
    0.19
}

fn default_order_number_max_attempts() -> u32 {
    10
}

fn default_guest_cart_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_guest_cart_sweep_interval_secs() -> u64 {
    300
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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 32 characters".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    Ok(())
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_positive_f64(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        let mut err = ValidationError::new("positive");
        err.message = Some("must be a finite value greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("ferrejunior={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same layering as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    // jwt_secret has no default and must come from a file or APP__JWT_SECRET.
    let config = Config::builder()
        .set_default("database_url", "sqlite://ferrejunior.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a random string of at least 32 characters.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
