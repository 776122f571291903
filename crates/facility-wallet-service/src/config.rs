//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use facility_wallet_core::PriceDefaults;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Default Paystack API base URL.
pub const PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/facility-wallet").
    pub data_dir: String,

    /// PostgreSQL URL. When set, PostgreSQL is used instead of `RocksDB`.
    pub database_url: Option<String>,

    /// JWT issuer base URL, also used to locate the JWKS.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "facility-wallet").
    pub auth_audience: String,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Paystack secret key (optional; top-ups are unavailable without it).
    pub paystack_secret_key: Option<String>,

    /// Paystack webhook secret. Paystack signs with the secret key, which is
    /// used when this is unset.
    pub paystack_webhook_secret: Option<String>,

    /// Paystack API base URL.
    pub paystack_base_url: String,

    /// Where Paystack redirects the payer after checkout.
    pub topup_callback_url: Option<String>,

    /// Wallet currency (default: "GHS").
    pub currency: String,

    /// Smallest accepted top-up, inclusive.
    pub topup_min_amount: Decimal,

    /// Largest accepted top-up, inclusive.
    pub topup_max_amount: Decimal,

    /// Prices used when no active pricing row exists.
    pub price_defaults: PriceDefaults,

    /// Row lock wait before a mutation gives up, in milliseconds.
    pub lock_timeout_ms: u64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Paystack secrets file structure.
#[derive(Debug, Deserialize)]
struct PaystackSecrets {
    secret_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (paystack_secret_key, paystack_webhook_secret) = load_paystack_secrets();
        let currency = std::env::var("WALLET_CURRENCY")
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or(defaults.currency);

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            auth_base_url: std::env::var("AUTH_BASE_URL").unwrap_or(defaults.auth_base_url),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            paystack_secret_key,
            paystack_webhook_secret,
            paystack_base_url: std::env::var("PAYSTACK_BASE_URL")
                .unwrap_or(defaults.paystack_base_url),
            topup_callback_url: std::env::var("TOPUP_CALLBACK_URL").ok(),
            topup_min_amount: env_or("TOPUP_MIN_AMOUNT", defaults.topup_min_amount),
            topup_max_amount: env_or("TOPUP_MAX_AMOUNT", defaults.topup_max_amount),
            price_defaults: PriceDefaults {
                standard: env_or("STANDARD_ANALYSIS_PRICE", defaults.price_defaults.standard),
                image: env_or("IMAGE_ANALYSIS_PRICE", defaults.price_defaults.image),
                currency: currency.clone(),
            },
            currency,
            lock_timeout_ms: env_or("LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        }
    }

    /// The secret used to check webhook signatures, if any.
    #[must_use]
    pub fn webhook_secret(&self) -> Option<&str> {
        self.paystack_webhook_secret
            .as_deref()
            .or(self.paystack_secret_key.as_deref())
    }

    /// Reject settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Currency(self.currency.clone()));
        }
        if self.topup_min_amount <= Decimal::ZERO {
            return Err(ConfigError::TopUpMinimum(self.topup_min_amount));
        }
        if self.topup_min_amount > self.topup_max_amount {
            return Err(ConfigError::TopUpBounds {
                min: self.topup_min_amount,
                max: self.topup_max_amount,
            });
        }
        for (name, price) in [
            ("STANDARD_ANALYSIS_PRICE", self.price_defaults.standard),
            ("IMAGE_ANALYSIS_PRICE", self.price_defaults.image),
        ] {
            if price <= Decimal::ZERO || price.scale() > 2 {
                return Err(ConfigError::Price { name, price });
            }
        }
        Ok(())
    }
}

/// Invalid service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `WALLET_CURRENCY` is not a three-letter code.
    #[error("WALLET_CURRENCY must be a three-letter code, got {0:?}")]
    Currency(String),

    /// `TOPUP_MIN_AMOUNT` is zero or negative.
    #[error("TOPUP_MIN_AMOUNT must be positive, got {0}")]
    TopUpMinimum(Decimal),

    /// The top-up bounds are inverted.
    #[error("TOPUP_MIN_AMOUNT ({min}) exceeds TOPUP_MAX_AMOUNT ({max})")]
    TopUpBounds { min: Decimal, max: Decimal },

    /// A default price is not a positive amount with at most two decimals.
    #[error("{name} must be a positive amount with at most two decimals, got {price}")]
    Price { name: &'static str, price: Decimal },
}

/// Parse an environment variable, falling back to `default` when it is
/// missing or malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = %name, value = %raw, "Ignoring malformed setting");
            default
        }),
        Err(_) => default,
    }
}

/// Load Paystack secrets from file or environment.
fn load_paystack_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/paystack.json", "../.secrets/paystack.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<PaystackSecrets>(path) {
            tracing::info!(path = %path, "Loaded Paystack secrets from file");
            return (Some(secrets.secret_key), secrets.webhook_secret);
        }
    }

    tracing::debug!("Paystack secrets file not found, using environment variables");
    (
        std::env::var("PAYSTACK_SECRET_KEY").ok(),
        std::env::var("PAYSTACK_WEBHOOK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/facility-wallet".into(),
            database_url: None,
            auth_base_url: "http://localhost:9000".into(),
            auth_audience: "facility-wallet".into(),
            admin_api_key: None,
            paystack_secret_key: None,
            paystack_webhook_secret: None,
            paystack_base_url: PAYSTACK_BASE_URL.into(),
            topup_callback_url: None,
            currency: "GHS".into(),
            topup_min_amount: Decimal::new(500, 2),
            topup_max_amount: Decimal::new(1_000_000, 2),
            price_defaults: PriceDefaults::default(),
            lock_timeout_ms: 2_000,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.currency, "GHS");
        assert_eq!(config.topup_min_amount, dec!(5.00));
        assert_eq!(config.topup_max_amount, dec!(10000.00));
        assert_eq!(config.price_defaults.standard, dec!(5.00));
        assert_eq!(config.lock_timeout_ms, 2_000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_top_up_bounds_are_rejected() {
        let config = ServiceConfig {
            topup_min_amount: dec!(500),
            topup_max_amount: dec!(100),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TopUpBounds { .. })
        ));
    }

    #[test]
    fn non_positive_minimum_is_rejected() {
        for min in [dec!(0), dec!(-5)] {
            let config = ServiceConfig {
                topup_min_amount: min,
                ..ServiceConfig::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::TopUpMinimum(_))));
        }
    }

    #[test]
    fn bad_currency_and_prices_are_rejected() {
        let config = ServiceConfig {
            currency: "CEDIS".into(),
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Currency(_))));

        let mut config = ServiceConfig::default();
        config.price_defaults.image = dec!(0.001);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Price { name: "IMAGE_ANALYSIS_PRICE", .. })
        ));
    }

    #[test]
    fn webhook_secret_falls_back_to_secret_key() {
        let mut config = ServiceConfig {
            paystack_secret_key: Some("sk_test".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(config.webhook_secret(), Some("sk_test"));

        config.paystack_webhook_secret = Some("whsec".into());
        assert_eq!(config.webhook_secret(), Some("whsec"));

        assert_eq!(ServiceConfig::default().webhook_secret(), None);
    }
}
