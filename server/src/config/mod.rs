use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::jobs::{RetryPolicy, WorkerConfig};
use crate::services::{BookingSettings, NotificationSettings};

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/funora";
const DEFAULT_RAZORPAY_API_BASE: &str = "https://api.razorpay.com";
const DEFAULT_QR_STORAGE_DIR: &str = "./storage";
const DEFAULT_QR_PUBLIC_BASE_URL: &str = "http://localhost:3001/static";
const DEFAULT_CHARGE_NAMES: &str = "GST,Convenience_Fee";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when payments are enabled")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub enabled: bool,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub qr_dir: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    /// No endpoint means pushes are logged and dropped.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub production: bool,
    pub cors_allowed_origins: Option<String>,
    pub payments: PaymentConfig,
    pub storage: StorageConfig,
    pub push: PushConfig,
    pub booking: BookingSettings,
    pub notifications: NotificationSettings,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` passes
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let payments = PaymentConfig {
            enabled: vars.parse_or("ENABLE_PAYMENT_FEATURE", true)?,
            key_id: vars.string_or("RAZORPAY_KEY_ID", ""),
            key_secret: vars.string_or("RAZORPAY_KEY_SECRET", ""),
            webhook_secret: vars.string_or("RAZORPAY_WEBHOOK_SECRET", ""),
            api_base: vars.string_or("RAZORPAY_API_BASE", DEFAULT_RAZORPAY_API_BASE),
            currency: vars.string_or("PAYMENT_CURRENCY", "INR"),
        };
        if payments.enabled {
            for (name, value) in [
                ("RAZORPAY_KEY_ID", &payments.key_id),
                ("RAZORPAY_KEY_SECRET", &payments.key_secret),
                ("RAZORPAY_WEBHOOK_SECRET", &payments.webhook_secret),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::Missing(name));
                }
            }
        }

        let charge_names: Vec<String> = vars
            .string_or("BOOKING_CHARGE_NAMES", DEFAULT_CHARGE_NAMES)
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        let booking = BookingSettings {
            charge_names,
            cancellation_fee_rule: vars.string_or("CANCELLATION_FEE_RULE", "cancellation_fee"),
            payments_enabled: payments.enabled,
            currency: payments.currency.clone(),
        };

        let notifications = NotificationSettings {
            reminder_enabled: vars.parse_or("ENABLE_REMINDER_NOTIFICATION", true)?,
            new_event_enabled: vars.parse_or("ENABLE_NEW_EVENT_NOTIFICATION", true)?,
            event_update_enabled: vars.parse_or("ENABLE_EVENT_UPDATE_NOTIFICATION", true)?,
            deep_link_scheme: vars.string_or("DEEP_LINK_SCHEME", "funora"),
        };

        let worker = WorkerConfig {
            poll_interval: Duration::from_millis(vars.parse_or("WORKER_POLL_INTERVAL_MS", 1000)?),
            visibility_timeout: Duration::from_secs(
                vars.parse_or("JOB_VISIBILITY_TIMEOUT_SECS", 300)?,
            ),
            retry: RetryPolicy {
                max_attempts: vars.parse_or("JOB_MAX_ATTEMPTS", 3)?,
                base_delay: Duration::from_millis(vars.parse_or("JOB_RETRY_BASE_DELAY_MS", 5000)?),
                ..RetryPolicy::default()
            },
        };
        if worker.retry.max_attempts < 1 {
            return Err(ConfigError::Invalid {
                name: "JOB_MAX_ATTEMPTS",
                value: worker.retry.max_attempts.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url: vars.string_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            bind_addr: vars.parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001)))?,
            production: vars
                .string_or("RUST_ENV", "development")
                .eq_ignore_ascii_case("production"),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS"),
            payments,
            storage: StorageConfig {
                qr_dir: vars.string_or("QR_STORAGE_DIR", DEFAULT_QR_STORAGE_DIR),
                public_base_url: vars.string_or("QR_PUBLIC_BASE_URL", DEFAULT_QR_PUBLIC_BASE_URL),
            },
            push: PushConfig {
                endpoint: lookup("PUSH_ENDPOINT").filter(|e| !e.trim().is_empty()),
                timeout: Duration::from_millis(vars.parse_or("PUSH_TIMEOUT_MS", 5000)?),
            },
            booking,
            notifications,
            worker,
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string_or(&self, name: &str, default: &str) -> String {
        (self.0)(name)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(name).filter(|v| !v.trim().is_empty()) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_payments_are_off() {
        let config = config_from(&[("ENABLE_PAYMENT_FEATURE", "false")]).unwrap();

        assert_eq!(config.bind_addr.port(), 3001);
        assert!(!config.production);
        assert!(!config.booking.payments_enabled);
        assert_eq!(config.booking.charge_names, vec!["GST", "Convenience_Fee"]);
        assert_eq!(config.booking.cancellation_fee_rule, "cancellation_fee");
        assert!(config.notifications.reminder_enabled);
        assert_eq!(config.worker.retry.max_attempts, 3);
        assert!(config.push.endpoint.is_none());
    }

    #[test]
    fn payments_need_gateway_credentials() {
        let err = config_from(&[("RAZORPAY_KEY_ID", "rzp_test")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RAZORPAY_KEY_SECRET")));

        let config = config_from(&[
            ("RAZORPAY_KEY_ID", "rzp_test"),
            ("RAZORPAY_KEY_SECRET", "secret"),
            ("RAZORPAY_WEBHOOK_SECRET", "whsec"),
            ("RUST_ENV", "Production"),
        ])
        .unwrap();
        assert!(config.payments.enabled);
        assert!(config.production);
    }

    #[test]
    fn notification_toggles_and_worker_tuning_are_read() {
        let config = config_from(&[
            ("ENABLE_PAYMENT_FEATURE", "false"),
            ("ENABLE_NEW_EVENT_NOTIFICATION", "false"),
            ("DEEP_LINK_SCHEME", "myapp"),
            ("BOOKING_CHARGE_NAMES", " GST , Platform_Fee ,"),
            ("JOB_MAX_ATTEMPTS", "5"),
            ("WORKER_POLL_INTERVAL_MS", "250"),
        ])
        .unwrap();

        assert!(!config.notifications.new_event_enabled);
        assert!(config.notifications.event_update_enabled);
        assert_eq!(config.notifications.deep_link_scheme, "myapp");
        assert_eq!(config.booking.charge_names, vec!["GST", "Platform_Fee"]);
        assert_eq!(config.worker.retry.max_attempts, 5);
        assert_eq!(config.worker.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_are_reported() {
        let err = config_from(&[
            ("ENABLE_PAYMENT_FEATURE", "false"),
            ("PUSH_TIMEOUT_MS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PUSH_TIMEOUT_MS", .. }));

        let err = config_from(&[
            ("ENABLE_PAYMENT_FEATURE", "false"),
            ("JOB_MAX_ATTEMPTS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JOB_MAX_ATTEMPTS", .. }));
    }
}
