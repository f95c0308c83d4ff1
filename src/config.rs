//! Environment-derived runtime configuration.
//!
//! Everything tunable at deploy time comes from environment variables
//! (loaded through `dotenvy` in the binary): the webhook shared secret, the
//! optional feedback API key, suspension timing, and the webhook retry
//! policy. Builder methods exist so tests can construct configurations
//! without touching the process environment.

use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_FEEDBACK_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Runtime configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for webhook signature verification. `None` disables
    /// signature checks (development mode).
    pub webhook_secret: Option<String>,
    /// API key for the webhook feedback endpoint. `None` authorizes all
    /// callers (development mode).
    pub api_key: Option<String>,
    /// Maximum latency for a suspended execution to observe cancellation.
    pub poll_interval: Duration,
    /// Wall-clock limit a checkpoint may stay unresolved before the
    /// execution fails with a timeout.
    pub feedback_timeout: Duration,
    /// Re-attempts after the first failed processing of a webhook event.
    pub max_retries: u32,
    /// Delay between webhook processing attempts.
    pub retry_delay: Duration,
    /// Bind host for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Command line for the subprocess workflow engine, e.g. `"crew run"`.
    pub engine_cmd: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            api_key: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            feedback_timeout: Duration::from_secs(DEFAULT_FEEDBACK_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            engine_cmd: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Missing variables fall back to defaults; malformed numeric values are
    /// errors rather than silent fallbacks so a typo in a deployment does
    /// not quietly change timeout behavior.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            webhook_secret: env_with_fallback("GREENLIGHT_WEBHOOK_SECRET", "WEBHOOK_SECRET"),
            api_key: env_with_fallback("GREENLIGHT_API_KEY", "WEBHOOK_API_KEY"),
            poll_interval: env_duration_secs(
                "GREENLIGHT_POLL_INTERVAL_SECS",
                Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            )?,
            feedback_timeout: env_duration_secs(
                "GREENLIGHT_FEEDBACK_TIMEOUT_SECS",
                Duration::from_secs(DEFAULT_FEEDBACK_TIMEOUT_SECS),
            )?,
            max_retries: env_parse("GREENLIGHT_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_delay: env_duration_secs(
                "GREENLIGHT_RETRY_DELAY_SECS",
                Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            )?,
            host: std::env::var("GREENLIGHT_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env_parse("GREENLIGHT_PORT", DEFAULT_PORT)?,
            engine_cmd: std::env::var("GREENLIGHT_ENGINE_CMD").ok(),
        })
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_feedback_timeout(mut self, timeout: Duration) -> Self {
        self.feedback_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_engine_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.engine_cmd = Some(cmd.into());
        self
    }
}

/// Read `primary`, falling back to `fallback` for compatibility with
/// deployments configured before the `GREENLIGHT_` prefix existed.
fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .ok()
        .filter(|value| !value.is_empty())
}

fn env_duration_secs(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("Invalid {} value '{}': expected seconds", key, raw))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {} value '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that
    // touch them.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_greenlight_env() {
        for key in [
            "GREENLIGHT_WEBHOOK_SECRET",
            "WEBHOOK_SECRET",
            "GREENLIGHT_API_KEY",
            "WEBHOOK_API_KEY",
            "GREENLIGHT_POLL_INTERVAL_SECS",
            "GREENLIGHT_FEEDBACK_TIMEOUT_SECS",
            "GREENLIGHT_MAX_RETRIES",
            "GREENLIGHT_RETRY_DELAY_SECS",
            "GREENLIGHT_HOST",
            "GREENLIGHT_PORT",
            "GREENLIGHT_ENGINE_CMD",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.webhook_secret.is_none());
        assert!(config.api_key.is_none());
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.feedback_timeout, Duration::from_secs(3600));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert!(config.engine_cmd.is_none());
    }

    #[test]
    fn test_config_builders() {
        let config = Config::default()
            .with_webhook_secret("s3cret")
            .with_api_key("key-1")
            .with_poll_interval(Duration::from_millis(10))
            .with_feedback_timeout(Duration::from_millis(50))
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(1))
            .with_engine_cmd("crew run");
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.api_key.as_deref(), Some("key-1"));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.feedback_timeout, Duration::from_millis(50));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(1));
        assert_eq!(config.engine_cmd.as_deref(), Some("crew run"));
    }

    #[test]
    fn test_from_env_defaults_when_unset() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_greenlight_env();

        let config = Config::from_env().unwrap();
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_from_env_reads_values() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_greenlight_env();

        unsafe {
            std::env::set_var("GREENLIGHT_WEBHOOK_SECRET", "topsecret");
            std::env::set_var("GREENLIGHT_POLL_INTERVAL_SECS", "2");
            std::env::set_var("GREENLIGHT_MAX_RETRIES", "5");
            std::env::set_var("GREENLIGHT_PORT", "9000");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.webhook_secret.as_deref(), Some("topsecret"));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.port, 9000);

        clear_greenlight_env();
    }

    #[test]
    fn test_from_env_secret_fallback() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_greenlight_env();

        unsafe { std::env::set_var("WEBHOOK_SECRET", "legacy") };
        let config = Config::from_env().unwrap();
        assert_eq!(config.webhook_secret.as_deref(), Some("legacy"));

        // The prefixed variable wins when both are set.
        unsafe { std::env::set_var("GREENLIGHT_WEBHOOK_SECRET", "preferred") };
        let config = Config::from_env().unwrap();
        assert_eq!(config.webhook_secret.as_deref(), Some("preferred"));

        clear_greenlight_env();
    }

    #[test]
    fn test_from_env_rejects_malformed_numbers() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_greenlight_env();

        unsafe { std::env::set_var("GREENLIGHT_FEEDBACK_TIMEOUT_SECS", "soon") };
        let result = Config::from_env();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("GREENLIGHT_FEEDBACK_TIMEOUT_SECS")
        );

        clear_greenlight_env();
    }

    #[test]
    fn test_empty_secret_treated_as_unset() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_greenlight_env();

        unsafe { std::env::set_var("GREENLIGHT_WEBHOOK_SECRET", "") };
        let config = Config::from_env().unwrap();
        assert!(config.webhook_secret.is_none());

        clear_greenlight_env();
    }
}
