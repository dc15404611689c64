//! Serializable scan configuration and provider credentials.
//!
//! Everything is passed into constructors explicitly; nothing here reads
//! process-wide state except [`Credentials::from_env`].

use crate::director::ThrottlePolicy;
use crate::monitor::MonitorConfig;
use crate::ranking::RankConfig;
use crate::retry::RetryPolicy;
use optscan_core::analysis::{CpsConfig, RegressionConfig, WheelConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine settings for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    // ── Concurrency ──
    pub workers: usize,

    // ── Fetching ──
    pub max_fetch_attempts: u32,
    pub fail_fast_on_permanent: bool,
    pub initial_budget: i64,
    pub throttle: ThrottlePolicy,

    // ── Output ──
    pub poll_interval_ms: u64,
    pub save_scan: bool,
    pub log_changes: bool,
    pub scan_dir: PathBuf,
    pub log_dir: PathBuf,
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            max_fetch_attempts: 5,
            fail_fast_on_permanent: true,
            initial_budget: 200,
            throttle: ThrottlePolicy::default(),
            poll_interval_ms: 100,
            save_scan: true,
            log_changes: true,
            scan_dir: PathBuf::from("scan"),
            log_dir: PathBuf::from("log"),
            show_progress: true,
        }
    }
}

impl ScanConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&read_config(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_fetch_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_fetch_attempts must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        let t = &self.throttle;
        if t.throttle_threshold >= t.warm_threshold {
            return Err(ConfigError::Invalid(format!(
                "throttle_threshold ({}) must be below warm_threshold ({})",
                t.throttle_threshold, t.warm_threshold
            )));
        }
        if t.warm_rate == 0 || t.throttle_rate == 0 || t.scale_factor == 0 {
            return Err(ConfigError::Invalid("throttle rates must be positive".into()));
        }
        if !(t.period_secs.is_finite() && t.period_secs > 0.0) {
            return Err(ConfigError::Invalid("throttle period must be positive".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_fetch_attempts,
            fail_fast_on_permanent: self.fail_fast_on_permanent,
        }
    }

    /// Deterministic hash of the settings, logged at scan start so two scan
    /// logs can be compared.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("ScanConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// The whole config file: engine settings plus per-analyzer and
/// post-processing sections. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanConfig,
    pub cps: CpsConfig,
    pub wheel: WheelConfig,
    pub regression: RegressionConfig,
    pub rank: RankConfig,
    pub monitor: MonitorConfig,
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.scan.validate()?;
        settings.rank.validate()?;
        settings.monitor.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&read_config(path)?)
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

// ─── Credentials ─────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub tradier_endpoint: String,
    pub tradier_api_key: String,
    pub polygon_v1_endpoint: String,
    pub polygon_v2_endpoint: String,
    pub polygon_api_key: String,
    pub yfinance_endpoint: String,
    pub ycharts_endpoint: String,
    pub slack: Option<SlackCredentials>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SlackCredentials {
    pub bot_token: String,
    pub channel: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tradier_endpoint", &self.tradier_endpoint)
            .field("polygon_v1_endpoint", &self.polygon_v1_endpoint)
            .field("polygon_v2_endpoint", &self.polygon_v2_endpoint)
            .field("yfinance_endpoint", &self.yfinance_endpoint)
            .field("ycharts_endpoint", &self.ycharts_endpoint)
            .field("slack", &self.slack.is_some())
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve every variable through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingCredential(key));

        let slack = match (get("SLACK_BOT_TOKEN"), get("SLACK_BOT_CHANNEL")) {
            (Some(bot_token), Some(channel)) => Some(SlackCredentials { bot_token, channel }),
            _ => None,
        };

        Ok(Self {
            tradier_endpoint: require("TRADIER_ENDPOINT")?,
            tradier_api_key: require("TRADIER_API_KEY")?,
            polygon_v1_endpoint: require("POLYGON_V1_ENDPOINT")?,
            polygon_v2_endpoint: require("POLYGON_V2_ENDPOINT")?,
            polygon_api_key: require("POLYGON_API_KEY")?,
            yfinance_endpoint: require("YFINANCE_ENDPOINT")?,
            ycharts_endpoint: require("YCHARTS_ENDPOINT")?,
            slack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let c = ScanConfig::default();
        assert_eq!(c.workers, 6);
        assert_eq!(c.max_fetch_attempts, 5);
        assert_eq!(c.initial_budget, 200);
        assert_eq!(c.poll_interval_ms, 100);
        assert_eq!(c.throttle.warm_threshold, 100);
        assert_eq!(c.throttle.throttle_threshold, 30);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = ScanConfig::from_toml("workers = 2\n[throttle]\nperiod_secs = 6.0\n").unwrap();
        assert_eq!(c.workers, 2);
        assert_eq!(c.throttle.period_secs, 6.0);
        assert_eq!(c.throttle.warm_rate, 500);
        assert!(c.save_scan);
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            ScanConfig::from_toml("workers = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let toml = "[throttle]\nwarm_threshold = 20\nthrottle_threshold = 30\n";
        assert!(matches!(
            ScanConfig::from_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = ScanConfig::default();
        let mut b = ScanConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.workers = 3;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn settings_sections_parse() {
        let toml = r#"
            [scan]
            workers = 4

            [wheel]
            manual_greeks = true

            [rank]
            aroc_limit = 0.2

            [monitor]
            delay_secs = 60
        "#;
        let s = Settings::from_toml(toml).unwrap();
        assert_eq!(s.scan.workers, 4);
        assert!(s.wheel.manual_greeks);
        assert_eq!(s.rank.aroc_limit, 0.2);
        assert_eq!(s.monitor.delay_secs, 60);
        assert_eq!(s.cps, CpsConfig::default());
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("optscan.toml");
        assert!(matches!(
            Settings::from_file(&missing),
            Err(ConfigError::Io { .. })
        ));
        std::fs::write(&missing, "[scan]\nlog_changes = false\n").unwrap();
        assert!(!Settings::from_file(&missing).unwrap().scan.log_changes);
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("TRADIER_ENDPOINT", "https://api.tradier.com/v1/"),
        ("TRADIER_API_KEY", "tk"),
        ("POLYGON_V1_ENDPOINT", "https://api.polygon.io/v1/"),
        ("POLYGON_V2_ENDPOINT", "https://api.polygon.io/v2/"),
        ("POLYGON_API_KEY", "pk"),
        ("YFINANCE_ENDPOINT", "https://finance.yahoo.com/quote/"),
        ("YCHARTS_ENDPOINT", "https://ycharts.com/indicators/"),
    ];

    #[test]
    fn credentials_resolve_with_optional_slack() {
        let vars = env(REQUIRED);
        let creds = Credentials::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.tradier_api_key, "tk");
        assert!(creds.slack.is_none());

        let mut with_slack = REQUIRED.to_vec();
        with_slack.push(("SLACK_BOT_TOKEN", "xoxb"));
        with_slack.push(("SLACK_BOT_CHANNEL", "#alerts"));
        let vars = env(&with_slack);
        let creds = Credentials::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.slack.unwrap().channel, "#alerts");
    }

    #[test]
    fn missing_credential_is_named() {
        let vars = env(&REQUIRED[1..]);
        let err = Credentials::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("TRADIER_ENDPOINT")));

        let mut blank = REQUIRED.to_vec();
        blank[1] = ("TRADIER_API_KEY", "  ");
        let vars = env(&blank);
        assert!(Credentials::from_lookup(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let vars = env(REQUIRED);
        let creds = Credentials::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let shown = format!("{creds:?}");
        assert!(!shown.contains("tk"));
        assert!(!shown.contains("pk"));
    }
}
