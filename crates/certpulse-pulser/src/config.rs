use anyhow::{Context, Result};
use certpulse_notify::channels::email::SmtpSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cert::orchestrator::DEFAULT_MAX_CONCURRENT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulserConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// SMTP relay for email alerts. Emails are only logged when absent.
    #[serde(default)]
    pub email: Option<SmtpSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on probes in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Deadline for each notification channel call.
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            interval_secs: default_interval_secs(),
            max_concurrent: default_max_concurrent(),
            probe_timeout_ms: default_probe_timeout_ms(),
            notify_timeout_ms: default_notify_timeout_ms(),
            port: default_port(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl Default for PulserConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            monitor: MonitorConfig::default(),
            email: None,
        }
    }
}

impl PulserConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        Self::parse(&content).with_context(|| format!("Invalid config file '{path}'"))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let m = &self.monitor;
        if m.max_concurrent == 0 {
            anyhow::bail!("monitor.max_concurrent must be at least 1");
        }
        if m.interval_secs == 0 {
            anyhow::bail!("monitor.interval_secs must be greater than zero");
        }
        if m.probe_timeout_ms == 0 || m.notify_timeout_ms == 0 {
            anyhow::bail!("monitor timeouts must be greater than zero");
        }
        if m.port == 0 {
            anyhow::bail!("monitor.port must not be zero");
        }
        Ok(())
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_monitor_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_notify_timeout_ms() -> u64 {
    2000
}

fn default_port() -> u16 {
    443
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = PulserConfig::parse("").unwrap();
        assert_eq!(config.data_dir, "data");
        assert!(config.monitor.enabled);
        assert_eq!(config.monitor.max_concurrent, 15);
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.monitor.notify_timeout(), Duration::from_secs(2));
        assert_eq!(config.monitor.interval(), Duration::from_secs(10));
        assert_eq!(config.monitor.port, 443);
        assert!(config.email.is_none());
    }

    #[test]
    fn parses_email_table() {
        let config = PulserConfig::parse(
            r#"
            data_dir = "/var/lib/certpulse"

            [monitor]
            interval_secs = 300
            max_concurrent = 4

            [email]
            smtp_host = "smtp.example.com"
            from = "alerts@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, "/var/lib/certpulse");
        assert_eq!(config.monitor.interval_secs, 300);
        assert_eq!(config.monitor.max_concurrent, 4);
        assert_eq!(config.monitor.probe_timeout_ms, 5000);
        let email = config.email.unwrap();
        assert_eq!(email.smtp_port, 587);
        assert!(email.smtp_username.is_none());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = PulserConfig::parse("[monitor]\nmax_concurrent = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));
    }

    #[test]
    fn rejects_zero_timeouts() {
        assert!(PulserConfig::parse("[monitor]\nprobe_timeout_ms = 0\n").is_err());
        assert!(PulserConfig::parse("[monitor]\ninterval_secs = 0\n").is_err());
    }
}
