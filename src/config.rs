//! Environment-driven configuration

use crate::forwarder::ForwarderConfig;
use crate::gateway::GatewayConfig;
use crate::state_machine::EmptySubmissionPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
    pub archive_grace: Duration,
    /// Inbound events per identifier per minute; 0 disables limiting
    pub rate_limit_per_minute: u32,
    pub empty_submission: EmptySubmissionPolicy,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub forward_url: Option<String>,
    pub forward_token: Option<String>,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; invalid values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
        let base = PathBuf::from(home).join(".doc-intake");
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let empty_submission = match non_empty("INTAKE_EMPTY_SUBMISSION") {
            Some(raw) => EmptySubmissionPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(key = "INTAKE_EMPTY_SUBMISSION", value = %raw, "Invalid value, using default");
                EmptySubmissionPolicy::default()
            }),
            None => EmptySubmissionPolicy::default(),
        };

        Self {
            port: parsed(&lookup, "INTAKE_PORT", 8000),
            db_path: non_empty("INTAKE_DB_PATH").map_or_else(|| base.join("intake.db"), PathBuf::from),
            data_dir: non_empty("INTAKE_DATA_DIR").map_or_else(|| base.join("data"), PathBuf::from),
            session_timeout: seconds(&lookup, "INTAKE_SESSION_TIMEOUT_SECS", 1800),
            sweep_interval: seconds(&lookup, "INTAKE_SWEEP_INTERVAL_SECS", 60),
            archive_grace: seconds(&lookup, "INTAKE_ARCHIVE_GRACE_SECS", 300),
            rate_limit_per_minute: parsed(&lookup, "INTAKE_RATE_LIMIT_PER_MINUTE", 30),
            empty_submission,
            gateway_url: non_empty("INTAKE_GATEWAY_URL"),
            gateway_token: non_empty("INTAKE_GATEWAY_TOKEN"),
            forward_url: non_empty("INTAKE_FORWARD_URL"),
            forward_token: non_empty("INTAKE_FORWARD_TOKEN"),
            http_timeout: seconds(&lookup, "INTAKE_HTTP_TIMEOUT_SECS", 15),
        }
    }

    /// Messaging API settings, when one is configured
    pub fn gateway(&self) -> Option<GatewayConfig> {
        self.gateway_url.as_ref().map(|url| GatewayConfig {
            base_url: url.clone(),
            token: self.gateway_token.clone(),
            timeout: self.http_timeout,
        })
    }

    pub fn forwarder(&self) -> ForwarderConfig {
        ForwarderConfig {
            url: self.forward_url.clone(),
            token: self.forward_token.clone(),
            timeout: self.http_timeout,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(key = %key, value = %raw, "Invalid value, using default");
        default
    })
}

/// Whole seconds; zero falls back to the default
fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Duration {
    match parsed(lookup, key, default) {
        0 => {
            tracing::warn!(key = %key, "Zero duration, using default");
            Duration::from_secs(default)
        }
        secs => Duration::from_secs(secs),
    }
}
