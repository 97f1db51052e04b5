use crate::error::{Result, SitekickError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "sitekick.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

fn default_email_api_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_from() -> String {
    "Sitekick <hello@sitekick.dev>".to_string()
}

fn default_email_timeout() -> u64 {
    10
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_email_api_url(),
            api_key: None,
            from: default_from(),
            reply_to: None,
            timeout_secs: default_email_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// StripeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    /// Maximum age of a signed webhook timestamp.
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: u64,
}

fn default_tolerance() -> u64 {
    300
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            tolerance_secs: default_tolerance(),
        }
    }
}

// ---------------------------------------------------------------------------
// AdminConfig / BrandingConfig / GateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for `/api/admin/*`. Unset means every admin call is refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandingConfig {
    #[serde(default = "default_brand_name")]
    pub brand_name: String,
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
}

fn default_brand_name() -> String {
    "Sitekick".to_string()
}

fn default_dashboard_url() -> String {
    "https://app.sitekick.dev/dashboard".to_string()
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            brand_name: default_brand_name(),
            dashboard_url: default_dashboard_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Upper bound for every datastore call made while gating or reconciling.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    /// How long a send waits for another in-flight send of the same email.
    /// Unset derives it from the store and email timeouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_timeout_ms: Option<u64>,
}

fn default_store_timeout() -> u64 {
    5_000
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout(),
            lease_timeout_ms: None,
        }
    }
}

impl GateConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub branding: BrandingConfig,
    #[serde(default)]
    pub gate: GateConfig,
}

/// Environment variables that override secrets from the file.
pub const ENV_DATABASE_URL: &str = "SITEKICK_DATABASE_URL";
pub const ENV_EMAIL_API_KEY: &str = "RESEND_API_KEY";
pub const ENV_STRIPE_WEBHOOK_SECRET: &str = "STRIPE_WEBHOOK_SECRET";
pub const ENV_ADMIN_TOKEN: &str = "SITEKICK_ADMIN_TOKEN";

impl Config {
    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data).map_err(|e| match e {
            SitekickError::Yaml(err) => {
                SitekickError::Config(format!("{}: {err}", path.display()))
            }
            other => other,
        })
    }

    /// Load `path` and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut cfg = Self::load(path)?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Override secrets with values from `lookup`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_DATABASE_URL) {
            self.database.url = Some(url);
        }
        if let Some(key) = get(ENV_EMAIL_API_KEY) {
            self.email.api_key = Some(key);
        }
        if let Some(secret) = get(ENV_STRIPE_WEBHOOK_SECRET) {
            self.stripe.webhook_secret = Some(secret);
        }
        if let Some(token) = get(ENV_ADMIN_TOKEN) {
            self.admin.token = Some(token);
        }
    }

    /// Upper bound on waiting for the send lease. The holder may spend one
    /// store call per gate step plus a full email dispatch.
    pub fn lease_timeout(&self) -> Duration {
        match self.gate.lease_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => {
                self.gate.store_timeout() * 5 + Duration::from_secs(self.email.timeout_secs)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Copy with every secret replaced by a fixed marker, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<redacted>".to_string());
        let mut out = self.clone();
        out.database.url = mask(&self.database.url);
        out.email.api_key = mask(&self.email.api_key);
        out.stripe.webhook_secret = mask(&self.stripe.webhook_secret);
        out.admin.token = mask(&self.admin.token);
        out
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let missing = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").is_empty();

        if missing(&self.database.url) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "database.url is not set ({ENV_DATABASE_URL}); \
                     only the in-memory store is available"
                ),
            });
        }

        if missing(&self.email.api_key) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("email.api_key is not set ({ENV_EMAIL_API_KEY})"),
            });
        }

        if !self.email.from.contains('@') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("email.from '{}' is not an email address", self.email.from),
            });
        }

        if missing(&self.stripe.webhook_secret) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "stripe.webhook_secret is not set ({ENV_STRIPE_WEBHOOK_SECRET}); \
                     every webhook will be rejected"
                ),
            });
        } else if let Some(secret) = &self.stripe.webhook_secret {
            if !secret.starts_with("whsec_") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "stripe.webhook_secret does not start with 'whsec_'".to_string(),
                });
            }
        }

        if missing(&self.admin.token) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "admin.token is not set ({ENV_ADMIN_TOKEN}); \
                     admin endpoints will refuse every request"
                ),
            });
        }

        if self.stripe.tolerance_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "stripe.tolerance_secs must be greater than 0".to_string(),
            });
        }

        if self.gate.store_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "gate.store_timeout_ms must be greater than 0".to_string(),
            });
        }

        if let Some(ms) = self.gate.lease_timeout_ms {
            if Duration::from_millis(ms) <= Duration::from_secs(self.email.timeout_secs) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "gate.lease_timeout_ms={ms} must exceed email.timeout_secs={}",
                        self.email.timeout_secs
                    ),
                });
            }
        }

        if self.email.timeout_secs > 60 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "email.timeout_secs={} (>60 is unusual)",
                    self.email.timeout_secs
                ),
            });
        }

        warnings
    }
}
