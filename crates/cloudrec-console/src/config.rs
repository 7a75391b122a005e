//! Console configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `conf/console.yml`, `CLOUDREC_*` environment variables (`.` separated),
//! then command line overrides.

use std::path::Path;

use config::{Config, Environment, File};

use cloudrec_common::DEFAULT_PAGE_SIZE;
use cloudrec_core::LockPolicy;

use crate::logging::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/console.yml";

pub const CONSOLE_MODE: &str = "console.mode";
pub const CONSOLE_MODE_REMOTE: &str = "remote";
pub const CONSOLE_MODE_LOCAL: &str = "local";
pub const CONSOLE_REMOTE_SERVER_ADDRS: &str = "console.remote.server_addrs";
pub const CONSOLE_REMOTE_USERNAME: &str = "console.remote.username";
pub const CONSOLE_REMOTE_PASSWORD: &str = "console.remote.password";
pub const CONSOLE_REMOTE_CONTEXT_PATH: &str = "console.remote.context_path";
pub const CONSOLE_REMOTE_CONNECT_TIMEOUT_MS: &str = "console.remote.connect_timeout_ms";
pub const CONSOLE_REMOTE_READ_TIMEOUT_MS: &str = "console.remote.read_timeout_ms";
pub const CONSOLE_LOCAL_USER_ID: &str = "console.local.user_id";
pub const CONSOLE_LOCAL_USERNAME: &str = "console.local.username";
pub const CONSOLE_PAGE_SIZE: &str = "console.page_size";
pub const LOCK_POLICY: &str = "lock.policy";
pub const LOCK_LEASE_TTL_MS: &str = "lock.lease_ttl_ms";
pub const LOGGING_LEVEL: &str = "logging.level";
pub const LOGGING_JSON: &str = "logging.json";

/// Values given on the command line; `None` leaves lower sources in effect
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<String>,
    pub mode: Option<String>,
    pub server_addrs: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub lock_policy: Option<String>,
    pub log_level: Option<String>,
}

/// Console configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct ConsoleConfig {
    pub config: Config,
}

impl ConsoleConfig {
    pub fn load(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let file = overrides
            .config_file
            .as_deref()
            .unwrap_or(DEFAULT_CONFIG_FILE);
        // Only an explicitly named file is required to exist
        let required = overrides.config_file.is_some();
        if required && !Path::new(file).exists() {
            anyhow::bail!("config file '{}' not found", file);
        }

        let mut builder = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("cloudrec")
                    .separator(".")
                    .try_parsing(true),
            );

        if let Some(v) = &overrides.mode {
            builder = builder.set_override(CONSOLE_MODE, v.as_str())?;
        }
        if let Some(v) = &overrides.server_addrs {
            builder = builder.set_override(CONSOLE_REMOTE_SERVER_ADDRS, v.as_str())?;
        }
        if let Some(v) = &overrides.username {
            builder = builder.set_override(CONSOLE_REMOTE_USERNAME, v.as_str())?;
        }
        if let Some(v) = &overrides.password {
            builder = builder.set_override(CONSOLE_REMOTE_PASSWORD, v.as_str())?;
        }
        if let Some(v) = &overrides.lock_policy {
            builder = builder.set_override(LOCK_POLICY, v.as_str())?;
        }
        if let Some(v) = &overrides.log_level {
            builder = builder.set_override(LOGGING_LEVEL, v.as_str())?;
        }

        Ok(Self {
            config: builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // ========================================================================
    // Console Mode
    // ========================================================================

    pub fn console_mode(&self) -> String {
        self.config
            .get_string(CONSOLE_MODE)
            .unwrap_or(CONSOLE_MODE_LOCAL.to_string())
    }

    pub fn is_remote_mode(&self) -> bool {
        self.console_mode() == CONSOLE_MODE_REMOTE
    }

    /// Comma separated in files and env, or a list in YAML
    pub fn remote_server_addrs(&self) -> Vec<String> {
        let addrs = self
            .config
            .get_array(CONSOLE_REMOTE_SERVER_ADDRS)
            .ok()
            .map(|values| {
                values
                    .into_iter()
                    .filter_map(|v| v.into_string().ok())
                    .collect::<Vec<_>>()
            })
            .or_else(|| {
                self.config
                    .get_string(CONSOLE_REMOTE_SERVER_ADDRS)
                    .ok()
                    .map(|s| s.split(',').map(|a| a.trim().to_string()).collect())
            })
            .unwrap_or_default();

        let addrs: Vec<String> = addrs.into_iter().filter(|a| !a.is_empty()).collect();
        if addrs.is_empty() {
            vec!["http://127.0.0.1:8080".to_string()]
        } else {
            addrs
        }
    }

    pub fn remote_username(&self) -> String {
        self.config
            .get_string(CONSOLE_REMOTE_USERNAME)
            .unwrap_or_default()
    }

    pub fn remote_password(&self) -> String {
        self.config
            .get_string(CONSOLE_REMOTE_PASSWORD)
            .unwrap_or_default()
    }

    pub fn remote_context_path(&self) -> String {
        self.config
            .get_string(CONSOLE_REMOTE_CONTEXT_PATH)
            .unwrap_or_default()
    }

    pub fn remote_connect_timeout_ms(&self) -> u64 {
        self.config
            .get_int(CONSOLE_REMOTE_CONNECT_TIMEOUT_MS)
            .unwrap_or(5000) as u64
    }

    pub fn remote_read_timeout_ms(&self) -> u64 {
        self.config
            .get_int(CONSOLE_REMOTE_READ_TIMEOUT_MS)
            .unwrap_or(30000) as u64
    }

    pub fn local_user_id(&self) -> String {
        self.config
            .get_string(CONSOLE_LOCAL_USER_ID)
            .unwrap_or("admin".to_string())
    }

    pub fn local_username(&self) -> String {
        self.config
            .get_string(CONSOLE_LOCAL_USERNAME)
            .unwrap_or_else(|_| self.local_user_id())
    }

    pub fn page_size(&self) -> u64 {
        self.config
            .get_int(CONSOLE_PAGE_SIZE)
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_policy(&self) -> anyhow::Result<LockPolicy> {
        match self.config.get_string(LOCK_POLICY) {
            Ok(v) => Ok(v.parse()?),
            Err(_) => Ok(LockPolicy::default()),
        }
    }

    /// Lease length in milliseconds; 0 means leases never expire
    pub fn lease_ttl_ms(&self) -> u64 {
        self.config
            .get_int(LOCK_LEASE_TTL_MS)
            .unwrap_or(0)
            .max(0) as u64
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self
                .config
                .get_string(LOGGING_LEVEL)
                .unwrap_or("info".to_string()),
            json: self.config.get_bool(LOGGING_JSON).unwrap_or(false),
        }
    }
}
