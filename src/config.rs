//! Configuration for nlmkit.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DAY: u64 = 24 * 3600;

/// Main configuration for nlmkit.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Root directory for profiles and session state (platform default if None).
    pub data_dir: Option<PathBuf>,
    /// Browser configuration.
    pub browser: BrowserConfig,
    /// Authentication and session lifetime settings.
    pub auth: AuthConfig,
}

/// Browser-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode.
    pub headless: bool,
    /// Path to browser executable (auto-detect if None).
    pub executable_path: Option<PathBuf>,
    /// Browser window width.
    pub window_width: u32,
    /// Browser window height.
    pub window_height: u32,
    /// Additional browser arguments.
    pub args: Vec<String>,
    /// Sandbox mode (disable for containers).
    pub sandbox: bool,
    /// Bound applied to every navigation.
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable_path: None,
            window_width: 1440,
            window_height: 900,
            args: vec![
                "--disable-dev-shm-usage".into(),
                "--no-first-run".into(),
                "--no-default-browser-check".into(),
            ],
            sandbox: true,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Origin opened for login and validation.
    pub target_url: String,
    /// How long to wait for a human to finish logging in.
    #[serde(with = "humantime_serde")]
    pub login_timeout: Duration,
    /// How often the current URL is checked while waiting for login.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Age after which a login is considered expired.
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
    /// Age after which a login is reported as expiring soon.
    #[serde(with = "humantime_serde")]
    pub warning: Duration,
    /// Storage-state age beyond which the session is reported stale.
    #[serde(with = "humantime_serde")]
    pub freshness_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            target_url: crate::notebooklm::BASE_URL.into(),
            login_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(500),
            expiry: Duration::from_secs(7 * DAY),
            warning: Duration::from_secs(5 * DAY),
            freshness_window: Duration::from_secs(7 * DAY),
        }
    }
}

impl Config {
    /// Load configuration from file.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Load configuration from file, falling back to defaults if it is absent.
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| crate::Error::persistence(path, e))?;
        Ok(())
    }

    /// Data root, resolved against the platform default.
    pub fn data_root(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Create a builder for configuration.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Platform data directory used when none is configured.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nlmkit")
}

/// Builder for Config.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data root.
    pub fn data_dir(mut self, path: PathBuf) -> Self {
        self.config.data_dir = Some(path);
        self
    }

    /// Set headless mode.
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.browser.headless = headless;
        self
    }

    /// Disable sandbox (for containers).
    pub fn no_sandbox(mut self) -> Self {
        self.config.browser.sandbox = false;
        self
    }

    /// Set the interactive login timeout.
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth.login_timeout = timeout;
        self
    }

    /// Set the login polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.auth.poll_interval = interval;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}
