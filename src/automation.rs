//! Browser automation seam.
//!
//! The coordinator only needs a handful of operations from a browser:
//! launch bound to an identity directory, navigate, read the current URL,
//! snapshot storage state, and close. [`ChromiumDriver`](crate::chromium::ChromiumDriver)
//! implements them over CDP; tests substitute a scripted driver.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Everything needed to open an identity-bound browsing context.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Browser user-data directory for this profile.
    pub identity_dir: PathBuf,
    /// Storage-state snapshot to restore cookies from, if present.
    pub storage_state: PathBuf,
    /// Run without a visible window.
    pub headless: bool,
    /// Bound for each navigation.
    pub navigation_timeout: Duration,
}

/// Where a navigation ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    /// URL after redirects.
    pub url: String,
    /// Document title.
    pub title: Option<String>,
}

/// Launches browser sessions.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Open a browsing context bound to `spec.identity_dir`.
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserSession>>;
}

/// A live browsing context.
///
/// `close` must be safe to call more than once.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for the document to load.
    async fn navigate(&mut self, url: &str) -> Result<PageInfo>;

    /// URL of the current page.
    async fn current_url(&mut self) -> Result<String>;

    /// Snapshot cookies and local storage.
    async fn storage_state(&mut self) -> Result<StorageState>;

    /// Release the browser process and context.
    async fn close(&mut self) -> Result<()>;
}

/// Serialized cookies and local storage.
///
/// Playwright-compatible shape; fields this crate does not know about are
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Session and persistent cookies.
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    /// Per-origin local storage.
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
    /// Unrecognized top-level fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One cookie in a storage-state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain attribute.
    pub domain: String,
    /// Path attribute.
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Expiry in epoch seconds; -1 for session cookies.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    /// HttpOnly flag.
    #[serde(default)]
    pub http_only: bool,
    /// Secure flag.
    #[serde(default)]
    pub secure: bool,
    /// SameSite policy (`Strict`, `Lax`, `None`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl StoredCookie {
    /// Whether the cookie only lives for the browser session.
    pub fn is_session(&self) -> bool {
        self.expires < 0.0
    }
}

fn default_cookie_path() -> String {
    "/".into()
}

fn session_expiry() -> f64 {
    -1.0
}

/// Local storage entries for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    /// Origin, e.g. `https://notebooklm.google.com`.
    pub origin: String,
    /// Key/value pairs.
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

/// A local storage key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Key.
    pub name: String,
    /// Value.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playwright_state_parses_and_keeps_unknown_fields() {
        let json = r#"{
            "cookies": [
                {"name": "SID", "value": "abc", "domain": ".google.com", "path": "/",
                 "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Lax"}
            ],
            "origins": [
                {"origin": "https://notebooklm.google.com",
                 "localStorage": [{"name": "k", "value": "v"}]}
            ],
            "version": 2
        }"#;
        let state: StorageState = serde_json::from_str(json).unwrap();
        assert_eq!(state.cookies.len(), 1);
        assert!(state.cookies[0].is_session());
        assert!(state.cookies[0].http_only);
        assert_eq!(state.origins[0].local_storage[0].value, "v");

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["version"], 2);
        assert_eq!(back["cookies"][0]["httpOnly"], true);
    }

    #[test]
    fn test_minimal_cookie_defaults() {
        let c: StoredCookie =
            serde_json::from_str(r#"{"name":"a","value":"b","domain":"x.com"}"#).unwrap();
        assert_eq!(c.path, "/");
        assert!(c.is_session());
        assert!(c.same_site.is_none());
    }
}
