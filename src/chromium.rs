//! Chromium-family driver over CDP.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, SetCookiesParams, TimeSinceEpoch,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::automation::{
    AutomationDriver, BrowserSession, LaunchSpec, OriginStorage, PageInfo, StorageState,
    StoredCookie,
};
use crate::browser::BrowserDetector;
use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::persist;

const LOCAL_STORAGE_SCRIPT: &str = r#"(() => ({
    origin: location.origin,
    localStorage: Object.keys(localStorage).map(k => ({ name: k, value: localStorage.getItem(k) }))
}))()"#;

/// Launches Chrome, Brave, Chromium or Edge through chromiumoxide.
#[derive(Debug, Clone)]
pub struct ChromiumDriver {
    config: BrowserConfig,
}

impl ChromiumDriver {
    /// Driver using the given browser settings.
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn cdp_config(&self, spec: &LaunchSpec) -> Result<CdpConfig> {
        let install = BrowserDetector::resolve(self.config.executable_path.as_deref())?;
        tracing::info!(
            "Using {} browser at {:?}",
            install.browser_type,
            install.executable_path
        );

        let mut builder = CdpConfig::builder()
            .chrome_executable(&install.executable_path)
            .user_data_dir(&spec.identity_dir)
            .request_timeout(spec.navigation_timeout)
            .viewport(Viewport {
                width: self.config.window_width,
                height: self.config.window_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            });

        if !spec.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.arg("--no-sandbox");
        }
        for arg in &self.config.args {
            builder = builder.arg(arg);
        }
        builder = builder.arg("--disable-blink-features=AutomationControlled");

        builder.build().map_err(Error::AuthAutomation)
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserSession>> {
        std::fs::create_dir_all(&spec.identity_dir)
            .map_err(|e| Error::persistence(&spec.identity_dir, e))?;
        let cdp_config = self.cdp_config(spec)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| Error::AuthAutomation(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("Browser handler error: {}", e);
                }
            }
        });

        let mut session = ChromiumSession {
            browser: Some(browser),
            page: None,
            handler: Some(handler),
            navigation_timeout: spec.navigation_timeout,
        };

        // From here on a failure must still tear the browser down.
        if let Err(e) = session.open_page(spec).await {
            if let Err(close_err) = session.close().await {
                tracing::warn!("Failed to close browser after launch error: {}", close_err);
            }
            return Err(e);
        }

        tracing::debug!(identity = ?spec.identity_dir, headless = spec.headless, "Browser launched");
        Ok(Box::new(session))
    }
}

/// A running browser with one page.
struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    async fn open_page(&mut self, spec: &LaunchSpec) -> Result<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| Error::AuthAutomation("browser is closed".into()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::AuthAutomation(format!("Failed to create page: {}", e)))?;

        let restored = match persist::read_json::<StorageState>(&spec.storage_state) {
            Ok(state) => state.map(|s| s.cookies).unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable storage state: {}", e);
                Vec::new()
            }
        };
        if !restored.is_empty() {
            let params: Vec<CookieParam> = restored.iter().filter_map(to_cookie_param).collect();
            let count = params.len();
            page.execute(SetCookiesParams::new(params))
                .await
                .map_err(|e| Error::AuthAutomation(format!("Failed to restore cookies: {}", e)))?;
            tracing::debug!("Restored {} cookies from {:?}", count, spec.storage_state);
        }

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| Error::AuthAutomation("browser is closed".into()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<PageInfo> {
        tracing::debug!("Navigating to: {}", url);
        let page = self.page()?;

        tokio::time::timeout(self.navigation_timeout, page.goto(url))
            .await
            .map_err(|_| {
                Error::AuthAutomation(format!(
                    "Navigation to {} timed out after {:?}",
                    url, self.navigation_timeout
                ))
            })?
            .map_err(|e| Error::AuthAutomation(format!("Navigation failed: {}", e)))?;

        let url = page
            .url()
            .await
            .map_err(|e| Error::AuthAutomation(format!("Failed to get URL: {}", e)))?
            .unwrap_or_default();
        let title = page.get_title().await.ok().flatten();

        Ok(PageInfo { url, title })
    }

    async fn current_url(&mut self) -> Result<String> {
        self.page()?
            .url()
            .await
            .map(|url| url.unwrap_or_default())
            .map_err(|e| Error::AuthAutomation(format!("Failed to get URL: {}", e)))
    }

    async fn storage_state(&mut self) -> Result<StorageState> {
        let page = self.page()?;
        let cookies = page
            .get_cookies()
            .await
            .map_err(|e| Error::AuthAutomation(format!("Failed to get cookies: {}", e)))?;

        let origins = match page.evaluate(LOCAL_STORAGE_SCRIPT).await {
            Ok(result) => match result.into_value::<OriginStorage>() {
                Ok(origin) if origin.origin.starts_with("http") => vec![origin],
                Ok(_) => Vec::new(),
                Err(e) => {
                    tracing::debug!("Skipping localStorage snapshot: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::debug!("Skipping localStorage snapshot: {}", e);
                Vec::new()
            }
        };

        Ok(StorageState {
            cookies: cookies.into_iter().map(from_cdp_cookie).collect(),
            origins,
            ..Default::default()
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.page = None;
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| Error::AuthAutomation(format!("Failed to close browser: {}", e)));
        if let Err(e) = browser.wait().await {
            tracing::debug!("Browser process wait failed: {}", e);
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        tracing::debug!("Browser closed");
        closed
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

fn to_cookie_param(cookie: &StoredCookie) -> Option<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);

    if let Some(same_site) = cookie.same_site.as_deref().and_then(parse_same_site) {
        builder = builder.same_site(same_site);
    }
    if cookie.expires > 0.0 {
        builder = builder.expires(TimeSinceEpoch::new(cookie.expires));
    }

    match builder.build() {
        Ok(param) => Some(param),
        Err(e) => {
            tracing::warn!("Skipping cookie {}: {}", cookie.name, e);
            None
        }
    }
}

fn parse_same_site(value: &str) -> Option<CookieSameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" => Some(CookieSameSite::None),
        _ => None,
    }
}

fn same_site_name(value: &CookieSameSite) -> &'static str {
    match value {
        CookieSameSite::Strict => "Strict",
        CookieSameSite::Lax => "Lax",
        CookieSameSite::None => "None",
    }
}

fn from_cdp_cookie(cookie: Cookie) -> StoredCookie {
    StoredCookie {
        same_site: cookie.same_site.as_ref().map(|s| same_site_name(s).to_string()),
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        expires: if cookie.session { -1.0 } else { cookie.expires },
        http_only: cookie.http_only,
        secure: cookie.secure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(same_site: Option<&str>, expires: f64) -> StoredCookie {
        StoredCookie {
            name: "SID".into(),
            value: "abc".into(),
            domain: ".google.com".into(),
            path: "/".into(),
            expires,
            http_only: true,
            secure: true,
            same_site: same_site.map(String::from),
        }
    }

    #[test]
    fn test_cookie_param_keeps_attributes() {
        let param = to_cookie_param(&stored(Some("Lax"), 1_900_000_000.0)).unwrap();
        assert_eq!(param.name, "SID");
        assert_eq!(param.domain.as_deref(), Some(".google.com"));
        assert_eq!(param.same_site, Some(CookieSameSite::Lax));
        assert!(param.expires.is_some());
        assert_eq!(param.http_only, Some(true));
    }

    #[test]
    fn test_session_cookie_has_no_expiry() {
        let param = to_cookie_param(&stored(None, -1.0)).unwrap();
        assert!(param.expires.is_none());
        assert!(param.same_site.is_none());
    }

    #[test]
    fn test_same_site_parsing() {
        assert_eq!(parse_same_site("strict"), Some(CookieSameSite::Strict));
        assert_eq!(parse_same_site("None"), Some(CookieSameSite::None));
        assert_eq!(parse_same_site("unspecified"), None);
        assert_eq!(same_site_name(&CookieSameSite::Lax), "Lax");
    }

    #[tokio::test]
    async fn test_launch_without_browser_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrowserConfig {
            executable_path: Some(dir.path().join("missing-chrome")),
            ..Default::default()
        };
        let spec = LaunchSpec {
            identity_dir: dir.path().join("browser_profile"),
            storage_state: dir.path().join("state.json"),
            headless: true,
            navigation_timeout: Duration::from_secs(1),
        };
        let err = ChromiumDriver::new(&config).launch(&spec).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
