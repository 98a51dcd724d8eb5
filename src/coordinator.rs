//! Authentication flows for a profile.
//!
//! Each invocation walks `Idle → AwaitingLogin → Authenticated | TimedOut | Failed`.
//! A browser that fails to launch, a login that never completes, or a
//! session that bounces to the sign-in page are reported as an
//! [`AuthOutcome`]; only an unresolvable profile or a failed write comes
//! back as `Err`.
//!
//! Every session opened through the driver is closed before the flow
//! returns, whichever way it ends.

use std::time::Duration;

use chrono::Utc;

use crate::automation::{AutomationDriver, BrowserSession, LaunchSpec, PageInfo, StorageState};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::{LinkCheck, LinkStatus, Notebook, NotebookLibrary};
use crate::notebooklm::{self, NotebookLanding};
use crate::profile::ProfileUpdate;
use crate::registry::ProfileRegistry;
use crate::store::{Freshness, SessionReport, SessionStore};

/// Where an authentication flow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing started.
    Idle,
    /// Browser is open, waiting for the user to sign in.
    AwaitingLogin,
    /// The browser reached the target origin and state was saved.
    Authenticated,
    /// The login wait expired.
    TimedOut,
    /// Launch, navigation or validation failed.
    Failed,
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthState::Idle => "idle",
            AuthState::AwaitingLogin => "awaiting login",
            AuthState::Authenticated => "authenticated",
            AuthState::TimedOut => "timed out",
            AuthState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of an authentication flow.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    /// Terminal state reached.
    pub state: AuthState,
    /// Profile the flow ran for.
    pub profile_id: String,
    /// Human-readable reason for a non-success state.
    pub detail: Option<String>,
    /// Suggested recovery command.
    pub remediation: Option<String>,
    /// Running the same flow again may succeed.
    pub retryable: bool,
}

impl AuthOutcome {
    fn authenticated(profile_id: &str) -> Self {
        Self {
            state: AuthState::Authenticated,
            profile_id: profile_id.to_string(),
            detail: None,
            remediation: None,
            retryable: false,
        }
    }

    fn from_error(state: AuthState, profile_id: &str, error: &Error) -> Self {
        Self {
            state,
            profile_id: profile_id.to_string(),
            detail: Some(error.to_string()),
            remediation: error.remediation(),
            retryable: error.is_retryable(),
        }
    }

    fn failed(profile_id: &str, detail: impl Into<String>, remediation: Option<String>) -> Self {
        Self {
            state: AuthState::Failed,
            profile_id: profile_id.to_string(),
            detail: Some(detail.into()),
            remediation,
            retryable: false,
        }
    }

    /// Whether the flow ended authenticated.
    pub fn is_success(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}

/// Runs login, validation and clearing against a profile registry.
pub struct AuthCoordinator<'a, D: AutomationDriver> {
    registry: &'a mut ProfileRegistry,
    driver: D,
    config: Config,
}

impl<'a, D: AutomationDriver> AuthCoordinator<'a, D> {
    /// Coordinator over `registry`, launching browsers through `driver`.
    pub fn new(registry: &'a mut ProfileRegistry, driver: D, config: Config) -> Self {
        Self {
            registry,
            driver,
            config,
        }
    }

    /// The registry this coordinator updates.
    pub fn registry(&self) -> &ProfileRegistry {
        &*self.registry
    }

    /// Session store of profile `id`.
    pub fn store_for(&self, id: &str) -> SessionStore {
        SessionStore::new(id, self.registry.paths(id), self.config.auth.freshness_window)
    }

    /// Session summary of a profile (active when `profile` is None).
    pub fn status(&self, profile: Option<&str>) -> Result<SessionReport> {
        let id = self.registry.resolve(profile)?.id.clone();
        Ok(self.store_for(&id).report())
    }

    /// Interactive login.
    ///
    /// Opens the target origin in a browser bound to the profile's identity
    /// directory and waits up to `timeout` (the configured login timeout when
    /// None) for the user to land on an authenticated page.
    pub async fn setup(
        &mut self,
        profile: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<AuthOutcome> {
        let id = self.registry.resolve(profile)?.id.clone();
        let store = self.store_for(&id);
        store
            .paths()
            .ensure_dirs()
            .map_err(|e| Error::persistence(&store.paths().browser_state_dir, e))?;
        let timeout = timeout.unwrap_or(self.config.auth.login_timeout);

        tracing::info!(profile = %id, "Starting authentication setup");
        enter(AuthState::Idle, &id);

        let spec = self.launch_spec(&store, self.config.browser.headless);
        let mut session = match self.driver.launch(&spec).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(profile = %id, "Browser launch failed: {}", e);
                enter(AuthState::Failed, &id);
                return Ok(AuthOutcome::from_error(AuthState::Failed, &id, &e));
            }
        };

        let result = self.login(session.as_mut(), &id, timeout).await;
        close_session(session.as_mut(), &id).await;

        match result {
            Ok(Some(state)) => {
                store.write(self.registry, &state)?;
                enter(AuthState::Authenticated, &id);
                tracing::info!(profile = %id, "Authentication successful");
                Ok(AuthOutcome::authenticated(&id))
            }
            Ok(None) => {
                let e = Error::AuthTimeout {
                    profile: id.clone(),
                    timeout_secs: timeout.as_secs(),
                };
                enter(AuthState::TimedOut, &id);
                tracing::warn!(profile = %id, "{}", e);
                Ok(AuthOutcome::from_error(AuthState::TimedOut, &id, &e))
            }
            Err(e) => {
                enter(AuthState::Failed, &id);
                tracing::error!(profile = %id, "Authentication failed: {}", e);
                Ok(AuthOutcome::from_error(AuthState::Failed, &id, &e))
            }
        }
    }

    /// Check that the stored session still reaches the target origin.
    ///
    /// Without a stored session nothing is launched. A stale session is
    /// still tried. On success `last_validated` is recorded.
    pub async fn validate(&mut self, profile: Option<&str>) -> Result<AuthOutcome> {
        let id = self.registry.resolve(profile)?.id.clone();
        let store = self.store_for(&id);

        match store.freshness() {
            Freshness::Missing => {
                tracing::info!(profile = %id, "No saved session to validate");
                return Ok(AuthOutcome::failed(
                    &id,
                    "no saved browser state",
                    Some(format!("nlmkit setup --profile {}", id)),
                ));
            }
            Freshness::Stale(age) => tracing::warn!(
                profile = %id,
                "Browser state is {:.1} days old; validating anyway",
                age.as_secs_f64() / 86_400.0
            ),
            Freshness::Fresh(_) => {}
        }

        tracing::info!(profile = %id, "Validating authentication");
        let spec = self.launch_spec(&store, true);
        let mut session = match self.driver.launch(&spec).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(profile = %id, "Browser launch failed: {}", e);
                return Ok(AuthOutcome::from_error(AuthState::Failed, &id, &e));
            }
        };

        let result = session.navigate(&self.config.auth.target_url).await;
        close_session(session.as_mut(), &id).await;

        match result {
            Ok(page) if notebooklm::is_authenticated_url(&page.url) => {
                self.registry.update(
                    &id,
                    ProfileUpdate::default().last_validated(Some(Utc::now())),
                )?;
                tracing::info!(profile = %id, "Authentication is valid");
                Ok(AuthOutcome::authenticated(&id))
            }
            Ok(page) => {
                let detail = if notebooklm::is_login_redirect(&page.url) {
                    "redirected to login".to_string()
                } else {
                    format!("unexpected page: {}", page.url)
                };
                tracing::warn!(profile = %id, "Authentication invalid: {}", detail);
                Ok(AuthOutcome::failed(
                    &id,
                    detail,
                    Some(format!("nlmkit reauth --profile {}", id)),
                ))
            }
            Err(e) => {
                tracing::error!(profile = %id, "Validation failed: {}", e);
                Ok(AuthOutcome::from_error(AuthState::Failed, &id, &e))
            }
        }
    }

    /// Remove stored session state and forget the login time.
    pub fn clear(&mut self, profile: Option<&str>) -> Result<()> {
        let id = self.registry.resolve(profile)?.id.clone();
        self.store_for(&id).clear()?;
        self.registry
            .update(&id, ProfileUpdate::default().authenticated_at(None))?;
        Ok(())
    }

    /// Clear, then run [`setup`](Self::setup) again.
    ///
    /// A failed clear is logged and does not prevent the new login.
    pub async fn re_auth(
        &mut self,
        profile: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<AuthOutcome> {
        tracing::info!("Starting re-authentication");
        if let Err(e) = self.clear(profile) {
            tracing::warn!("Failed to clear previous session: {}", e);
        }
        self.setup(profile, timeout).await
    }

    /// Open `url` with a profile's stored session and report where it lands.
    ///
    /// Best effort; any failure is logged and yields None.
    pub async fn inspect(
        &mut self,
        profile: Option<&str>,
        url: &str,
    ) -> Result<Option<PageInfo>> {
        let id = self.registry.resolve(profile)?.id.clone();
        let store = self.store_for(&id);
        let spec = self.launch_spec(&store, true);

        let mut session = match self.driver.launch(&spec).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(profile = %id, "Cannot open {}: {}", url, e);
                return Ok(None);
            }
        };
        let result = session.navigate(url).await;
        close_session(session.as_mut(), &id).await;

        match result {
            Ok(page) => Ok(Some(page)),
            Err(e) => {
                tracing::warn!(profile = %id, "Cannot open {}: {}", url, e);
                Ok(None)
            }
        }
    }

    /// Open every notebook in a profile's library with its stored session
    /// and record whether each link still works.
    ///
    /// The session is checked against the target origin first; a signed-out
    /// session fails with [`Error::NotAuthenticated`] before any notebook is
    /// opened. One browser serves every check.
    pub async fn check_notebooks(&mut self, profile: Option<&str>) -> Result<Vec<LinkCheck>> {
        let id = self.registry.resolve(profile)?.id.clone();
        let store = self.store_for(&id);
        let mut library = NotebookLibrary::open(store.paths())?;
        let notebooks: Vec<Notebook> = library.list().into_iter().cloned().collect();
        if notebooks.is_empty() {
            return Ok(Vec::new());
        }
        if !store.exists() {
            return Err(Error::NotAuthenticated(id));
        }

        tracing::info!(profile = %id, "Checking {} notebook links", notebooks.len());
        let spec = self.launch_spec(&store, true);
        let mut session = self.driver.launch(&spec).await?;
        let result = check_links(
            session.as_mut(),
            &self.config.auth.target_url,
            &notebooks,
            &id,
        )
        .await;
        close_session(session.as_mut(), &id).await;

        let checks = result?;
        library.record_checks(&checks)?;
        Ok(checks)
    }

    fn launch_spec(&self, store: &SessionStore, headless: bool) -> LaunchSpec {
        LaunchSpec {
            identity_dir: store.paths().browser_profile_dir.clone(),
            storage_state: store.paths().state_file.clone(),
            headless,
            navigation_timeout: self.config.browser.navigation_timeout,
        }
    }

    /// Navigate, then wait for an authenticated URL.
    ///
    /// `Ok(None)` means the wait expired.
    async fn login(
        &self,
        session: &mut dyn BrowserSession,
        id: &str,
        timeout: Duration,
    ) -> Result<Option<StorageState>> {
        let page = session.navigate(&self.config.auth.target_url).await?;
        if notebooklm::is_authenticated_url(&page.url) {
            tracing::info!(profile = %id, "Already authenticated");
            return session.storage_state().await.map(Some);
        }

        enter(AuthState::AwaitingLogin, id);
        tracing::info!(
            profile = %id,
            "Waiting for login (up to {} minutes)",
            timeout.as_secs() / 60
        );

        let poll_interval = self.config.auth.poll_interval;
        let wait = async {
            loop {
                let url = session.current_url().await?;
                if notebooklm::is_authenticated_url(&url) {
                    return Ok::<_, Error>(());
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(())) => {
                tracing::info!(profile = %id, "Login detected");
                session.storage_state().await.map(Some)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

async fn check_links(
    session: &mut dyn BrowserSession,
    home: &str,
    notebooks: &[Notebook],
    profile: &str,
) -> Result<Vec<LinkCheck>> {
    let page = session.navigate(home).await?;
    if !notebooklm::is_authenticated_url(&page.url) {
        tracing::warn!(profile = %profile, "Session is signed out");
        return Err(Error::NotAuthenticated(profile.to_string()));
    }

    let mut checks = Vec::with_capacity(notebooks.len());
    for notebook in notebooks {
        let (status, reason) = match session.navigate(&notebook.url).await {
            Ok(page) => match notebooklm::classify_landing(&notebook.url, &page.url) {
                NotebookLanding::Notebook => (LinkStatus::Active, "accessible".to_string()),
                NotebookLanding::Login => (LinkStatus::Inactive, "redirected to login".to_string()),
                NotebookLanding::Redirected => (
                    LinkStatus::Inactive,
                    "redirected away (not found or no access)".to_string(),
                ),
                NotebookLanding::Foreign => {
                    (LinkStatus::Inactive, format!("unexpected page: {}", page.url))
                }
            },
            Err(e) => (LinkStatus::Error, e.to_string()),
        };
        tracing::info!(
            profile = %profile,
            notebook = %notebook.id,
            status = %status,
            "{}",
            reason
        );
        checks.push(LinkCheck {
            notebook_id: notebook.id.clone(),
            name: notebook.name.clone(),
            url: notebook.url.clone(),
            status,
            reason,
        });
    }
    Ok(checks)
}

fn enter(state: AuthState, profile: &str) {
    tracing::debug!(profile = %profile, state = %state, "Auth state");
}

async fn close_session(session: &mut dyn BrowserSession, profile: &str) {
    if let Err(e) = session.close().await {
        tracing::warn!(profile = %profile, "Failed to close browser: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_timeout_carries_hint() {
        let e = Error::AuthTimeout {
            profile: "work".into(),
            timeout_secs: 60,
        };
        let outcome = AuthOutcome::from_error(AuthState::TimedOut, "work", &e);
        assert!(!outcome.is_success());
        assert!(outcome.detail.unwrap().contains("60"));
        assert!(outcome.retryable);
        assert!(outcome.remediation.unwrap().contains("reauth --profile work"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AuthState::AwaitingLogin.to_string(), "awaiting login");
        assert!(AuthOutcome::authenticated("a").is_success());
        assert!(!AuthOutcome::failed("a", "redirected to login", None).retryable);
    }
}
