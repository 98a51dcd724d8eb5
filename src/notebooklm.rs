//! NotebookLM (Google) origin facts.
//!
//! Login happens on Google's account pages; a session is considered live
//! once the browser settles on the NotebookLM origin itself.

use std::sync::OnceLock;

use regex::Regex;

/// NotebookLM home.
pub const BASE_URL: &str = "https://notebooklm.google.com";

/// Host of Google's sign-in flow.
pub const LOGIN_HOST: &str = "accounts.google.com";

fn authenticated_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https://notebooklm\.google\.com/").expect("valid regex"))
}

fn notebook_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/notebook/([a-f0-9-]+)").expect("valid regex"))
}

/// Whether `url` is on the NotebookLM origin (not merely mentioning it).
pub fn is_authenticated_url(url: &str) -> bool {
    authenticated_re().is_match(url) && !is_login_redirect(url)
}

/// Whether `url` is part of Google's sign-in flow.
pub fn is_login_redirect(url: &str) -> bool {
    url.contains(LOGIN_HOST)
}

/// Notebook UUID from a notebook URL.
pub fn notebook_id_from_url(url: &str) -> Option<String> {
    notebook_id_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Where opening a notebook URL ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotebookLanding {
    /// The requested notebook loaded.
    Notebook,
    /// Sent to Google sign-in.
    Login,
    /// Bounced elsewhere on the origin (missing notebook or no access).
    Redirected,
    /// Left the NotebookLM origin.
    Foreign,
}

/// Classify the page a browser settled on after opening `requested`.
pub fn classify_landing(requested: &str, landed: &str) -> NotebookLanding {
    if is_login_redirect(landed) {
        return NotebookLanding::Login;
    }
    if !is_authenticated_url(landed) {
        return NotebookLanding::Foreign;
    }
    let same = match notebook_id_from_url(requested) {
        Some(want) => notebook_id_from_url(landed).as_deref() == Some(want.as_str()),
        None => {
            let base = requested.split(|c| c == '?' || c == '#').next().unwrap_or(requested);
            landed.starts_with(base)
        }
    };
    if same {
        NotebookLanding::Notebook
    } else {
        NotebookLanding::Redirected
    }
}

/// Notebook display name from a page title, dropping the app suffix.
pub fn title_to_name(title: &str) -> Option<String> {
    let title = title.trim();
    let name = title
        .rsplit_once(" - NotebookLM")
        .map(|(name, _)| name.trim())
        .unwrap_or(title);
    if name.is_empty() || name == "NotebookLM" {
        None
    } else {
        Some(name.to_string())
    }
}
