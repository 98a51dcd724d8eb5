//! Per-profile session state: the storage-state snapshot and auth metadata.
//!
//! Freshness is derived from the snapshot's modification time and is only
//! advisory. A stale snapshot is still handed to the browser; callers are
//! told about it so they can suggest re-authentication.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::automation::StorageState;
use crate::error::Result;
use crate::paths::ProfilePaths;
use crate::persist;
use crate::profile::ProfileUpdate;
use crate::registry::ProfileRegistry;
use crate::timestamp;

/// Contents of `auth_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Login time.
    #[serde(with = "timestamp::epoch")]
    pub authenticated_at: DateTime<Utc>,
    /// Same instant, human readable.
    pub authenticated_at_iso: String,
}

impl AuthInfo {
    /// Record for a login at `at`.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            authenticated_at: at,
            authenticated_at_iso: at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }
}

/// Advisory freshness of a stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No snapshot on disk.
    Missing,
    /// Snapshot is within the freshness window.
    Fresh(Duration),
    /// Snapshot is older than the window but still usable.
    Stale(Duration),
}

impl Freshness {
    /// Whether a snapshot exists at all.
    pub fn exists(&self) -> bool {
        !matches!(self, Freshness::Missing)
    }
}

/// Summary used by status reporting.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Profile the report is for.
    pub profile_id: String,
    /// Snapshot location.
    pub state_file: PathBuf,
    /// Freshness of the snapshot.
    pub freshness: Freshness,
    /// Stored auth metadata, if readable.
    pub auth_info: Option<AuthInfo>,
}

/// Session artifacts of one profile.
#[derive(Debug, Clone)]
pub struct SessionStore {
    profile_id: String,
    paths: ProfilePaths,
    freshness_window: Duration,
}

impl SessionStore {
    /// Store for `profile_id` at `paths`.
    pub fn new(profile_id: impl Into<String>, paths: ProfilePaths, freshness_window: Duration) -> Self {
        Self {
            profile_id: profile_id.into(),
            paths,
            freshness_window,
        }
    }

    /// Profile this store belongs to.
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Paths of this profile.
    pub fn paths(&self) -> &ProfilePaths {
        &self.paths
    }

    /// Whether a storage-state snapshot exists.
    pub fn exists(&self) -> bool {
        self.paths.state_file.is_file()
    }

    /// Wall-clock time since the snapshot was last written.
    ///
    /// Fails if there is no snapshot.
    pub fn age(&self) -> Result<Duration> {
        let modified = std::fs::metadata(&self.paths.state_file)?.modified()?;
        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }

    /// Snapshot exists and is within the freshness window.
    pub fn is_fresh(&self) -> bool {
        matches!(self.freshness(), Freshness::Fresh(_))
    }

    /// Freshness signal for callers and collaborators.
    pub fn freshness(&self) -> Freshness {
        if !self.exists() {
            return Freshness::Missing;
        }
        match self.age() {
            Ok(age) if age <= self.freshness_window => Freshness::Fresh(age),
            Ok(age) => Freshness::Stale(age),
            Err(e) => {
                tracing::warn!(profile = %self.profile_id, "Cannot stat session state: {}", e);
                Freshness::Missing
            }
        }
    }

    /// Parsed snapshot, if present and readable.
    pub fn read_state(&self) -> Option<StorageState> {
        read_lenient(&self.paths.state_file, &self.profile_id)
    }

    /// Stored auth metadata, if present and readable.
    pub fn auth_info(&self) -> Option<AuthInfo> {
        read_lenient(&self.paths.auth_info_file, &self.profile_id)
    }

    /// Persist a fresh snapshot and record the login.
    ///
    /// Writes the snapshot, the auth-info record, then `authenticated_at` in
    /// the registry.
    pub fn write(&self, registry: &mut ProfileRegistry, state: &StorageState) -> Result<AuthInfo> {
        self.paths.ensure_dirs()?;
        persist::write_json_atomic(&self.paths.state_file, state)?;

        let info = AuthInfo::at(Utc::now());
        persist::write_json_atomic(&self.paths.auth_info_file, &info)?;

        registry.update(
            &self.profile_id,
            ProfileUpdate::default().authenticated_at(Some(info.authenticated_at)),
        )?;

        tracing::info!(
            profile = %self.profile_id,
            cookies = state.cookies.len(),
            "Saved browser state to {:?}",
            self.paths.state_file
        );
        Ok(info)
    }

    /// Remove the snapshot, auth metadata and all session artifacts.
    ///
    /// Leaves an empty session-artifact directory behind. Clearing an
    /// already-cleared profile succeeds.
    pub fn clear(&self) -> Result<()> {
        if persist::remove_file_if_exists(&self.paths.state_file)? {
            tracing::debug!(profile = %self.profile_id, "Removed browser state");
        }
        if persist::remove_file_if_exists(&self.paths.auth_info_file)? {
            tracing::debug!(profile = %self.profile_id, "Removed auth info");
        }
        persist::remove_dir_if_exists(&self.paths.browser_state_dir)?;
        self.paths.ensure_dirs()?;

        tracing::info!(profile = %self.profile_id, "Cleared session data");
        Ok(())
    }

    /// Combined status for reporting.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            profile_id: self.profile_id.clone(),
            state_file: self.paths.state_file.clone(),
            freshness: self.freshness(),
            auth_info: self.auth_info(),
        }
    }
}

fn read_lenient<T: serde::de::DeserializeOwned>(path: &std::path::Path, profile: &str) -> Option<T> {
    match persist::read_json(path) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(profile = %profile, "Ignoring unreadable {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::StoredCookie;
    use crate::paths::DataRoot;

    const WEEK: Duration = Duration::from_secs(7 * 86_400);

    fn setup() -> (tempfile::TempDir, ProfileRegistry, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = ProfileRegistry::open(DataRoot::new(dir.path())).unwrap();
        reg.create("Alice").unwrap();
        let store = SessionStore::new("alice", reg.paths("alice"), WEEK);
        (dir, reg, store)
    }

    fn state() -> StorageState {
        StorageState {
            cookies: vec![StoredCookie {
                name: "SID".into(),
                value: "v".into(),
                domain: ".google.com".into(),
                path: "/".into(),
                expires: -1.0,
                http_only: true,
                secure: true,
                same_site: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_state() {
        let (_dir, _reg, store) = setup();
        assert!(!store.exists());
        assert!(!store.is_fresh());
        assert_eq!(store.freshness(), Freshness::Missing);
        assert!(store.age().is_err());
        assert!(store.read_state().is_none());
    }

    #[test]
    fn test_write_then_fresh() {
        let (_dir, mut reg, store) = setup();
        let info = store.write(&mut reg, &state()).unwrap();

        assert!(store.exists());
        assert!(store.is_fresh());
        assert!(store.age().unwrap() < Duration::from_secs(60));
        assert_eq!(store.read_state().unwrap(), state());
        assert_eq!(store.auth_info().unwrap(), info);
        assert_eq!(
            reg.get("alice").unwrap().authenticated_at,
            Some(info.authenticated_at)
        );
    }

    #[test]
    fn test_old_state_is_stale_but_present() {
        let (_dir, mut reg, store) = setup();
        store.write(&mut reg, &state()).unwrap();

        let eight_days_ago = SystemTime::now() - Duration::from_secs(8 * 86_400);
        std::fs::File::options()
            .write(true)
            .open(&store.paths().state_file)
            .unwrap()
            .set_modified(eight_days_ago)
            .unwrap();

        assert!(store.exists());
        assert!(!store.is_fresh());
        assert!(matches!(store.freshness(), Freshness::Stale(age) if age > WEEK));
        assert!(store.read_state().is_some());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (_dir, mut reg, store) = setup();
        store.write(&mut reg, &state()).unwrap();
        std::fs::create_dir_all(store.paths().browser_profile_dir.join("Default")).unwrap();

        store.clear().unwrap();
        assert!(!store.exists());
        assert!(store.auth_info().is_none());
        assert!(store.paths().browser_state_dir.is_dir());
        assert_eq!(
            std::fs::read_dir(&store.paths().browser_state_dir)
                .unwrap()
                .count(),
            0
        );

        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_auth_info_reads_as_none() {
        let (_dir, _reg, store) = setup();
        std::fs::write(&store.paths().auth_info_file, "{").unwrap();
        assert!(store.auth_info().is_none());
        assert!(store.report().auth_info.is_none());
    }

    #[test]
    fn test_auth_info_document_shape() {
        let at = crate::timestamp::from_epoch(1_700_000_000.0).unwrap();
        let value = serde_json::to_value(AuthInfo::at(at)).unwrap();
        assert_eq!(value["authenticated_at"], 1_700_000_000.0);
        assert_eq!(value["authenticated_at_iso"], "2023-11-14T22:13:20Z");
    }
}
