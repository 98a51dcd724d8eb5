//! Profile registry: the persisted set of profiles and the active pointer.
//!
//! The registry is a single JSON document rewritten in full after every
//! mutation. There is no cross-process locking; concurrent writers race and
//! the last rename wins.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::migration::{self, MigrationOutcome};
use crate::paths::{DataRoot, ProfilePaths};
use crate::persist;
use crate::profile::{is_valid_id, slugify, ExpiryThresholds, Profile, ProfileSummary, ProfileUpdate};

/// Root document of `profiles.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    /// Profile used when none is named.
    #[serde(default)]
    pub active_profile: Option<String>,
    /// All profiles, in creation order.
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Authoritative mapping of profile ids to records.
#[derive(Debug)]
pub struct ProfileRegistry {
    root: DataRoot,
    doc: RegistryDocument,
    thresholds: ExpiryThresholds,
}

impl ProfileRegistry {
    /// Open the registry under `root`, migrating a legacy layout first.
    pub fn open(root: DataRoot) -> Result<Self> {
        std::fs::create_dir_all(root.path())?;

        match migration::migrate_legacy_layout(&root)? {
            MigrationOutcome::Migrated { moved } => {
                tracing::info!(artifacts = moved.len(), "Migrated legacy layout to profile 'default'");
            }
            outcome => tracing::debug!(?outcome, "No legacy migration needed"),
        }

        std::fs::create_dir_all(root.profiles_dir())?;

        let doc = persist::read_json(&root.registry_file())?.unwrap_or_default();
        Ok(Self {
            root,
            doc,
            thresholds: ExpiryThresholds::default(),
        })
    }

    /// Override the expiry thresholds used by `status` and `list`.
    pub fn with_thresholds(mut self, thresholds: ExpiryThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Data root this registry lives in.
    pub fn root(&self) -> &DataRoot {
        &self.root
    }

    /// Current document.
    pub fn document(&self) -> &RegistryDocument {
        &self.doc
    }

    /// All profiles in creation order.
    pub fn profiles(&self) -> &[Profile] {
        &self.doc.profiles
    }

    /// Id of the active profile.
    pub fn active_id(&self) -> Option<&str> {
        self.doc.active_profile.as_deref()
    }

    /// The active profile record.
    pub fn active(&self) -> Option<&Profile> {
        self.active_id().and_then(|id| self.get(id))
    }

    /// Look up a profile.
    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.doc.profiles.iter().find(|p| p.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Profile> {
        self.doc.profiles.iter_mut().find(|p| p.id == id)
    }

    /// Resolve an explicit id, or the active profile when `id` is None.
    pub fn resolve(&self, id: Option<&str>) -> Result<&Profile> {
        match id {
            Some(id) => self
                .get(id)
                .ok_or_else(|| Error::ProfileNotFound(id.to_string())),
            None => {
                let id = self.active_id().ok_or(Error::NoActiveProfile)?;
                self.get(id)
                    .ok_or_else(|| Error::ProfileNotFound(id.to_string()))
            }
        }
    }

    /// Paths for any profile id.
    pub fn paths(&self, id: &str) -> ProfilePaths {
        self.root.profile(id)
    }

    /// Paths for the active profile.
    pub fn active_paths(&self) -> Result<ProfilePaths> {
        let id = self.active_id().ok_or(Error::NoActiveProfile)?;
        Ok(self.paths(id))
    }

    /// Create a profile from a display name.
    ///
    /// Becomes active if no profile is active yet.
    pub fn create(&mut self, name: &str) -> Result<Profile> {
        let id = slugify(name);
        if !is_valid_id(&id) {
            return Err(Error::Config(format!(
                "invalid profile name {:?}: ids may only contain a-z, 0-9 and '-'",
                name
            )));
        }
        if self.get(&id).is_some() {
            return Err(Error::DuplicateProfile(id));
        }

        self.paths(&id).ensure_dirs()?;

        let profile = Profile::new(&id, name, Utc::now());
        self.doc.profiles.push(profile.clone());
        if self.doc.active_profile.is_none() {
            self.doc.active_profile = Some(id.clone());
        }
        self.save()?;

        tracing::info!(profile = %id, "Created profile {}", name);
        Ok(profile)
    }

    /// Delete a profile and everything stored under it.
    ///
    /// Returns false if `id` is unknown.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        if self.get(id).is_none() {
            tracing::warn!(profile = %id, "Profile not found");
            return Ok(false);
        }

        let dir = self.paths(id).profile_dir;
        if !is_valid_id(id) || dir.parent() != Some(self.root.profiles_dir().as_path()) {
            return Err(Error::Config(format!(
                "refusing to delete {:?}: not a directory under {:?}",
                dir,
                self.root.profiles_dir()
            )));
        }
        persist::remove_dir_if_exists(&dir)?;

        self.doc.profiles.retain(|p| p.id != id);
        if self.doc.active_profile.as_deref() == Some(id) {
            // First remaining by creation order.
            self.doc.active_profile = self.doc.profiles.first().map(|p| p.id.clone());
        }
        self.save()?;

        tracing::info!(profile = %id, "Deleted profile");
        Ok(true)
    }

    /// Make `id` the active profile.
    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::ProfileNotFound(id.to_string()));
        }
        self.doc.active_profile = Some(id.to_string());
        self.save()?;
        tracing::info!(profile = %id, "Active profile set");
        Ok(())
    }

    /// Apply a partial update to a profile.
    pub fn update(&mut self, id: &str, update: ProfileUpdate) -> Result<Profile> {
        let profile = self
            .get_mut(id)
            .ok_or_else(|| Error::ProfileNotFound(id.to_string()))?;
        update.apply(profile);
        let updated = profile.clone();
        self.save()?;
        Ok(updated)
    }

    /// Status of a profile as of now.
    pub fn status(&self, profile: &Profile) -> crate::profile::AuthStatus {
        profile.status_at(Utc::now(), &self.thresholds)
    }

    /// Every profile annotated with status, age and the active flag.
    pub fn list(&self) -> Vec<ProfileSummary> {
        let now = Utc::now();
        self.doc
            .profiles
            .iter()
            .map(|p| {
                let is_active = self.active_id() == Some(p.id.as_str());
                ProfileSummary::at(p, is_active, now, &self.thresholds)
            })
            .collect()
    }

    fn save(&self) -> Result<()> {
        persist::write_json_atomic(&self.root.registry_file(), &self.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::AuthStatus;
    use chrono::Duration as ChronoDuration;

    fn open(dir: &tempfile::TempDir) -> ProfileRegistry {
        ProfileRegistry::open(DataRoot::new(dir.path())).unwrap()
    }

    #[test]
    fn test_fresh_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = open(&dir);
        assert!(reg.profiles().is_empty());
        assert!(reg.active_id().is_none());
        assert!(dir.path().join("profiles").is_dir());
        assert!(matches!(reg.active_paths(), Err(Error::NoActiveProfile)));
        assert!(matches!(reg.resolve(None), Err(Error::NoActiveProfile)));
    }

    #[test]
    fn test_end_to_end_active_profile_flow() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);

        let alice = reg.create("Alice").unwrap();
        assert_eq!(alice.id, "alice");
        assert_eq!(reg.active_id(), Some("alice"));

        let bob = reg.create("Bob").unwrap();
        assert_eq!(bob.id, "bob");
        assert_eq!(reg.active_id(), Some("alice"));

        reg.set_active("bob").unwrap();
        assert_eq!(reg.active_id(), Some("bob"));

        assert!(reg.delete("bob").unwrap());
        assert_eq!(reg.active_id(), Some("alice"));

        let reopened = open(&dir);
        assert_eq!(reopened.active_id(), Some("alice"));
        assert_eq!(reopened.profiles().len(), 1);
    }

    #[test]
    fn test_create_makes_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Work Account").unwrap();
        assert!(dir
            .path()
            .join("profiles/work-account/browser_state")
            .is_dir());
    }

    #[test]
    fn test_duplicate_slug_rejected_and_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("My Profile").unwrap();
        let before = reg.document().clone();

        let err = reg.create("my_profile").unwrap_err();
        assert!(matches!(err, Error::DuplicateProfile(ref id) if id == "my-profile"));
        assert_eq!(reg.document(), &before);
        assert_eq!(open(&dir).document(), &before);
    }

    #[test]
    fn test_create_then_delete_restores_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Alice").unwrap();
        let before = reg.document().clone();

        reg.create("Carol").unwrap();
        assert!(reg.delete("carol").unwrap());
        assert_eq!(reg.document(), &before);
        assert!(!dir.path().join("profiles/carol").exists());
    }

    #[test]
    fn test_delete_only_profile_clears_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Solo").unwrap();
        assert!(reg.delete("solo").unwrap());
        assert!(reg.active_id().is_none());
        assert!(reg.profiles().is_empty());
    }

    #[test]
    fn test_delete_non_active_keeps_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Alice").unwrap();
        reg.create("Bob").unwrap();
        assert!(reg.delete("bob").unwrap());
        assert_eq!(reg.active_id(), Some("alice"));
    }

    #[test]
    fn test_delete_unknown_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        assert!(!reg.delete("ghost").unwrap());
    }

    #[test]
    fn test_set_active_unknown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Alice").unwrap();
        assert!(matches!(
            reg.set_active("ghost"),
            Err(Error::ProfileNotFound(_))
        ));
        assert_eq!(reg.active_id(), Some("alice"));
    }

    #[test]
    fn test_update_persists_and_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        let created = reg.create("Alice").unwrap();

        let at = Utc::now();
        reg.update(
            "alice",
            ProfileUpdate::default()
                .authenticated_at(Some(at))
                .email(Some("alice@example.com".into())),
        )
        .unwrap();

        let reopened = open(&dir);
        let p = reopened.get("alice").unwrap();
        assert_eq!(p.email.as_deref(), Some("alice@example.com"));
        let drift = (p.authenticated_at.unwrap() - at).num_milliseconds().abs();
        assert!(drift <= 1);
        assert_eq!(p.created_at.timestamp(), created.created_at.timestamp());

        assert!(matches!(
            reg.update("ghost", ProfileUpdate::default()),
            Err(Error::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_list_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Alice").unwrap();
        reg.create("Bob").unwrap();
        reg.update(
            "bob",
            ProfileUpdate::default().authenticated_at(Some(Utc::now() - ChronoDuration::days(6))),
        )
        .unwrap();

        let list = reg.list();
        assert_eq!(list.len(), 2);
        assert!(list[0].is_active);
        assert_eq!(list[0].status, AuthStatus::NotAuthenticated);
        assert!(!list[1].is_active);
        assert_eq!(list[1].status, AuthStatus::ExpiringSoon);
        assert_eq!(list[1].expires_in_days, Some(1.0));
    }

    #[test]
    fn test_resolve_explicit_and_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Alice").unwrap();
        reg.create("Bob").unwrap();
        assert_eq!(reg.resolve(None).unwrap().id, "alice");
        assert_eq!(reg.resolve(Some("bob")).unwrap().id, "bob");
        assert!(matches!(
            reg.resolve(Some("ghost")),
            Err(Error::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        assert!(matches!(reg.create("   "), Err(Error::Config(_))));
    }

    #[test]
    fn test_path_like_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Alice").unwrap();

        for name in ["..", ".", "../../outside", "a/b", "a\\b", "x/../.."] {
            assert!(
                matches!(reg.create(name), Err(Error::Config(_))),
                "accepted {:?}",
                name
            );
        }
        assert_eq!(reg.profiles().len(), 1);
        assert!(!dir.path().parent().unwrap().join("outside").exists());
        assert!(!dir.path().join("outside").exists());
        assert!(dir.path().join("profiles").join("alice").is_dir());
    }

    #[test]
    fn test_delete_refuses_ids_outside_profiles_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = open(&dir);
        reg.create("Alice").unwrap();

        // A hand-edited registry can still carry a dot-segment id.
        reg.doc.profiles.push(Profile::new("..", "Dots", Utc::now()));
        assert!(matches!(reg.delete(".."), Err(Error::Config(_))));

        assert!(dir.path().join("profiles").join("alice").is_dir());
        assert!(reg.root.registry_file().exists());
        assert!(reg.get("alice").is_some());
    }
}
