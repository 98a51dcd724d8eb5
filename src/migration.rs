//! One-shot upgrade of the single-account layout to the profile layout.
//!
//! Legacy artifacts are moved into a staging tree first; the staging tree
//! becomes `profiles/` with a single rename at the end. Until that rename
//! happens the profiles root does not exist, so an interrupted run is
//! detected and resumed on the next start. After it, detection is negative
//! no matter what reappears at the root.

use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::paths::{DataRoot, ProfilePaths};
use crate::persist;
use crate::profile::Profile;
use crate::registry::RegistryDocument;
use crate::timestamp;

/// Id of the profile synthesized from a legacy layout.
pub const DEFAULT_PROFILE_ID: &str = "default";
const DEFAULT_PROFILE_NAME: &str = "Default";

/// What a migration attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing to migrate (fresh install).
    NotNeeded,
    /// The profiles root already exists.
    AlreadyMigrated,
    /// Legacy artifacts were moved into the default profile.
    Migrated {
        /// Final locations of the moved artifacts.
        moved: Vec<PathBuf>,
    },
}

#[derive(Deserialize)]
struct LegacyAuthInfo {
    #[serde(default)]
    authenticated_at: Option<f64>,
}

/// Migrate a legacy layout under `root`, if there is one.
pub fn migrate_legacy_layout(root: &DataRoot) -> Result<MigrationOutcome> {
    if root.profiles_dir().exists() {
        return Ok(MigrationOutcome::AlreadyMigrated);
    }

    let legacy = root.legacy();
    let staging = root.staging_dir();
    if !legacy.any_exists() && !staging.exists() {
        return Ok(MigrationOutcome::NotNeeded);
    }

    if staging.exists() {
        tracing::warn!("Resuming interrupted migration from {:?}", staging);
    } else {
        tracing::info!("Migrating legacy data layout to multi-profile structure");
    }

    let staged = ProfilePaths::under(staging.join(DEFAULT_PROFILE_ID));
    std::fs::create_dir_all(&staged.profile_dir).map_err(|e| migration_error("staging", e))?;

    for (src, name) in legacy.entries() {
        if !src.exists() {
            continue;
        }
        let dst = staged.profile_dir.join(name);
        if dst.exists() {
            return Err(Error::Migration(format!(
                "{} exists both at {:?} and in staging; resolve manually",
                name, src
            )));
        }
        std::fs::rename(src, &dst).map_err(|e| migration_error(name, e))?;
        tracing::debug!("Moved {:?} -> {:?}", src, dst);
    }

    let mut profile = Profile::new(DEFAULT_PROFILE_ID, DEFAULT_PROFILE_NAME, Utc::now());
    profile.authenticated_at = recover_authenticated_at(&staged);

    let doc = RegistryDocument {
        active_profile: Some(DEFAULT_PROFILE_ID.to_string()),
        profiles: vec![profile],
    };
    persist::write_json_atomic(&root.registry_file(), &doc)?;

    std::fs::rename(&staging, root.profiles_dir()).map_err(|e| migration_error("commit", e))?;

    let final_paths = root.profile(DEFAULT_PROFILE_ID);
    let moved = [
        final_paths.browser_state_dir,
        final_paths.auth_info_file,
        final_paths.library_file,
    ]
    .into_iter()
    .filter(|p| p.exists())
    .collect();

    Ok(MigrationOutcome::Migrated { moved })
}

fn recover_authenticated_at(staged: &ProfilePaths) -> Option<chrono::DateTime<Utc>> {
    match persist::read_json::<LegacyAuthInfo>(&staged.auth_info_file) {
        Ok(Some(info)) => info.authenticated_at.and_then(timestamp::from_epoch),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable legacy auth info: {}", e);
            None
        }
    }
}

fn migration_error(step: &str, e: std::io::Error) -> Error {
    Error::Migration(format!("{}: {}", step, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn legacy_root(dir: &tempfile::TempDir, authenticated_at: Option<f64>) -> DataRoot {
        let root = DataRoot::new(dir.path());
        let legacy = root.legacy();
        fs::create_dir_all(legacy.browser_state_dir.join("browser_profile")).unwrap();
        fs::write(legacy.browser_state_dir.join("state.json"), r#"{"cookies":[]}"#).unwrap();
        if let Some(at) = authenticated_at {
            fs::write(
                &legacy.auth_info_file,
                format!(
                    r#"{{"authenticated_at": {}, "authenticated_at_iso": "x"}}"#,
                    at
                ),
            )
            .unwrap();
        }
        fs::write(&legacy.library_file, r#"{"notebooks":{}}"#).unwrap();
        root
    }

    fn registry_doc(root: &DataRoot) -> RegistryDocument {
        persist::read_json(&root.registry_file()).unwrap().unwrap()
    }

    #[test]
    fn test_fresh_install_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = DataRoot::new(dir.path());
        assert_eq!(
            migrate_legacy_layout(&root).unwrap(),
            MigrationOutcome::NotNeeded
        );
        assert!(!root.registry_file().exists());
        assert!(!root.profiles_dir().exists());
    }

    #[test]
    fn test_legacy_layout_becomes_default_profile() {
        let dir = tempfile::tempdir().unwrap();
        let root = legacy_root(&dir, Some(1_700_000_000.0));

        let outcome = migrate_legacy_layout(&root).unwrap();
        assert!(matches!(outcome, MigrationOutcome::Migrated { ref moved } if moved.len() == 3));

        let doc = registry_doc(&root);
        assert_eq!(doc.active_profile.as_deref(), Some("default"));
        assert_eq!(doc.profiles.len(), 1);
        assert_eq!(doc.profiles[0].id, "default");
        assert_eq!(
            doc.profiles[0].authenticated_at.unwrap().timestamp(),
            1_700_000_000
        );

        let legacy = root.legacy();
        assert!(!legacy.any_exists());
        assert!(!root.staging_dir().exists());

        let paths = root.profile("default");
        assert!(paths.state_file.exists());
        assert!(paths.browser_profile_dir.is_dir());
        assert!(paths.auth_info_file.exists());
        assert!(paths.library_file.exists());
    }

    #[test]
    fn test_unparseable_auth_info_gives_null() {
        let dir = tempfile::tempdir().unwrap();
        let root = legacy_root(&dir, None);
        fs::write(&root.legacy().auth_info_file, "not json").unwrap();

        migrate_legacy_layout(&root).unwrap();
        let doc = registry_doc(&root);
        assert!(doc.profiles[0].authenticated_at.is_none());
    }

    #[test]
    fn test_second_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = legacy_root(&dir, Some(1_700_000_000.0));

        migrate_legacy_layout(&root).unwrap();
        let first = registry_doc(&root);

        assert_eq!(
            migrate_legacy_layout(&root).unwrap(),
            MigrationOutcome::AlreadyMigrated
        );
        assert_eq!(registry_doc(&root), first);
    }

    #[test]
    fn test_reintroduced_legacy_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = legacy_root(&dir, Some(1_700_000_000.0));
        migrate_legacy_layout(&root).unwrap();
        let first = registry_doc(&root);

        fs::write(&root.legacy().auth_info_file, r#"{"authenticated_at": 1.0}"#).unwrap();
        assert_eq!(
            migrate_legacy_layout(&root).unwrap(),
            MigrationOutcome::AlreadyMigrated
        );
        assert!(root.legacy().auth_info_file.exists());
        assert_eq!(registry_doc(&root), first);
    }

    #[test]
    fn test_resume_interrupted_migration() {
        let dir = tempfile::tempdir().unwrap();
        let root = legacy_root(&dir, Some(1_700_000_000.0));

        // Simulate a crash after the browser state was staged.
        let staged = root.staging_dir().join("default");
        fs::create_dir_all(&staged).unwrap();
        fs::rename(&root.legacy().browser_state_dir, staged.join("browser_state")).unwrap();

        let outcome = migrate_legacy_layout(&root).unwrap();
        assert!(matches!(outcome, MigrationOutcome::Migrated { .. }));
        assert!(!root.legacy().any_exists());
        assert!(root.profile("default").state_file.exists());
        assert!(root.profile("default").auth_info_file.exists());
        assert_eq!(
            registry_doc(&root).profiles[0]
                .authenticated_at
                .unwrap()
                .timestamp(),
            1_700_000_000
        );
    }

    #[test]
    fn test_file_in_both_places_stops_resume() {
        let dir = tempfile::tempdir().unwrap();
        let root = legacy_root(&dir, Some(1_700_000_000.0));

        // Interrupted run left a staged library, and a new one reappeared.
        let staged = root.staging_dir().join("default");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("library.json"), r#"{"notebooks":{"a":{}}}"#).unwrap();

        let err = migrate_legacy_layout(&root).unwrap_err();
        assert!(matches!(err, Error::Migration(ref msg) if msg.contains("library.json")));

        assert_eq!(
            fs::read_to_string(root.legacy().library_file).unwrap(),
            r#"{"notebooks":{}}"#
        );
        assert_eq!(
            fs::read_to_string(staged.join("library.json")).unwrap(),
            r#"{"notebooks":{"a":{}}}"#
        );
        assert!(!root.profiles_dir().exists());
        assert!(!root.registry_file().exists());
    }

    #[test]
    fn test_existing_profiles_root_blocks_migration() {
        let dir = tempfile::tempdir().unwrap();
        let root = legacy_root(&dir, Some(1_700_000_000.0));
        fs::create_dir_all(root.profiles_dir()).unwrap();

        assert_eq!(
            migrate_legacy_layout(&root).unwrap(),
            MigrationOutcome::AlreadyMigrated
        );
        assert!(root.legacy().any_exists());
        assert!(!root.registry_file().exists());
    }
}
