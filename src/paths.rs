//! On-disk layout of the data root.
//!
//! ```text
//! <root>/
//!   profiles.json                  registry document
//!   config.toml
//!   profiles/<id>/
//!     auth_info.json
//!     library.json
//!     browser_state/
//!       state.json                 storage-state snapshot
//!       browser_profile/           browser user-data dir
//! ```
//!
//! Nothing here touches the filesystem; callers create directories.

use std::path::{Path, PathBuf};

const PROFILES_DIR: &str = "profiles";
const STAGING_DIR: &str = ".profiles-staging";
const REGISTRY_FILE: &str = "profiles.json";
const CONFIG_FILE: &str = "config.toml";
const BROWSER_STATE_DIR: &str = "browser_state";
const BROWSER_PROFILE_DIR: &str = "browser_profile";
const STATE_FILE: &str = "state.json";
const AUTH_INFO_FILE: &str = "auth_info.json";
const LIBRARY_FILE: &str = "library.json";

/// Root of all persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    /// Wrap a root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory itself.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory holding one subdirectory per profile.
    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    /// Registry document.
    pub fn registry_file(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    /// Default config file location.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Scratch tree used while migrating the legacy layout.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Artifacts of the single-account layout, relative to the root.
    pub fn legacy(&self) -> LegacyPaths {
        LegacyPaths {
            browser_state_dir: self.root.join(BROWSER_STATE_DIR),
            auth_info_file: self.root.join(AUTH_INFO_FILE),
            library_file: self.root.join(LIBRARY_FILE),
        }
    }

    /// Layout for one profile.
    pub fn profile(&self, id: &str) -> ProfilePaths {
        ProfilePaths::under(self.profiles_dir().join(id))
    }
}

/// Paths belonging to a single profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    /// `profiles/<id>`.
    pub profile_dir: PathBuf,
    /// Session artifacts; wiped by a clear.
    pub browser_state_dir: PathBuf,
    /// Browser identity (user-data dir).
    pub browser_profile_dir: PathBuf,
    /// Storage-state snapshot.
    pub state_file: PathBuf,
    /// Auth metadata record.
    pub auth_info_file: PathBuf,
    /// Notebook library.
    pub library_file: PathBuf,
}

impl ProfilePaths {
    /// Lay out a profile rooted at `profile_dir`.
    pub fn under(profile_dir: PathBuf) -> Self {
        let browser_state_dir = profile_dir.join(BROWSER_STATE_DIR);
        Self {
            browser_profile_dir: browser_state_dir.join(BROWSER_PROFILE_DIR),
            state_file: browser_state_dir.join(STATE_FILE),
            auth_info_file: profile_dir.join(AUTH_INFO_FILE),
            library_file: profile_dir.join(LIBRARY_FILE),
            browser_state_dir,
            profile_dir,
        }
    }

    /// Create the directory skeleton.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.browser_state_dir)
    }
}

/// Artifacts of the pre-profile layout.
#[derive(Debug, Clone)]
pub struct LegacyPaths {
    /// `<root>/browser_state`.
    pub browser_state_dir: PathBuf,
    /// `<root>/auth_info.json`.
    pub auth_info_file: PathBuf,
    /// `<root>/library.json`.
    pub library_file: PathBuf,
}

impl LegacyPaths {
    /// Each legacy artifact paired with its file name inside a profile dir.
    pub fn entries(&self) -> [(&Path, &'static str); 3] {
        [
            (self.browser_state_dir.as_path(), BROWSER_STATE_DIR),
            (self.auth_info_file.as_path(), AUTH_INFO_FILE),
            (self.library_file.as_path(), LIBRARY_FILE),
        ]
    }

    /// True if any legacy artifact is present.
    pub fn any_exists(&self) -> bool {
        self.entries().iter().any(|(path, _)| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_layout() {
        let root = DataRoot::new("/data");
        let paths = root.profile("alice");

        assert_eq!(paths.profile_dir, PathBuf::from("/data/profiles/alice"));
        assert_eq!(
            paths.browser_state_dir,
            PathBuf::from("/data/profiles/alice/browser_state")
        );
        assert_eq!(
            paths.browser_profile_dir,
            PathBuf::from("/data/profiles/alice/browser_state/browser_profile")
        );
        assert_eq!(
            paths.state_file,
            PathBuf::from("/data/profiles/alice/browser_state/state.json")
        );
        assert_eq!(
            paths.auth_info_file,
            PathBuf::from("/data/profiles/alice/auth_info.json")
        );
        assert_eq!(
            paths.library_file,
            PathBuf::from("/data/profiles/alice/library.json")
        );
    }

    #[test]
    fn test_legacy_layout_mirrors_profile_layout() {
        let root = DataRoot::new("/data");
        let legacy = root.legacy();
        let profile = ProfilePaths::under(PathBuf::from("/data"));

        assert_eq!(legacy.browser_state_dir, profile.browser_state_dir);
        assert_eq!(legacy.auth_info_file, profile.auth_info_file);
        assert_eq!(legacy.library_file, profile.library_file);
        assert_eq!(root.registry_file(), PathBuf::from("/data/profiles.json"));
    }
}
