//! Removal of stored session data.
//!
//! A cleanup is planned first and executed second, so callers can show the
//! plan as a dry run. Only session artifacts, auth records and (optionally)
//! libraries are touched. The registry, the config file and the profile
//! directories themselves stay in place; affected profiles are marked as
//! not authenticated afterwards.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::paths::ProfilePaths;
use crate::persist;
use crate::profile::ProfileUpdate;
use crate::registry::ProfileRegistry;

/// Kind of data an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CleanupCategory {
    /// Storage-state snapshot and browser identity.
    BrowserState,
    /// Auth metadata record.
    Auth,
    /// Notebook library.
    Library,
}

impl std::fmt::Display for CleanupCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CleanupCategory::BrowserState => "browser state",
            CleanupCategory::Auth => "auth",
            CleanupCategory::Library => "library",
        };
        f.pad(s)
    }
}

/// One path scheduled for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupItem {
    /// Owning profile; None for leftovers of the single-account layout.
    pub profile_id: Option<String>,
    /// Kind of data.
    pub category: CleanupCategory,
    /// Path to remove.
    pub path: PathBuf,
    /// Bytes on disk (recursive for directories).
    pub size: u64,
    /// Whether `path` is a directory.
    pub is_dir: bool,
}

/// Everything a cleanup would remove.
#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    /// Items in scan order.
    pub items: Vec<CleanupItem>,
    /// Libraries were left out of the scan.
    pub preserve_library: bool,
}

impl CleanupPlan {
    /// Scan the data of one profile, or of every profile when `profile` is None.
    ///
    /// A full scan also picks up artifacts of the single-account layout left
    /// at the data root.
    pub fn scan(
        registry: &ProfileRegistry,
        profile: Option<&str>,
        preserve_library: bool,
    ) -> Result<Self> {
        let mut plan = Self {
            items: Vec::new(),
            preserve_library,
        };

        match profile {
            Some(id) => {
                let id = registry.resolve(Some(id))?.id.clone();
                plan.scan_profile(Some(&id), &registry.paths(&id));
            }
            None => {
                for p in registry.profiles() {
                    plan.scan_profile(Some(&p.id), &registry.paths(&p.id));
                }
                let legacy = registry.root().legacy();
                plan.scan_entries(
                    None,
                    CleanupCategory::BrowserState,
                    &legacy.browser_state_dir,
                );
                plan.push(None, CleanupCategory::Auth, &legacy.auth_info_file);
                if !preserve_library {
                    plan.push(None, CleanupCategory::Library, &legacy.library_file);
                }
            }
        }

        tracing::debug!(
            items = plan.items.len(),
            bytes = plan.total_size(),
            "Planned cleanup"
        );
        Ok(plan)
    }

    fn scan_profile(&mut self, id: Option<&str>, paths: &ProfilePaths) {
        self.scan_entries(id, CleanupCategory::BrowserState, &paths.browser_state_dir);
        self.push(id, CleanupCategory::Auth, &paths.auth_info_file);
        if !self.preserve_library {
            self.push(id, CleanupCategory::Library, &paths.library_file);
        }
    }

    /// Each child of `dir`; the directory itself is kept.
    fn scan_entries(&mut self, id: Option<&str>, category: CleanupCategory, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let mut children: Vec<PathBuf> =
            entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        children.sort();
        for child in children {
            self.push(id, category, &child);
        }
    }

    fn push(&mut self, id: Option<&str>, category: CleanupCategory, path: &Path) {
        let Ok(meta) = std::fs::symlink_metadata(path) else {
            return;
        };
        self.items.push(CleanupItem {
            profile_id: id.map(str::to_string),
            category,
            path: path.to_path_buf(),
            size: disk_size(path),
            is_dir: meta.is_dir(),
        });
    }

    /// Sum of item sizes.
    pub fn total_size(&self) -> u64 {
        self.items.iter().map(|i| i.size).sum()
    }

    /// Nothing to remove.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every planned item and reset the login state of the profiles
    /// whose session was touched.
    ///
    /// A path that cannot be removed is recorded and the rest still go.
    pub fn execute(&self, registry: &mut ProfileRegistry) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let mut touched = BTreeSet::new();

        for item in &self.items {
            let removed = if item.is_dir {
                persist::remove_dir_if_exists(&item.path)
            } else {
                persist::remove_file_if_exists(&item.path)
            };
            match removed {
                Ok(_) => {
                    tracing::debug!("Removed {:?}", item.path);
                    report.freed += item.size;
                    report.deleted.push(item.path.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to remove {:?}: {}", item.path, e);
                    report.failed.push((item.path.clone(), e.to_string()));
                }
            }
            if let Some(id) = &item.profile_id {
                if item.category != CleanupCategory::Library {
                    touched.insert(id.clone());
                }
            }
        }

        for id in touched {
            registry.paths(&id).ensure_dirs()?;
            registry.update(
                &id,
                ProfileUpdate::default()
                    .authenticated_at(None)
                    .last_validated(None),
            )?;
            tracing::info!(profile = %id, "Session data removed");
        }

        Ok(report)
    }
}

/// What an executed cleanup did.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Paths removed.
    pub deleted: Vec<PathBuf>,
    /// Paths that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Bytes released.
    pub freed: u64,
}

fn disk_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
