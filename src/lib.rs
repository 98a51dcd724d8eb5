//! # nlmkit
//!
//! Multi-profile session management for NotebookLM browser automation.
//!
//! Each profile is an isolated Google identity: its own browser user-data
//! directory, its own saved storage state and its own notebook library.
//! The crate keeps a registry of profiles, upgrades single-account data
//! directories in place, and drives a Chromium-family browser through
//! interactive login and session validation.
//!
//! ## Data layout
//!
//! ```text
//! <data-root>/
//!   profiles.json
//!   config.toml
//!   profiles/<id>/
//!     auth_info.json
//!     library.json
//!     browser_state/
//!       state.json
//!       browser_profile/
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use nlmkit::{AuthCoordinator, ChromiumDriver, Config, DataRoot, ProfileRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut registry = ProfileRegistry::open(DataRoot::new(config.data_root()))?;
//!     registry.create("Work")?;
//!
//!     let driver = ChromiumDriver::new(&config.browser);
//!     let mut auth = AuthCoordinator::new(&mut registry, driver, config);
//!     let outcome = auth.setup(Some("work"), None).await?;
//!     println!("{}: {}", outcome.profile_id, outcome.state);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod automation;
pub mod browser;
pub mod chromium;
pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod library;
pub mod migration;
pub mod notebooklm;
pub mod paths;
pub mod persist;
pub mod profile;
pub mod registry;
pub mod store;
pub mod timestamp;

pub use automation::{AutomationDriver, BrowserSession, LaunchSpec, PageInfo, StorageState};
pub use browser::{BrowserDetector, BrowserInstallation, BrowserType};
pub use chromium::ChromiumDriver;
pub use cleanup::{CleanupCategory, CleanupPlan, CleanupReport};
pub use config::{AuthConfig, BrowserConfig, Config};
pub use coordinator::{AuthCoordinator, AuthOutcome, AuthState};
pub use error::{Error, Result};
pub use library::{ImportStrategy, LinkCheck, LinkStatus, NewNotebook, Notebook, NotebookLibrary};
pub use migration::{migrate_legacy_layout, MigrationOutcome};
pub use paths::{DataRoot, ProfilePaths};
pub use profile::{AuthStatus, ExpiryThresholds, Profile, ProfileSummary, ProfileUpdate};
pub use registry::ProfileRegistry;
pub use store::{Freshness, SessionStore};
