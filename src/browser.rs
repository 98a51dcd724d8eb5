//! Detection of installed Chromium-family browsers.
//!
//! Only browsers that speak CDP are considered. Each profile gets its own
//! user-data directory, so the system browser's profiles are never touched;
//! detection only needs to find an executable.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Supported browser types, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserType {
    /// Google Chrome.
    Chrome,
    /// Brave.
    Brave,
    /// Chromium.
    Chromium,
    /// Microsoft Edge.
    Edge,
}

impl BrowserType {
    /// Get the display name of the browser.
    pub fn name(&self) -> &'static str {
        match self {
            BrowserType::Chrome => "Chrome",
            BrowserType::Brave => "Brave",
            BrowserType::Chromium => "Chromium",
            BrowserType::Edge => "Edge",
        }
    }

    /// All types, most preferred first.
    pub fn all() -> &'static [BrowserType] {
        &[
            BrowserType::Chrome,
            BrowserType::Brave,
            BrowserType::Chromium,
            BrowserType::Edge,
        ]
    }

    /// Guess the type from an executable path.
    pub fn from_path(path: &Path) -> Self {
        let s = path.to_string_lossy().to_lowercase();
        if s.contains("brave") {
            BrowserType::Brave
        } else if s.contains("chromium") {
            BrowserType::Chromium
        } else if s.contains("edge") {
            BrowserType::Edge
        } else {
            BrowserType::Chrome
        }
    }

    /// Executable names looked up on `PATH`.
    fn binary_names(&self) -> &'static [&'static str] {
        match self {
            BrowserType::Chrome => &["google-chrome-stable", "google-chrome", "chrome"],
            BrowserType::Brave => &["brave-browser", "brave"],
            BrowserType::Chromium => &["chromium", "chromium-browser"],
            BrowserType::Edge => &["microsoft-edge", "microsoft-edge-stable", "msedge"],
        }
    }

    /// Well-known install locations.
    #[cfg(target_os = "linux")]
    fn install_paths(&self) -> &'static [&'static str] {
        match self {
            BrowserType::Chrome => &[
                "/usr/bin/google-chrome-stable",
                "/usr/bin/google-chrome",
                "/opt/google/chrome/chrome",
                "/var/lib/flatpak/exports/bin/com.google.Chrome",
            ],
            BrowserType::Brave => &[
                "/usr/bin/brave-browser",
                "/opt/brave.com/brave/brave",
                "/snap/bin/brave",
            ],
            BrowserType::Chromium => &[
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
            ],
            BrowserType::Edge => &["/usr/bin/microsoft-edge", "/opt/microsoft/msedge/msedge"],
        }
    }

    #[cfg(target_os = "macos")]
    fn install_paths(&self) -> &'static [&'static str] {
        match self {
            BrowserType::Chrome => &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"],
            BrowserType::Brave => &["/Applications/Brave Browser.app/Contents/MacOS/Brave Browser"],
            BrowserType::Chromium => &["/Applications/Chromium.app/Contents/MacOS/Chromium"],
            BrowserType::Edge => &["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
        }
    }

    #[cfg(target_os = "windows")]
    fn install_paths(&self) -> &'static [&'static str] {
        match self {
            BrowserType::Chrome => &[
                "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
                "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
            ],
            BrowserType::Brave => &[
                "C:\\Program Files\\BraveSoftware\\Brave-Browser\\Application\\brave.exe",
            ],
            BrowserType::Chromium => &["C:\\Program Files\\Chromium\\Application\\chrome.exe"],
            BrowserType::Edge => &[
                "C:\\Program Files (x86)\\Microsoft\\Edge\\Application\\msedge.exe",
                "C:\\Program Files\\Microsoft\\Edge\\Application\\msedge.exe",
            ],
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    fn install_paths(&self) -> &'static [&'static str] {
        &[]
    }
}

impl std::fmt::Display for BrowserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for BrowserType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chrome" | "google-chrome" => Ok(BrowserType::Chrome),
            "brave" => Ok(BrowserType::Brave),
            "chromium" => Ok(BrowserType::Chromium),
            "edge" | "microsoft-edge" | "msedge" => Ok(BrowserType::Edge),
            _ => Err(Error::Config(format!("Unknown browser type: {}", s))),
        }
    }
}

/// Detected browser installation.
#[derive(Debug, Clone)]
pub struct BrowserInstallation {
    /// Type of browser.
    pub browser_type: BrowserType,
    /// Path to executable.
    pub executable_path: PathBuf,
}

impl BrowserInstallation {
    /// Use an explicitly configured executable.
    pub fn from_executable(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "browser executable not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            browser_type: BrowserType::from_path(path),
            executable_path: path.to_path_buf(),
        })
    }

    /// Version string reported by `--version`.
    pub fn version(&self) -> Option<String> {
        std::process::Command::new(&self.executable_path)
            .arg("--version")
            .output()
            .ok()
            .and_then(|output| String::from_utf8(output.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Browser detector for finding system-installed browsers.
pub struct BrowserDetector;

impl BrowserDetector {
    /// Detect a browser of the given type.
    pub fn detect(browser_type: BrowserType) -> Option<BrowserInstallation> {
        let installed = browser_type
            .install_paths()
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file());

        installed
            .or_else(|| find_on_path(browser_type.binary_names()))
            .map(|executable_path| BrowserInstallation {
                browser_type,
                executable_path,
            })
    }

    /// Every detectable browser, most preferred first.
    pub fn detect_all() -> Vec<BrowserInstallation> {
        BrowserType::all()
            .iter()
            .filter_map(|t| Self::detect(*t))
            .collect()
    }

    /// Preferred browser: Chrome > Brave > Chromium > Edge.
    pub fn preferred() -> Option<BrowserInstallation> {
        BrowserType::all().iter().find_map(|t| Self::detect(*t))
    }

    /// The configured executable, or the preferred detected one.
    pub fn resolve(configured: Option<&Path>) -> Result<BrowserInstallation> {
        match configured {
            Some(path) => BrowserInstallation::from_executable(path),
            None => Self::preferred().ok_or_else(|| {
                Error::AuthAutomation(
                    "No supported browser found. Install Chrome, Brave, Chromium or Edge.".into(),
                )
            }),
        }
    }
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_from_path() {
        assert_eq!(
            BrowserType::from_path(Path::new("/usr/bin/brave-browser")),
            BrowserType::Brave
        );
        assert_eq!(
            BrowserType::from_path(Path::new("/snap/bin/chromium")),
            BrowserType::Chromium
        );
        assert_eq!(
            BrowserType::from_path(Path::new("/opt/microsoft/msedge/microsoft-edge")),
            BrowserType::Edge
        );
        assert_eq!(
            BrowserType::from_path(Path::new("/usr/bin/google-chrome")),
            BrowserType::Chrome
        );
    }

    #[test]
    fn test_parse_type() {
        assert_eq!("msedge".parse::<BrowserType>().unwrap(), BrowserType::Edge);
        assert!("firefox".parse::<BrowserType>().is_err());
    }

    #[test]
    fn test_configured_missing_executable_is_error() {
        let err = BrowserDetector::resolve(Some(Path::new("/nonexistent/chrome"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_configured_executable_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("chromium");
        std::fs::write(&exe, "").unwrap();
        let install = BrowserDetector::resolve(Some(&exe)).unwrap();
        assert_eq!(install.browser_type, BrowserType::Chromium);
        assert_eq!(install.executable_path, exe);
    }

    #[test]
    fn test_detect_all_in_preference_order() {
        let found = BrowserDetector::detect_all();
        let order: Vec<usize> = found
            .iter()
            .map(|b| {
                BrowserType::all()
                    .iter()
                    .position(|t| *t == b.browser_type)
                    .unwrap()
            })
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }
}
