//! Per-profile library of NotebookLM notebooks.
//!
//! Lives in the profile's `library.json`. Notebooks are keyed by the UUID
//! in their URL when there is one, else by the slugified name. One notebook
//! may be marked active.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::notebooklm;
use crate::paths::ProfilePaths;
use crate::persist;
use crate::profile::slugify;
use crate::timestamp;

const EXPORT_VERSION: &str = "1.0";

/// A notebook entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Library key.
    pub id: String,
    /// Notebook URL.
    pub url: String,
    /// Display name.
    pub name: String,
    /// What the notebook contains.
    #[serde(default)]
    pub description: String,
    /// Topics covered.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Kinds of sources (docs, videos, ...).
    #[serde(default)]
    pub content_types: Vec<String>,
    /// When to reach for this notebook.
    #[serde(default)]
    pub use_cases: Vec<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the entry was added.
    #[serde(with = "timestamp::iso")]
    pub created_at: DateTime<Utc>,
    /// Last metadata change.
    #[serde(with = "timestamp::iso")]
    pub updated_at: DateTime<Utc>,
    /// Times the notebook was used.
    #[serde(default)]
    pub use_count: u64,
    /// Last use.
    #[serde(default, with = "timestamp::iso_option")]
    pub last_used: Option<DateTime<Utc>>,
    /// Result of the last link check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_status: Option<LinkStatus>,
    /// Reason recorded by the last link check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_reason: Option<String>,
    /// When the link was last checked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::iso_option"
    )]
    pub last_checked: Option<DateTime<Utc>>,
}

/// Whether a notebook link still opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// The notebook loaded.
    Active,
    /// Redirected away from the notebook.
    Inactive,
    /// The page could not be opened.
    Error,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkStatus::Active => "active",
            LinkStatus::Inactive => "inactive",
            LinkStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of checking one notebook link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheck {
    /// Library key.
    pub notebook_id: String,
    /// Display name at check time.
    pub name: String,
    /// URL that was opened.
    pub url: String,
    /// Verdict.
    pub status: LinkStatus,
    /// Short explanation of the verdict.
    pub reason: String,
}

impl Notebook {
    fn matches(&self, query: &str) -> bool {
        let contains = |s: &str| s.to_lowercase().contains(query);
        contains(&self.name)
            || contains(&self.description)
            || self.topics.iter().any(|t| contains(t))
            || self.tags.iter().any(|t| contains(t))
            || self.use_cases.iter().any(|t| contains(t))
    }
}

/// Fields for a new notebook.
#[derive(Debug, Clone, Default)]
pub struct NewNotebook {
    /// Notebook URL.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Topics.
    pub topics: Vec<String>,
    /// Content types.
    pub content_types: Vec<String>,
    /// Use cases.
    pub use_cases: Vec<String>,
    /// Tags.
    pub tags: Vec<String>,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct NotebookUpdate {
    /// New URL.
    pub url: Option<String>,
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New topics.
    pub topics: Option<Vec<String>>,
    /// New content types.
    pub content_types: Option<Vec<String>>,
    /// New use cases.
    pub use_cases: Option<Vec<String>>,
    /// New tags.
    pub tags: Option<Vec<String>>,
}

/// On-disk shape of `library.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryDocument {
    /// Notebooks by id.
    #[serde(default)]
    pub notebooks: BTreeMap<String, Notebook>,
    /// Selected notebook.
    #[serde(default)]
    pub active_notebook_id: Option<String>,
    /// Last save.
    #[serde(default, with = "timestamp::iso_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Library statistics.
#[derive(Debug, Clone)]
pub struct LibraryStats {
    /// Number of notebooks.
    pub total_notebooks: usize,
    /// Distinct topics across notebooks.
    pub total_topics: usize,
    /// Sum of use counts.
    pub total_use_count: u64,
    /// Selected notebook.
    pub active: Option<Notebook>,
    /// Notebook with the highest use count.
    pub most_used: Option<Notebook>,
    /// Location of the library file.
    pub library_path: PathBuf,
}

/// How imported entries treat ids already in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportStrategy {
    /// Keep existing entries, skip the imported duplicate.
    #[default]
    Merge,
    /// Replace existing entries with the imported ones.
    Overwrite,
}

impl std::str::FromStr for ImportStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(ImportStrategy::Merge),
            "overwrite" => Ok(ImportStrategy::Overwrite),
            _ => Err(Error::Config(format!("Unknown import strategy: {}", s))),
        }
    }
}

/// Fate of one imported entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    /// Added as new.
    Imported,
    /// Replaced an existing entry.
    Overwritten,
    /// An entry with this id already existed.
    Skipped,
}

/// One line of an import report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Notebook id.
    pub id: String,
    /// Notebook name.
    pub name: String,
    /// What happened to it.
    pub status: ImportStatus,
}

/// Result of an import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Entries added or overwritten.
    pub imported: usize,
    /// Entries skipped as duplicates.
    pub skipped: usize,
    /// Invalid entries, one message each.
    pub errors: Vec<String>,
    /// Per-entry results.
    pub entries: Vec<ImportEntry>,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    export_version: &'static str,
    #[serde(with = "timestamp::iso")]
    exported_at: DateTime<Utc>,
    exported_by: String,
    notebooks: Vec<&'a Notebook>,
    metadata: ExportMetadata<'a>,
}

#[derive(Serialize)]
struct ExportMetadata<'a> {
    active_notebook_id: Option<&'a str>,
    total_notebooks: usize,
    total_use_count: u64,
}

/// Lenient shape of an imported entry.
#[derive(Deserialize)]
struct ImportedNotebook {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    content_types: Vec<String>,
    #[serde(default)]
    use_cases: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, with = "timestamp::iso_option")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    use_count: u64,
    #[serde(default, with = "timestamp::iso_option")]
    last_used: Option<DateTime<Utc>>,
}

/// The notebook library of one profile.
#[derive(Debug)]
pub struct NotebookLibrary {
    file: PathBuf,
    doc: LibraryDocument,
}

impl NotebookLibrary {
    /// Load the library of a profile, creating an empty one if absent.
    ///
    /// An unparseable file is reported and treated as empty; it is only
    /// replaced on the next change.
    pub fn open(paths: &ProfilePaths) -> Result<Self> {
        std::fs::create_dir_all(&paths.profile_dir)
            .map_err(|e| Error::persistence(&paths.profile_dir, e))?;
        let file = paths.library_file.clone();

        match persist::read_json::<LibraryDocument>(&file) {
            Ok(Some(doc)) => {
                tracing::debug!("Loaded library with {} notebooks", doc.notebooks.len());
                Ok(Self { file, doc })
            }
            Ok(None) => {
                let mut library = Self {
                    file,
                    doc: LibraryDocument::default(),
                };
                library.save()?;
                Ok(library)
            }
            Err(e) => {
                tracing::warn!("Error loading library {:?}: {}", file, e);
                Ok(Self {
                    file,
                    doc: LibraryDocument::default(),
                })
            }
        }
    }

    /// Location of `library.json`.
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Add a notebook. The first notebook becomes active.
    pub fn add(&mut self, new: NewNotebook) -> Result<Notebook> {
        let id = notebook_id(&new.url, &new.name);
        if id.is_empty() {
            return Err(Error::Config(format!(
                "cannot derive a notebook id from '{}'",
                new.name
            )));
        }
        if self.doc.notebooks.contains_key(&id) {
            return Err(Error::DuplicateNotebook(id));
        }

        let now = Utc::now();
        let notebook = Notebook {
            id: id.clone(),
            url: new.url,
            name: new.name,
            description: new.description,
            topics: new.topics,
            content_types: new.content_types,
            use_cases: new.use_cases,
            tags: new.tags,
            created_at: now,
            updated_at: now,
            use_count: 0,
            last_used: None,
            last_check_status: None,
            last_check_reason: None,
            last_checked: None,
        };
        self.doc.notebooks.insert(id.clone(), notebook.clone());
        if self.doc.notebooks.len() == 1 {
            self.doc.active_notebook_id = Some(id.clone());
        }
        self.save()?;

        tracing::info!("Added notebook: {} ({})", notebook.name, id);
        Ok(notebook)
    }

    /// Remove a notebook. Returns false if there was no such notebook.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        if self.doc.notebooks.remove(id).is_none() {
            tracing::warn!("Notebook not found: {}", id);
            return Ok(false);
        }
        if self.doc.active_notebook_id.as_deref() == Some(id) {
            self.doc.active_notebook_id = self.doc.notebooks.keys().next().cloned();
        }
        self.save()?;

        tracing::info!("Removed notebook: {}", id);
        Ok(true)
    }

    /// Change metadata of a notebook.
    pub fn update(&mut self, id: &str, update: NotebookUpdate) -> Result<Notebook> {
        let notebook = self
            .doc
            .notebooks
            .get_mut(id)
            .ok_or_else(|| Error::NotebookNotFound(id.to_string()))?;

        if let Some(url) = update.url {
            notebook.url = url;
        }
        if let Some(name) = update.name {
            notebook.name = name;
        }
        if let Some(description) = update.description {
            notebook.description = description;
        }
        if let Some(topics) = update.topics {
            notebook.topics = topics;
        }
        if let Some(content_types) = update.content_types {
            notebook.content_types = content_types;
        }
        if let Some(use_cases) = update.use_cases {
            notebook.use_cases = use_cases;
        }
        if let Some(tags) = update.tags {
            notebook.tags = tags;
        }
        notebook.updated_at = Utc::now();

        let notebook = notebook.clone();
        self.save()?;
        Ok(notebook)
    }

    /// Notebook by id.
    pub fn get(&self, id: &str) -> Option<&Notebook> {
        self.doc.notebooks.get(id)
    }

    /// All notebooks, sorted by name.
    pub fn list(&self) -> Vec<&Notebook> {
        let mut notebooks: Vec<&Notebook> = self.doc.notebooks.values().collect();
        notebooks.sort_by_key(|n| n.name.to_lowercase());
        notebooks
    }

    /// Case-insensitive search over name, description, topics, tags and use cases.
    pub fn search(&self, query: &str) -> Vec<&Notebook> {
        let query = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|n| n.matches(&query))
            .collect()
    }

    /// Mark a notebook active.
    pub fn select(&mut self, id: &str) -> Result<Notebook> {
        let notebook = self
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotebookNotFound(id.to_string()))?;
        self.doc.active_notebook_id = Some(id.to_string());
        self.save()?;

        tracing::info!("Activated notebook: {}", notebook.name);
        Ok(notebook)
    }

    /// The active notebook.
    pub fn active(&self) -> Option<&Notebook> {
        self.doc
            .active_notebook_id
            .as_deref()
            .and_then(|id| self.doc.notebooks.get(id))
    }

    /// Count one use of a notebook.
    pub fn record_use(&mut self, id: &str) -> Result<Notebook> {
        let notebook = self
            .doc
            .notebooks
            .get_mut(id)
            .ok_or_else(|| Error::NotebookNotFound(id.to_string()))?;
        notebook.use_count += 1;
        notebook.last_used = Some(Utc::now());

        let notebook = notebook.clone();
        self.save()?;
        Ok(notebook)
    }

    /// Store link check results on the notebooks they belong to.
    ///
    /// Results for notebooks no longer in the library are ignored. Returns
    /// how many notebooks were updated.
    pub fn record_checks(&mut self, checks: &[LinkCheck]) -> Result<usize> {
        let now = Utc::now();
        let mut updated = 0;
        for check in checks {
            if let Some(notebook) = self.doc.notebooks.get_mut(&check.notebook_id) {
                notebook.last_check_status = Some(check.status);
                notebook.last_check_reason = Some(check.reason.clone());
                notebook.last_checked = Some(now);
                updated += 1;
            }
        }
        if updated > 0 {
            self.save()?;
        }
        Ok(updated)
    }

    /// Library statistics.
    pub fn stats(&self) -> LibraryStats {
        let notebooks = &self.doc.notebooks;
        let topics: BTreeSet<&str> = notebooks
            .values()
            .flat_map(|n| n.topics.iter().map(String::as_str))
            .collect();
        let most_used = notebooks
            .values()
            .fold(None::<&Notebook>, |best, n| match best {
                Some(b) if b.use_count >= n.use_count => Some(b),
                _ => Some(n),
            })
            .cloned();

        LibraryStats {
            total_notebooks: notebooks.len(),
            total_topics: topics.len(),
            total_use_count: notebooks.values().map(|n| n.use_count).sum(),
            active: self.active().cloned(),
            most_used,
            library_path: self.file.clone(),
        }
    }

    /// Write all notebooks to `path` as an export document.
    ///
    /// Returns the number of notebooks written.
    pub fn export_json(&self, path: &Path) -> Result<usize> {
        let notebooks = self.list();
        let count = notebooks.len();
        let doc = ExportDocument {
            export_version: EXPORT_VERSION,
            exported_at: Utc::now(),
            exported_by: format!("nlmkit/{}", env!("CARGO_PKG_VERSION")),
            metadata: ExportMetadata {
                active_notebook_id: self.doc.active_notebook_id.as_deref(),
                total_notebooks: count,
                total_use_count: notebooks.iter().map(|n| n.use_count).sum(),
            },
            notebooks,
        };
        persist::write_json_atomic(path, &doc)?;

        tracing::info!("Exported {} notebooks to {:?}", count, path);
        Ok(count)
    }

    /// Import notebooks from an export document or a bare JSON list.
    pub fn import_json(&mut self, path: &Path, strategy: ImportStrategy) -> Result<ImportReport> {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let raw = match value {
            serde_json::Value::Object(mut map) => match map.remove("notebooks") {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(Error::Config(
                        "import file must contain a 'notebooks' list".into(),
                    ))
                }
            },
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(Error::Config(
                    "import file must be an object with 'notebooks' or a list".into(),
                ))
            }
        };

        let (valid, errors) = validate_import(raw);
        let mut report = ImportReport {
            errors,
            ..Default::default()
        };

        for notebook in valid {
            let entry = |status| ImportEntry {
                id: notebook.id.clone(),
                name: notebook.name.clone(),
                status,
            };
            let status = match (self.doc.notebooks.contains_key(&notebook.id), strategy) {
                (true, ImportStrategy::Merge) => {
                    report.skipped += 1;
                    report.entries.push(entry(ImportStatus::Skipped));
                    continue;
                }
                (true, ImportStrategy::Overwrite) => ImportStatus::Overwritten,
                (false, _) => ImportStatus::Imported,
            };
            report.entries.push(entry(status));
            report.imported += 1;
            self.doc.notebooks.insert(notebook.id.clone(), notebook);
        }

        if report.imported > 0 {
            if self.active().is_none() {
                self.doc.active_notebook_id = self.doc.notebooks.keys().next().cloned();
            }
            self.save()?;
        }

        tracing::info!(
            "Import complete: {} imported, {} skipped, {} errors",
            report.imported,
            report.skipped,
            report.errors.len()
        );
        Ok(report)
    }

    fn save(&mut self) -> Result<()> {
        self.doc.updated_at = Some(Utc::now());
        persist::write_json_atomic(&self.file, &self.doc)
    }
}

fn notebook_id(url: &str, name: &str) -> String {
    notebooklm::notebook_id_from_url(url).unwrap_or_else(|| slugify(name))
}

fn validate_import(raw: Vec<serde_json::Value>) -> (Vec<Notebook>, Vec<String>) {
    let mut valid = Vec::new();
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let now = Utc::now();

    for (i, value) in raw.into_iter().enumerate() {
        let entry: ImportedNotebook = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                errors.push(format!("Notebook #{}: {}", i + 1, e));
                continue;
            }
        };

        let mut problems = Vec::new();
        let url = entry.url.filter(|s| !s.is_empty());
        let name = entry.name.filter(|s| !s.is_empty());
        if url.is_none() {
            problems.push("missing required field 'url'".to_string());
        }
        if name.is_none() {
            problems.push("missing required field 'name'".to_string());
        }
        let (Some(url), Some(name)) = (url, name) else {
            errors.push(format!("Notebook #{}: {}", i + 1, problems.join("; ")));
            continue;
        };

        let id = entry
            .id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| notebook_id(&url, &name));
        if !seen.insert(id.clone()) {
            errors.push(format!(
                "Notebook #{}: duplicate id '{}' in import file",
                i + 1,
                id
            ));
            continue;
        }

        valid.push(Notebook {
            id,
            url,
            name,
            description: entry.description,
            topics: entry.topics,
            content_types: entry.content_types,
            use_cases: entry.use_cases,
            tags: entry.tags,
            created_at: entry.created_at.unwrap_or(now),
            updated_at: now,
            use_count: entry.use_count,
            last_used: entry.last_used,
            last_check_status: None,
            last_check_reason: None,
            last_checked: None,
        });
    }

    (valid, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL_A: &str = "https://notebooklm.google.com/notebook/aaaa-1111";
    const URL_B: &str = "https://notebooklm.google.com/notebook/bbbb-2222";

    fn library(dir: &tempfile::TempDir) -> NotebookLibrary {
        NotebookLibrary::open(&ProfilePaths::under(dir.path().join("p"))).unwrap()
    }

    fn new(url: &str, name: &str, topics: &[&str]) -> NewNotebook {
        NewNotebook {
            url: url.into(),
            name: name.into(),
            description: format!("{} notes", name),
            topics: topics.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_checks_persists_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        lib.add(new(URL_A, "Alpha", &[])).unwrap();

        let checks = vec![
            LinkCheck {
                notebook_id: "aaaa-1111".into(),
                name: "Alpha".into(),
                url: URL_A.into(),
                status: LinkStatus::Inactive,
                reason: "redirected".into(),
            },
            LinkCheck {
                notebook_id: "gone".into(),
                name: "Gone".into(),
                url: URL_B.into(),
                status: LinkStatus::Active,
                reason: "accessible".into(),
            },
        ];
        assert_eq!(lib.record_checks(&checks).unwrap(), 1);

        let raw = std::fs::read_to_string(lib.path()).unwrap();
        assert!(raw.contains(r#""last_check_status": "inactive""#));

        let reopened = library(&dir);
        let alpha = reopened.get("aaaa-1111").unwrap();
        assert_eq!(alpha.last_check_status, Some(LinkStatus::Inactive));
        assert_eq!(alpha.last_check_reason.as_deref(), Some("redirected"));
        assert!(alpha.last_checked.is_some());
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(&dir);
        assert!(lib.path().exists());
        assert!(lib.list().is_empty());
    }

    #[test]
    fn test_add_ids_and_first_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);

        let a = lib.add(new(URL_A, "Rust Book", &["rust"])).unwrap();
        assert_eq!(a.id, "aaaa-1111");
        let b = lib
            .add(new("https://example.com/x", "My Notes", &[]))
            .unwrap();
        assert_eq!(b.id, "my-notes");
        assert_eq!(lib.active().unwrap().id, "aaaa-1111");

        let err = lib.add(new(URL_A, "Again", &[])).unwrap_err();
        assert!(matches!(err, Error::DuplicateNotebook(id) if id == "aaaa-1111"));
    }

    #[test]
    fn test_persisted_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        lib.add(new(URL_A, "Rust Book", &["rust"])).unwrap();
        lib.record_use("aaaa-1111").unwrap();

        let reopened = library(&dir);
        let nb = reopened.get("aaaa-1111").unwrap();
        assert_eq!(nb.use_count, 1);
        assert!(nb.last_used.is_some());
        assert_eq!(reopened.active().unwrap().id, "aaaa-1111");
    }

    #[test]
    fn test_remove_active_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        lib.add(new(URL_B, "B", &[])).unwrap();
        lib.add(new(URL_A, "A", &[])).unwrap();
        assert_eq!(lib.active().unwrap().id, "bbbb-2222");

        assert!(lib.remove("bbbb-2222").unwrap());
        assert_eq!(lib.active().unwrap().id, "aaaa-1111");
        assert!(!lib.remove("bbbb-2222").unwrap());
        assert!(lib.remove("aaaa-1111").unwrap());
        assert!(lib.active().is_none());
    }

    #[test]
    fn test_search_and_list_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        lib.add(new(URL_B, "zeta", &["Async"])).unwrap();
        lib.add(new(URL_A, "Alpha", &["parsing"])).unwrap();

        let names: Vec<_> = lib.list().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "zeta"]);
        assert_eq!(lib.search("ASYNC").len(), 1);
        assert_eq!(lib.search("notes").len(), 2);
        assert!(lib.search("nothing").is_empty());
    }

    #[test]
    fn test_update_and_select_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        let a = lib.add(new(URL_A, "A", &[])).unwrap();

        let updated = lib
            .update(
                "aaaa-1111",
                NotebookUpdate {
                    tags: Some(vec!["x".into()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.tags, ["x"]);
        assert_eq!(updated.name, "A");
        assert!(updated.updated_at >= a.updated_at);

        assert!(matches!(
            lib.select("nope").unwrap_err(),
            Error::NotebookNotFound(_)
        ));
        assert!(matches!(
            lib.record_use("nope").unwrap_err(),
            Error::NotebookNotFound(_)
        ));
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        lib.add(new(URL_A, "A", &["rust", "async"])).unwrap();
        lib.add(new(URL_B, "B", &["rust"])).unwrap();
        lib.record_use("bbbb-2222").unwrap();
        lib.record_use("bbbb-2222").unwrap();

        let stats = lib.stats();
        assert_eq!(stats.total_notebooks, 2);
        assert_eq!(stats.total_topics, 2);
        assert_eq!(stats.total_use_count, 2);
        assert_eq!(stats.most_used.unwrap().id, "bbbb-2222");
        assert_eq!(stats.active.unwrap().id, "aaaa-1111");
    }

    #[test]
    fn test_export_then_import_merge_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        lib.add(new(URL_A, "A", &[])).unwrap();
        let export = dir.path().join("export.json");
        assert_eq!(lib.export_json(&export).unwrap(), 1);

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(doc["export_version"], "1.0");
        assert_eq!(doc["metadata"]["total_notebooks"], 1);

        lib.update(
            "aaaa-1111",
            NotebookUpdate {
                name: Some("Renamed".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let merged = lib.import_json(&export, ImportStrategy::Merge).unwrap();
        assert_eq!((merged.imported, merged.skipped), (0, 1));
        assert_eq!(lib.get("aaaa-1111").unwrap().name, "Renamed");

        let overwritten = lib.import_json(&export, ImportStrategy::Overwrite).unwrap();
        assert_eq!(overwritten.imported, 1);
        assert_eq!(overwritten.entries[0].status, ImportStatus::Overwritten);
        assert_eq!(lib.get("aaaa-1111").unwrap().name, "A");
    }

    #[test]
    fn test_import_reports_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = library(&dir);
        let file = dir.path().join("in.json");
        std::fs::write(
            &file,
            format!(
                r#"[
                    {{"url": "{URL_A}", "name": "A", "created_at": "2024-01-02T03:04:05.000006"}},
                    {{"name": "no url"}},
                    {{"url": "{URL_A}", "name": "dup"}},
                    {{"url": "{URL_B}", "name": "B", "topics": "not a list"}}
                ]"#
            ),
        )
        .unwrap();

        let report = lib.import_json(&file, ImportStrategy::Merge).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].contains("'url'"));
        assert!(report.errors[1].contains("duplicate id"));
        assert_eq!(lib.active().unwrap().id, "aaaa-1111");
        assert_eq!(
            lib.get("aaaa-1111").unwrap().created_at.timestamp_subsec_micros(),
            6
        );
    }

    #[test]
    fn test_corrupt_library_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProfilePaths::under(dir.path().join("p"));
        std::fs::create_dir_all(&paths.profile_dir).unwrap();
        std::fs::write(&paths.library_file, "{ nope").unwrap();

        let lib = NotebookLibrary::open(&paths).unwrap();
        assert!(lib.list().is_empty());
        assert_eq!(std::fs::read_to_string(&paths.library_file).unwrap(), "{ nope");
    }
}
