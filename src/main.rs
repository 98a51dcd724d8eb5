use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bytesize::ByteSize;
use nlmkit::coordinator::AuthOutcome;
use nlmkit::library::{ImportStatus, NotebookLibrary};
use nlmkit::store::Freshness;
use nlmkit::{
    notebooklm, AuthCoordinator, AuthStatus, BrowserDetector, ChromiumDriver, CleanupPlan, Config,
    DataRoot, Error, ExpiryThresholds, ImportStrategy, LinkStatus, NewNotebook, ProfileRegistry,
};

#[derive(Debug, Parser)]
#[command(
    name = "nlmkit",
    version,
    about = "Manage NotebookLM browser profiles, sessions and notebook libraries"
)]
struct Cli {
    /// Data directory (profiles, session state, config)
    #[arg(long, global = true, env = "NLMKIT_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Config file (default: <data-dir>/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in interactively (creates the profile if --name is given)
    Setup {
        /// Create a new profile with this name first
        #[arg(long, conflicts_with = "profile")]
        name: Option<String>,
        /// Authenticate an existing profile
        #[arg(long)]
        profile: Option<String>,
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
        /// Login timeout in minutes
        #[arg(long, value_name = "MINUTES", value_parser = parse_minutes)]
        timeout: Option<Duration>,
    },
    /// Show stored session state
    Status {
        /// Profile id (default: active)
        #[arg(long)]
        profile: Option<String>,
    },
    /// Check that the stored session still works
    Validate {
        /// Profile id (default: active)
        #[arg(long)]
        profile: Option<String>,
    },
    /// Remove stored session state
    Clear {
        /// Profile id (default: active)
        #[arg(long)]
        profile: Option<String>,
    },
    /// Clear, then log in again
    Reauth {
        /// Profile id (default: active)
        #[arg(long)]
        profile: Option<String>,
        /// Login timeout in minutes
        #[arg(long, value_name = "MINUTES", value_parser = parse_minutes)]
        timeout: Option<Duration>,
    },
    /// List profiles with their status
    List,
    /// Switch the active profile
    SetActive {
        /// Profile id
        #[arg(long)]
        id: String,
    },
    /// Delete a profile and its data
    Delete {
        /// Profile id
        #[arg(long)]
        id: String,
    },
    /// Remove stored session data of one or all profiles
    Cleanup {
        /// Profile id (default: every profile)
        #[arg(long)]
        profile: Option<String>,
        /// Keep notebook libraries
        #[arg(long)]
        preserve_library: bool,
        /// Only show what would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// List detected browsers
    Browsers,
    /// Manage the notebook library of a profile
    Notebook {
        /// Profile id (default: active)
        #[arg(long)]
        profile: Option<String>,
        #[command(subcommand)]
        command: NotebookCommand,
    },
}

#[derive(Debug, Subcommand)]
enum NotebookCommand {
    /// Add a notebook
    Add {
        /// Notebook URL
        #[arg(long)]
        url: String,
        /// Display name (detected from the page if omitted)
        #[arg(long)]
        name: Option<String>,
        /// Description
        #[arg(long)]
        description: Option<String>,
        /// Comma-separated topics
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,
        /// Comma-separated use cases
        #[arg(long, value_delimiter = ',')]
        use_cases: Vec<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Do not open the notebook to detect its name
        #[arg(long)]
        no_fetch: bool,
    },
    /// List notebooks
    List,
    /// Search notebooks
    Search {
        /// Text to look for
        #[arg(long)]
        query: String,
    },
    /// Set the active notebook
    Activate {
        /// Notebook id
        #[arg(long)]
        id: String,
    },
    /// Remove a notebook
    Remove {
        /// Notebook id
        #[arg(long)]
        id: String,
    },
    /// Show library statistics
    Stats,
    /// Open every notebook and record whether its link still works
    Check,
    /// Export the library as JSON
    Export {
        /// Output file (default: <data-dir>/exports/<profile>-<time>.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import notebooks from a JSON export or list
    Import {
        /// File to import
        #[arg(long)]
        file: PathBuf,
        /// merge (skip existing ids) or overwrite
        #[arg(long, default_value = "merge")]
        strategy: ImportStrategy,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(err) = e.downcast_ref::<Error>() {
                if let Some(hint) = err.remediation() {
                    eprintln!("  Try: {}", hint);
                }
                if err.is_retryable() {
                    eprintln!("  This may succeed if run again.");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "nlmkit=info",
        1 => "nlmkit=debug",
        _ => "nlmkit=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = match (&cli.config, &cli.data_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => DataRoot::new(dir).config_file(),
        (None, None) => DataRoot::new(nlmkit::config::default_data_dir()).config_file(),
    };
    let mut config = Config::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn parse_minutes(s: &str) -> std::result::Result<Duration, String> {
    let minutes: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err("must be a positive number of minutes".into());
    }
    Duration::try_from_secs_f64(minutes * 60.0).map_err(|e| e.to_string())
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let mut config = load_config(&cli)?;
    let root = DataRoot::new(config.data_root());
    let mut registry =
        ProfileRegistry::open(root)?.with_thresholds(ExpiryThresholds::from(&config.auth));

    match cli.command {
        Commands::Setup {
            name,
            profile,
            headless,
            timeout,
        } => {
            let profile = match name {
                Some(name) => Some(registry.create(&name)?.id),
                None => profile,
            };
            config.browser.headless = headless;
            let driver = ChromiumDriver::new(&config.browser);
            let mut auth = AuthCoordinator::new(&mut registry, driver, config);
            let outcome = auth.setup(profile.as_deref(), timeout).await?;
            Ok(report_outcome(&outcome, "Authentication setup complete"))
        }

        Commands::Status { profile } => {
            let browser = BrowserDetector::resolve(config.browser.executable_path.as_deref());
            let driver = ChromiumDriver::new(&config.browser);
            let auth = AuthCoordinator::new(&mut registry, driver, config);
            let report = auth.status(profile.as_deref())?;

            println!("\nAuthentication Status (profile: {}):", report.profile_id);
            println!(
                "  Authenticated: {}",
                if report.freshness.exists() { "Yes" } else { "No" }
            );
            match report.freshness {
                Freshness::Fresh(age) | Freshness::Stale(age) => {
                    println!("  State age: {:.1} hours", age.as_secs_f64() / 3600.0);
                    if matches!(report.freshness, Freshness::Stale(_)) {
                        println!("  State is stale; consider 'nlmkit reauth'");
                    }
                }
                Freshness::Missing => {}
            }
            if let Some(info) = &report.auth_info {
                println!("  Last auth: {}", info.authenticated_at_iso);
            }
            println!("  State file: {}", report.state_file.display());
            match browser {
                Ok(install) => println!(
                    "  Browser: {} ({})",
                    install.version().unwrap_or_else(|| install.browser_type.to_string()),
                    install.executable_path.display()
                ),
                Err(e) => println!("  Browser: {}", e),
            }
            Ok(true)
        }

        Commands::Validate { profile } => {
            let driver = ChromiumDriver::new(&config.browser);
            let mut auth = AuthCoordinator::new(&mut registry, driver, config);
            let outcome = auth.validate(profile.as_deref()).await?;
            Ok(report_outcome(&outcome, "Authentication is valid and working"))
        }

        Commands::Clear { profile } => {
            let driver = ChromiumDriver::new(&config.browser);
            let mut auth = AuthCoordinator::new(&mut registry, driver, config);
            auth.clear(profile.as_deref())?;
            println!("Authentication cleared");
            Ok(true)
        }

        Commands::Reauth { profile, timeout } => {
            config.browser.headless = false;
            let driver = ChromiumDriver::new(&config.browser);
            let mut auth = AuthCoordinator::new(&mut registry, driver, config);
            let outcome = auth.re_auth(profile.as_deref(), timeout).await?;
            Ok(report_outcome(&outcome, "Re-authentication complete"))
        }

        Commands::List => {
            print_profiles(&registry);
            Ok(true)
        }

        Commands::SetActive { id } => {
            registry.set_active(&id)?;
            println!("Active profile: {}", id);
            Ok(true)
        }

        Commands::Delete { id } => {
            if registry.delete(&id)? {
                println!("Deleted profile: {}", id);
                match registry.active_id() {
                    Some(active) => println!("Active profile: {}", active),
                    None => println!("No active profile"),
                }
            } else {
                println!("Profile not found: {}", id);
            }
            Ok(true)
        }

        Commands::Cleanup {
            profile,
            preserve_library,
            dry_run,
        } => {
            let plan = CleanupPlan::scan(&registry, profile.as_deref(), preserve_library)?;
            if plan.is_empty() {
                println!("Nothing to clean up");
                return Ok(true);
            }

            println!("\nCleanup {}:", if dry_run { "preview" } else { "plan" });
            for item in &plan.items {
                println!(
                    "  [{}] {:<12} {} ({})",
                    item.profile_id.as_deref().unwrap_or("legacy"),
                    item.category,
                    item.path.display(),
                    ByteSize(item.size)
                );
            }
            println!(
                "  Total: {} items, {}",
                plan.items.len(),
                ByteSize(plan.total_size())
            );
            if preserve_library {
                println!("  Libraries are preserved");
            }
            if dry_run {
                return Ok(true);
            }

            let report = plan.execute(&mut registry)?;
            for (path, reason) in &report.failed {
                println!("  Failed: {} ({})", path.display(), reason);
            }
            println!(
                "Removed {} items, freed {}",
                report.deleted.len(),
                ByteSize(report.freed)
            );
            Ok(report.failed.is_empty())
        }

        Commands::Browsers => {
            let found = BrowserDetector::detect_all();
            if found.is_empty() {
                println!("No supported browser found. Install Chrome, Brave, Chromium or Edge.");
                return Ok(false);
            }
            println!("\nDetected browsers (preferred first):");
            for install in found {
                println!(
                    "  {:<10} {}",
                    install.browser_type.to_string(),
                    install.executable_path.display()
                );
                if let Some(version) = install.version() {
                    println!("             {}", version);
                }
            }
            Ok(true)
        }

        Commands::Notebook { profile, command } => {
            run_notebook(&mut registry, config, profile.as_deref(), command).await
        }
    }
}

async fn run_notebook(
    registry: &mut ProfileRegistry,
    config: Config,
    profile: Option<&str>,
    command: NotebookCommand,
) -> Result<bool> {
    let profile_id = registry.resolve(profile)?.id.clone();
    let paths = registry.paths(&profile_id);

    match command {
        NotebookCommand::Add {
            url,
            name,
            description,
            topics,
            use_cases,
            tags,
            no_fetch,
        } => {
            let name = match name {
                Some(name) => name,
                None => {
                    let detected = if no_fetch {
                        None
                    } else {
                        println!("Detecting notebook name...");
                        let driver = ChromiumDriver::new(&config.browser);
                        let mut auth = AuthCoordinator::new(registry, driver, config);
                        auth.inspect(Some(&profile_id), &url)
                            .await?
                            .and_then(|page| page.title)
                            .and_then(|title| notebooklm::title_to_name(&title))
                    };
                    detected.unwrap_or_else(|| {
                        let fallback = notebooklm::notebook_id_from_url(&url)
                            .unwrap_or_else(|| "unnamed-notebook".into());
                        println!("  Could not detect name, using: {}", fallback);
                        fallback
                    })
                }
            };

            let mut library = NotebookLibrary::open(&paths)?;
            let notebook = library.add(NewNotebook {
                description: description.unwrap_or_else(|| name.clone()),
                url,
                name,
                topics: trimmed(topics),
                use_cases: trimmed(use_cases),
                tags: trimmed(tags),
                ..Default::default()
            })?;
            println!("Added notebook: {} ({})", notebook.name, notebook.id);
        }

        NotebookCommand::List => {
            let library = NotebookLibrary::open(&paths)?;
            let active = library.active().map(|n| n.id.clone());
            let notebooks = library.list();
            if notebooks.is_empty() {
                println!("Library is empty. Add notebooks with: nlmkit notebook add --url <url>");
            } else {
                println!("\nNotebook Library:");
                for notebook in notebooks {
                    let tag = if active.as_deref() == Some(notebook.id.as_str()) {
                        " [ACTIVE]"
                    } else {
                        ""
                    };
                    println!("\n  {}{}", notebook.name, tag);
                    println!("     ID: {}", notebook.id);
                    println!("     Topics: {}", notebook.topics.join(", "));
                    println!("     Uses: {}", notebook.use_count);
                }
            }
        }

        NotebookCommand::Search { query } => {
            let library = NotebookLibrary::open(&paths)?;
            let results = library.search(&query);
            if results.is_empty() {
                println!("No notebooks found for: {}", query);
            } else {
                println!("\nFound {} notebooks:", results.len());
                for notebook in results {
                    println!("\n  {} ({})", notebook.name, notebook.id);
                    println!("     {}", notebook.description);
                }
            }
        }

        NotebookCommand::Activate { id } => {
            let notebook = NotebookLibrary::open(&paths)?.select(&id)?;
            println!("Now using: {}", notebook.name);
        }

        NotebookCommand::Remove { id } => {
            if NotebookLibrary::open(&paths)?.remove(&id)? {
                println!("Notebook removed from library");
            } else {
                return Err(Error::NotebookNotFound(id).into());
            }
        }

        NotebookCommand::Stats => {
            let stats = NotebookLibrary::open(&paths)?.stats();
            println!("\nLibrary Statistics:");
            println!("  Total notebooks: {}", stats.total_notebooks);
            println!("  Total topics: {}", stats.total_topics);
            println!("  Total uses: {}", stats.total_use_count);
            if let Some(active) = &stats.active {
                println!("  Active: {}", active.name);
            }
            if let Some(most) = &stats.most_used {
                println!("  Most used: {} ({} uses)", most.name, most.use_count);
            }
            println!("  Library path: {}", stats.library_path.display());
        }

        NotebookCommand::Check => {
            let driver = ChromiumDriver::new(&config.browser);
            let mut auth = AuthCoordinator::new(registry, driver, config);
            let checks = auth.check_notebooks(Some(&profile_id)).await?;
            if checks.is_empty() {
                println!("No notebooks in library to check.");
                return Ok(true);
            }

            let active = checks
                .iter()
                .filter(|c| c.status == LinkStatus::Active)
                .count();
            println!("\nNotebook link check (profile: {}):", profile_id);
            println!(
                "  Total: {} | Active: {} | Issues: {}",
                checks.len(),
                active,
                checks.len() - active
            );
            for check in checks.iter().filter(|c| c.status != LinkStatus::Active) {
                println!("  [{}] {}: {}", check.status, check.name, check.reason);
            }
            return Ok(active == checks.len());
        }

        NotebookCommand::Export { output } => {
            let output = output.unwrap_or_else(|| {
                registry.root().path().join("exports").join(format!(
                    "{}-{}.json",
                    profile_id,
                    chrono::Utc::now().format("%Y%m%d-%H%M%S")
                ))
            });
            let count = NotebookLibrary::open(&paths)?.export_json(&output)?;
            println!("Exported {} notebooks to: {}", count, output.display());
        }

        NotebookCommand::Import { file, strategy } => {
            let report = NotebookLibrary::open(&paths)?
                .import_json(&file, strategy)
                .with_context(|| format!("Failed to import {:?}", file))?;
            for entry in &report.entries {
                let status = match entry.status {
                    ImportStatus::Imported => "imported",
                    ImportStatus::Overwritten => "overwritten",
                    ImportStatus::Skipped => "skipped (already exists)",
                };
                println!("  {} ({}): {}", entry.name, entry.id, status);
            }
            for error in &report.errors {
                println!("  Invalid: {}", error);
            }
            println!(
                "Import complete: {} imported, {} skipped, {} errors",
                report.imported,
                report.skipped,
                report.errors.len()
            );
            return Ok(report.errors.is_empty());
        }
    }

    Ok(true)
}

fn trimmed(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn report_outcome(outcome: &AuthOutcome, success: &str) -> bool {
    if outcome.is_success() {
        println!("\n{} (profile: {})", success, outcome.profile_id);
        return true;
    }
    println!(
        "\nAuthentication {} (profile: {})",
        outcome.state, outcome.profile_id
    );
    if let Some(detail) = &outcome.detail {
        println!("  Reason: {}", detail);
    }
    if let Some(hint) = &outcome.remediation {
        println!("  Try: {}", hint);
    }
    if outcome.retryable {
        println!("  This may succeed if run again.");
    }
    false
}

fn print_profiles(registry: &ProfileRegistry) {
    let profiles = registry.list();
    if profiles.is_empty() {
        println!("No profiles. Create one with: nlmkit setup --name <name>");
        return;
    }

    println!("\nProfiles ({}):", profiles.len());
    for (i, p) in profiles.iter().enumerate() {
        let active = if p.is_active { " [ACTIVE]" } else { "" };
        println!("\n  {}. {}{}", i + 1, p.profile.id, active);
        println!("     Name: {}", p.profile.name);
        if let Some(email) = &p.profile.email {
            println!("     Email: {}", email);
        }
        println!("     Status: {}", p.status);
        if let (Some(age), Some(left)) = (p.auth_age_days, p.expires_in_days) {
            if left > 0.0 {
                println!("     Auth age: {} days | Expires in: {} days", age, left);
            } else {
                println!("     Auth age: {} days | EXPIRED {} days ago", age, left.abs());
            }
        }
        if matches!(p.status, AuthStatus::Expired | AuthStatus::NotAuthenticated) {
            println!("     Action: Run 'nlmkit reauth --profile {}'", p.profile.id);
        }
    }
}
