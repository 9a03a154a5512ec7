//! blauncher - command line front end for the build library.
//!
//! # Overview
//!
//! Reads `Launcher Settings.yaml` from the configuration directory, scans the
//! configured library folder and runs one subcommand:
//!
//! - `list`: print every installed build
//! - `query`: print the builds selected by a version query
//! - `remove`: delete the selected builds through the task queue
//!
//! # Execution Flow
//!
//! 1. Parse arguments, load settings (defaults if the file is missing)
//! 2. Initialize logging -> `<config dir>/logs/blauncher.<date>`
//! 3. Scan the library and run the subcommand
//! 4. For `remove`: start a [`TaskQueue`], wait for one outcome per task,
//!    then stop the queue

use anyhow::{Context, Result, bail};
use blauncher::query::select_builds;
use blauncher::services::scan_library;
use blauncher::tasks::RemoveTask;
use blauncher::{
    APP_NAME, BuildInfo, ConfigManager, LauncherSettings, TaskOutcome, TaskQueue, VERSION,
    VersionSearchQuery,
};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "blauncher", version, about = "Query and manage locally installed builds")]
struct Cli {
    /// Directory holding `Launcher Settings.yaml` and the log folder
    #[arg(long, default_value = "Launcher Data")]
    config_dir: Utf8PathBuf,

    /// Log at debug level (also enabled by `Debug Mode` in the settings)
    #[arg(long)]
    debug: bool,

    /// Override the library folder from the settings
    #[arg(long)]
    library: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every installed build
    List,

    /// Print the builds matching a version query such as `4.^.^`
    Query(QueryArgs),

    /// Delete the builds matching a version query
    Remove {
        #[command(flatten)]
        query: QueryArgs,

        /// Actually delete; without it the selection is only printed
        #[arg(long)]
        yes: bool,
    },
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// `<major>.<minor>[.<patch>]`, each `^`, `-`, `*` or a number.
    /// Defaults to `Default Query` from the settings, then `^.^.^`.
    query: Option<String>,

    /// Branch name, or `^`/`-`/`*`
    #[arg(long)]
    branch: Option<String>,

    /// Build hash to filter on
    #[arg(long)]
    build_hash: Option<String>,

    /// `^` for the newest commit, `-` for the oldest
    #[arg(long)]
    commit_time: Option<String>,
}

impl QueryArgs {
    fn to_query(&self, settings: &LauncherSettings) -> Result<VersionSearchQuery> {
        let mut query = match &self.query {
            Some(text) => VersionSearchQuery::parse(text)?,
            None => settings
                .default_query
                .clone()
                .unwrap_or_else(VersionSearchQuery::latest),
        };

        if let Some(branch) = &self.branch {
            query = query.with_branch(branch);
        }
        if let Some(hash) = &self.build_hash {
            query = query.with_build_hash(hash);
        }
        if let Some(commit_time) = &self.commit_time {
            query = query.with_commit_time(commit_time)?;
        }
        Ok(query)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let settings = config_manager.load_settings()?;

    let _log_guard = blauncher::logging::setup_logging(
        &config_manager.config_dir().join("logs"),
        "blauncher",
        cli.debug || settings.debug_mode,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let library = cli
        .library
        .clone()
        .or_else(|| settings.library_path())
        .context("No library folder configured; set `Library Folder` or pass --library")?;
    let builds = scan_library(&library)
        .with_context(|| format!("Failed to scan library: {}", library))?;

    match &cli.command {
        Command::List => {
            print_builds(&builds.iter().collect::<Vec<_>>());
        }
        Command::Query(args) => {
            let query = args.to_query(&settings)?;
            tracing::info!("Running query {}", query);
            print_builds(&select_builds(&builds, &query));
        }
        Command::Remove { query, yes } => {
            let query = query.to_query(&settings)?;
            let selected = select_builds(&builds, &query);
            if selected.is_empty() {
                println!("No builds match {}", query);
                return Ok(());
            }

            print_builds(&selected);
            if !yes {
                println!("Pass --yes to delete {} build(s)", selected.len());
                return Ok(());
            }
            remove_builds(&settings, &selected)?;
        }
    }

    tracing::info!("Done");
    Ok(())
}

fn print_builds(builds: &[&BuildInfo]) {
    for build in builds {
        println!(
            "{:<10} {:<12} {:<14} {}  {}",
            build.version,
            build.branch,
            build.build_hash.as_deref().unwrap_or("-"),
            build.commit_time.format("%Y-%m-%d %H:%M"),
            build.folder
        );
    }
}

/// Queue one removal per build and wait until each has an outcome
fn remove_builds(settings: &LauncherSettings, builds: &[&BuildInfo]) -> Result<()> {
    let queue = TaskQueue::new(settings.queue_config());

    let mut submitted = Vec::with_capacity(builds.len());
    for build in builds {
        let id = queue.append(RemoveTask::new(build.folder.clone()))?;
        submitted.push((id, *build));
    }
    queue.start()?;

    // Outcome records are kept even when a slow listener misses events
    let deadline = Instant::now() + Duration::from_secs(600);
    let mut failures = 0usize;
    for (id, build) in submitted {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match queue.wait_outcome(id, remaining) {
            Some(TaskOutcome::Finished(_)) => println!("Removed {}", build.folder),
            Some(TaskOutcome::Failed(error)) => {
                failures += 1;
                eprintln!("Failed to remove {}: {}", build.folder, error);
            }
            None => {
                failures += 1;
                eprintln!("No outcome for removal of {}", build.folder);
            }
        }
    }

    queue.fullstop();

    if failures > 0 {
        bail!("{} of {} removals failed", failures, builds.len());
    }
    Ok(())
}
