//! git-p4-sync command-line tool.
//!
//! Replays a range of Perforce changelists as Git commits (`sync`), pushes a
//! Git work tree back into the Perforce workspace (`reverse`), and generates
//! or checks configuration files (`init`, `validate`).
//!
//! Only one instance may run against a given configuration at a time. There
//! is no locking: concurrent runs race on the shared workspace and index.

mod report;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dialoguer::Confirm;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gitp4sync_core::config::{SyncConfig, DEFAULT_CONFIG_FILE};
use gitp4sync_core::git::open_backend;
use gitp4sync_core::models::{ChangeRange, SyncDirection};
use gitp4sync_core::orchestrator::{ChangelistOrchestrator, SyncOptions};
use gitp4sync_core::p4::P4Client;
use gitp4sync_core::resolver::PathResolver;

use report::ConsoleReporter;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Replay Perforce changelists as Git commits.
#[derive(Parser, Debug)]
#[command(name = "git-p4-sync", version, about = "Replay Perforce changelists as Git commits")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct RunArgs {
    /// Report what would happen without touching the workspace or repository.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show every mirror decision and debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay changelists FIRST..LAST as one commit each.
    Sync {
        /// Changelist range as FIRST,LAST.
        #[arg(short = 'r', long = "cl-range", value_name = "FIRST,LAST")]
        cl_range: ChangeRange,

        /// Do not append the `CL <id>` trailer to commit messages.
        #[arg(long)]
        no_cl: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Mirror the Git work tree into the workspace and reconcile it.
    Reverse {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Sync { run, .. } | Self::Reverse { run } => run.verbose,
            Self::Init { .. } | Self::Validate => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.command.verbose();

    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if verbose {
                eprintln!("Error: {:?}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Sync {
            cl_range,
            no_cl,
            run,
        } => {
            let config = load_config(&cli.config)?;
            cmd_sync(&config, cl_range, no_cl, run)
        }
        Commands::Reverse { run } => {
            let config = load_config(&cli.config)?;
            cmd_reverse(&config, run)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<SyncConfig> {
    SyncConfig::load_and_validate(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_sync(config: &SyncConfig, cl_range: ChangeRange, no_cl: bool, run: RunArgs) -> Result<()> {
    println!(
        "{} {}",
        style::direction(SyncDirection::Forward),
        style::header(&format!("changelists {}", cl_range))
    );

    let source = P4Client::from_config(&config.source);
    let dest = open_backend(config.destination.backend, &config.dest_root())
        .context("failed to open destination repository")?;
    let rules = config.ignore_rules().context("invalid ignore patterns")?;
    let reporter = ConsoleReporter::new(run.verbose);

    let mappings = PathResolver::new(&source, config.dest_root()).resolve(&config.paths);
    let mut options = SyncOptions::from_config(config, run.dry_run);
    if no_cl {
        options.trailer = false;
    }
    debug!(mappings = mappings.len(), trailer = options.trailer, "starting orchestrator");

    let orchestrator =
        ChangelistOrchestrator::new(&source, &*dest, mappings, &rules, &reporter, options);
    let summary = orchestrator
        .sync_range(cl_range)
        .with_context(|| format!("sync of changelists {} stopped", cl_range))?;

    if summary.discovered.is_empty() {
        return Ok(());
    }
    println!();
    if run.dry_run {
        println!(
            "{} {}",
            style::dry_run_tag(),
            style::success(&format!("{} changelist(s) would be committed", summary.replayed.len()))
        );
    } else {
        println!(
            "{}",
            style::success(&format!("{} commit(s) created", summary.commits.len()))
        );
    }
    Ok(())
}

fn cmd_reverse(config: &SyncConfig, run: RunArgs) -> Result<()> {
    println!(
        "{} {}",
        style::direction(SyncDirection::Reverse),
        style::header(&config.dest_root().display().to_string())
    );

    let source = P4Client::from_config(&config.source);
    let dest = open_backend(config.destination.backend, &config.dest_root())
        .context("failed to open destination repository")?;
    let rules = config.ignore_rules().context("invalid ignore patterns")?;
    let reporter = ConsoleReporter::new(run.verbose);

    let mappings = PathResolver::new(&source, config.dest_root()).resolve(&config.paths);
    let orchestrator = ChangelistOrchestrator::new(
        &source,
        &*dest,
        mappings,
        &rules,
        &reporter,
        SyncOptions::from_config(config, run.dry_run),
    );
    orchestrator.reverse().context("reverse sync failed")?;

    println!();
    println!("{}", reverse_outcome(run.dry_run));
    Ok(())
}

fn reverse_outcome(dry_run: bool) -> String {
    if dry_run {
        format!(
            "{} {}",
            style::dry_run_tag(),
            style::success("Workspace would be mirrored and reconciled")
        )
    } else {
        style::success("Workspace reconciled; review the pending changelist with `p4 opened`")
    }
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!("{}", style::warn("Init cancelled. Existing file was not modified."));
            return Ok(());
        }
    }

    std::fs::write(output, SyncConfig::default_template()).context("failed to write config file")?;
    info!(path = %output.display(), "wrote default configuration");

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set [source] root to your Perforce workspace root");
    println!("  2. List the depot paths to replay under [paths]");
    println!("  3. Validate with: git-p4-sync validate --config {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = SyncConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    println!();
    println!("{}", style::header("Configuration summary"));
    println!("  Workspace root : {}", config.source.root.display());
    println!(
        "  P4 client      : {}",
        config.source.client.as_deref().unwrap_or("(from environment)")
    );
    println!("  Git repository : {}", config.dest_root().display());
    println!("  Git backend    : {:?}", config.destination.backend);
    println!(
        "  Ignore rules   : {} ({:?})",
        config.destination.ignore.len(),
        config.destination.ignore_syntax
    );
    println!(
        "  CL trailer     : {}",
        if config.commit.trailer { "on" } else { "off" }
    );
    println!("  Author mapping : {} user(s)", config.authors.len());
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Depot path", "Destination"]);
    for mapping in &config.paths {
        table.add_row(vec![
            mapping.logical.clone(),
            mapping.dest_rel.display().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
