use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use secscan_core::config::{load_artifacts, SETTINGS_FILE};
use secscan_core::{
    Artifact, Orchestrator, OrchestratorOptions, PluginOutcome, RunContext, RunObserver, Settings,
};
use secscan_report::{json, text};

#[derive(Parser)]
#[command(name = "secscan")]
#[command(about = "Run security analysis plugins over a list of Android packages or source trees")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// File listing one artifact path per line
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Decompile each artifact before the other plugins run
    #[arg(long)]
    decompile: bool,

    /// Settings file (defaults to .secscan.toml in the current directory or an ancestor)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Artifacts processed at once (overrides run.parallelism)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Exit with status 1 when any plugin recorded a failure
    #[arg(long)]
    strict: bool,

    /// Show debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default .secscan.toml settings file
    Init {
        /// Overwrite existing settings
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Init { force }) => cmd_init(force),
        None => cmd_scan(&cli),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

fn cmd_scan(cli: &Cli) -> Result<()> {
    let list = cli
        .config
        .as_deref()
        .context("no artifact list given; pass --config <path>")?;
    let settings = load_settings(cli.settings.as_deref())?;
    let artifacts = load_artifacts(list)?;
    debug!(
        artifacts = artifacts.len(),
        plugins = settings.plugins.len(),
        "loaded artifact list and settings"
    );
    let registry = secscan_plugins::build_registry(&settings, cli.decompile)
        .context("failed to set up plugins")?;

    let parallelism = cli.jobs.unwrap_or(settings.run.parallelism);
    if parallelism == 0 {
        anyhow::bail!("--jobs must be at least 1");
    }

    let mut orchestrator = Orchestrator::new(registry, RunContext::new(settings.run.tools_dir.clone()))
        .with_options(OrchestratorOptions {
            parallelism,
            on_mandatory_failure: settings.run.on_mandatory_failure,
        });
    if cli.format == Format::Text {
        orchestrator = orchestrator.with_observer(Arc::new(ConsoleObserver {
            show_artifact: parallelism > 1,
        }));
    }

    let ledger = orchestrator.run(&artifacts);

    match cli.format {
        Format::Text => print!("{}", text::format_report(&ledger)),
        Format::Json => println!("{}", json::format_report(&ledger, false)),
    }

    if (cli.strict || settings.run.strict) && ledger.has_failures() {
        process::exit(1);
    }
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(SETTINGS_FILE);
    if target.exists() && !force {
        anyhow::bail!("{SETTINGS_FILE} already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Settings::default_toml())
        .with_context(|| format!("failed to write {SETTINGS_FILE}"))?;
    println!("Created {SETTINGS_FILE} with default configuration.");
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(p) => Settings::load(p)?,
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            Settings::load_or_default(&cwd)?
        }
    };
    Ok(settings)
}

/// Prints one status line per artifact and plugin as the run progresses.
struct ConsoleObserver {
    show_artifact: bool,
}

impl ConsoleObserver {
    fn suffix(&self, artifact: &Artifact) -> String {
        if self.show_artifact {
            format!(" ({artifact})")
        } else {
            String::new()
        }
    }
}

impl RunObserver for ConsoleObserver {
    fn artifact_started(&self, artifact: &Artifact) {
        println!("{} {artifact}", "[+]".bold());
    }

    fn plugin_finished(&self, plugin: &str, artifact: &Artifact, outcome: &PluginOutcome) {
        let line = match outcome {
            PluginOutcome::Success => format!("{} [{plugin}] success", "[+]".green().bold()),
            PluginOutcome::Failure(_) => format!("{} [{plugin}] failed", "[-]".red().bold()),
        };
        println!("    {line}{}", self.suffix(artifact));
    }

    fn plugin_skipped(&self, plugin: &str, artifact: &Artifact) {
        println!(
            "    {} [{plugin}] skipped{}",
            "[~]".yellow().bold(),
            self.suffix(artifact)
        );
    }
}
