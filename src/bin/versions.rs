//! API Versions CLI
//!
//! Validates a version manifest and prints reconstructed snapshots.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use familiar_versioning::{diff_snapshots, manifest, ApiVersion, Changelog, VersioningConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "api-versions")]
#[command(about = "Validate API version manifests and inspect every version's shape")]
struct Cli {
    /// Config file (defaults to versioning.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Manifest to load (overrides config)
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the chain, reconstruct schemas and track endpoints
    Check,

    /// Print the schema snapshot of one version
    Snapshot {
        /// Version to print (defaults to head)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Print the alive endpoints of one version
    Endpoints {
        /// Version to print (defaults to head)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Compare two versions' schema snapshots
    Diff {
        /// Older version
        #[arg(short, long)]
        from: String,
        /// Newer version
        #[arg(short, long)]
        to: String,
    },

    /// Print the changelog
    Changelog {
        /// Emit Markdown instead of JSON
        #[arg(long)]
        markdown: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = VersioningConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let manifest_path = cli.manifest.unwrap_or_else(|| config.manifest_path());
    let loaded = manifest::load(&manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;
    let format = config.output.format;

    let pick = |version: Option<&str>| -> anyhow::Result<ApiVersion> {
        match version {
            Some(raw) => Ok(loaded.chain.resolve(raw)?.value().clone()),
            None => Ok(loaded.chain.head().value().clone()),
        }
    };

    match cli.command {
        Commands::Check => {
            let schemas = loaded.reconstruct()?;
            let endpoints = loaded.track_endpoints()?;

            println!("✅ {} versions, head {}", loaded.chain.len(), loaded.chain.head().value());
            for (snapshot, routes) in schemas.iter().zip(endpoints.iter()) {
                println!(
                    "  {}  schemas {}  endpoints {}  checksum {}",
                    snapshot.version,
                    snapshot.schemas.len(),
                    routes.alive.len(),
                    snapshot.checksum()?.short()
                );
            }
            Ok(())
        }

        Commands::Snapshot { version } => {
            let version = pick(version.as_deref())?;
            let schemas = loaded.reconstruct()?;
            let snapshot = schemas
                .get(&version)
                .ok_or_else(|| anyhow!("no snapshot for {}", version))?;
            println!("{}", format.render(snapshot)?);
            Ok(())
        }

        Commands::Endpoints { version } => {
            let version = pick(version.as_deref())?;
            let endpoints = loaded.track_endpoints()?;
            let snapshot = endpoints
                .get(&version)
                .ok_or_else(|| anyhow!("no endpoints for {}", version))?;
            println!("{}", format.render(snapshot)?);
            Ok(())
        }

        Commands::Diff { from, to } => {
            let (from, to) = (pick(Some(from.as_str()))?, pick(Some(to.as_str()))?);
            let schemas = loaded.reconstruct()?;
            let older = schemas.get(&from).ok_or_else(|| anyhow!("no snapshot for {}", from))?;
            let newer = schemas.get(&to).ok_or_else(|| anyhow!("no snapshot for {}", to))?;
            let diff = diff_snapshots(older, newer);

            println!("🔍 {} -> {}", diff.from, diff.to);
            if diff.is_empty() {
                println!("✅ No changes");
                return Ok(());
            }
            for change in &diff.changes {
                let marker = if change.is_breaking { "❌" } else { "✅" };
                println!("  {} {:?} {}", marker, change.change_type, change.path);
            }
            if diff.is_breaking() {
                println!("❌ Breaking changes detected");
            }
            Ok(())
        }

        Commands::Changelog { markdown } => {
            let changelog = Changelog::from_chain(&loaded.chain);
            if markdown {
                print!("{}", changelog.to_markdown());
            } else {
                println!("{}", format.render(&changelog)?);
            }
            Ok(())
        }
    }
}
