// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use prism::events::EventOutcome;
use prism::{Config, PackageIndex, Startup};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "prism")]
#[command(author, version, about = "Private package index over a directory of archives", long_about = None)]
struct Cli {
    /// Repository root (default: current directory, or the config file's root)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep leaves as symlink farms instead of rendering HTML
    #[arg(long, global = true)]
    link_farm: bool,

    /// Worker threads for hashing and metadata extraction
    #[arg(short = 'j', long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Catalogue new archives and rebuild the listings they affect
    Reconcile,
    /// Register archives and add them to their leaves
    Register {
        /// Archive files inside the repository root
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Forget archives that were deleted from the repository root
    Remove {
        /// Paths of the deleted archives
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List indexed packages
    List,
    /// Show the versions listed for a package
    Leaf {
        /// Package name
        name: String,
    },
    /// Drop records and links of archives that no longer exist
    Cleanup,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

/// Config file (if any) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::new("."),
    };

    if let Some(root) = &cli.root {
        config.repository_root = root.clone();
    }
    if cli.link_farm {
        config.write_html = false;
    }
    if cli.workers.is_some() {
        config.workers = cli.workers;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "prism", &mut std::io::stdout());
            return Ok(());
        }
        Some(ref command) => command,
        None => {
            // No command provided, show help
            println!("Prism Package Indexer v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'prism --help' for usage information");
            return Ok(());
        }
    };

    let config = load_config(&cli)?;
    let index = PackageIndex::open(config.clone()).with_context(|| {
        format!(
            "Failed to open repository at {}",
            config.repository_root.display()
        )
    })?;

    match command {
        Commands::Reconcile => {
            let report = match index.startup()? {
                Startup::Completed(report) => report,
                Startup::Background(handle) => handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("Reconciliation thread panicked"))??,
            };

            println!("Scanned {} archives", report.scanned);
            println!("  New catalog entries: {}", report.new_entries.len());
            for name in &report.touched_leaves {
                println!("  Rebuilt leaf: {}", name);
            }
            if let Some(path) = &report.root_written {
                println!("  Root index: {}", path.display());
            }
            Ok(())
        }
        Commands::Register { paths } => {
            for path in paths {
                info!("Registering {}", path.display());
                match index.register_archive(path)? {
                    Some((metadata, md5)) => println!(
                        "{} {} {} ({})",
                        md5, metadata.name, metadata.version, metadata.filename
                    ),
                    None => println!("Quarantined: {}", path.display()),
                }
            }
            Ok(())
        }
        Commands::Remove { paths } => {
            for path in paths {
                if let EventOutcome::Removed {
                    forgotten,
                    touched_leaves,
                } = index.archive_removed(path)?
                {
                    println!(
                        "{}: {} catalog entries removed, {} leaves updated",
                        path.display(),
                        forgotten.len(),
                        touched_leaves.len()
                    );
                }
            }
            Ok(())
        }
        Commands::List => {
            let packages = index.list_packages()?;
            if packages.is_empty() {
                println!("No packages indexed");
            }
            for name in packages {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Leaf { name } => {
            let Some(records) = index.get_leaf(name)? else {
                return Err(anyhow::anyhow!("Package {} is not indexed", name));
            };
            println!("{} ({} versions)", name, records.len());
            for record in records {
                println!(
                    "  {} {} {} bytes md5:{}",
                    record.version, record.filename, record.size, record.md5
                );
            }
            Ok(())
        }
        Commands::Cleanup => {
            let report = index.cleanup()?;
            if report.is_empty() {
                println!("Nothing to clean up");
            }
            for leaf in report {
                println!("{}: dropped {}", leaf.name, leaf.dropped.join(", "));
            }
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_apply_on_top_of_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prism.json");
        std::fs::write(&path, r#"{"repository_root": "/srv/index", "workers": 2}"#).unwrap();

        let cli = Cli::parse_from([
            "prism",
            "--config",
            path.to_str().unwrap(),
            "--link-farm",
            "-j",
            "5",
            "list",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.repository_root, PathBuf::from("/srv/index"));
        assert!(!config.write_html);
        assert_eq!(config.workers, Some(5));

        let cli = Cli::parse_from(["prism", "list", "--root", "/tmp/pkgs"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.repository_root, PathBuf::from("/tmp/pkgs"));
        assert!(config.write_html);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = Cli::parse_from(["prism", "-j", "0", "list"]);
        assert!(load_config(&cli).is_err());
    }
}
