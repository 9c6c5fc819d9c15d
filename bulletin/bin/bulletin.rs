#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;

/// Throttled newsletter dispatcher
#[derive(Parser, Debug)]
#[command(name = "bulletin")]
#[command(version)]
struct Cli {
    /// Configuration file, overriding the lookup order
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Queue the fixture issues, run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let bulletin: bulletin::controller::Bulletin = ron::from_str(&config_content)?;

    if cli.once {
        bulletin_common::logging::init();
        let report = bulletin.run_once().await?;
        println!("{report}");
        return Ok(());
    }

    bulletin.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `BULLETIN_CONFIG` environment variable
/// 2. ./bulletin.config.ron (current working directory)
/// 3. /etc/bulletin/bulletin.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("BULLETIN_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "BULLETIN_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = vec![
        PathBuf::from("./bulletin.config.ron"),
        PathBuf::from("/etc/bulletin/bulletin.config.ron"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - BULLETIN_CONFIG environment variable\n{paths_tried}"
    )
}
