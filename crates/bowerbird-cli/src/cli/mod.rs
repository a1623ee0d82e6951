//! CLI for the bowerbird downloader.

mod commands;

use anyhow::Result;
use bowerbird_core::config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_config, run_get, GetArgs};

/// Top-level CLI for the bowerbird downloader.
#[derive(Debug, Parser)]
#[command(name = "bowerbird")]
#[command(about = "bowerbird: resumable, concurrent media downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URLs.
    Get {
        /// Direct HTTP/HTTPS URLs to download.
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Directory to save into (default: `[download] root_dir` from config).
        #[arg(long, short = 'd', value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Number of concurrent downloads (default: `[download] max_workers`).
        #[arg(long, short = 'j', value_name = "N")]
        workers: Option<usize>,

        /// Re-download files that already exist.
        #[arg(long)]
        overwrite: bool,

        /// Extra request header, e.g. -H "Referer: https://www.pixiv.net/". Repeatable.
        #[arg(long = "header", short = 'H', value_name = "NAME: VALUE")]
        headers: Vec<String>,

        /// Append one JSON line per downloaded file to this manifest.
        #[arg(long, value_name = "FILE")]
        manifest: Option<PathBuf>,
    },

    /// Show the config file location and the effective settings.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                urls,
                dir,
                workers,
                overwrite,
                headers,
                manifest,
            } => {
                let args = GetArgs {
                    urls,
                    dir,
                    workers,
                    overwrite,
                    headers,
                    manifest,
                };
                run_get(&cfg, args).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
