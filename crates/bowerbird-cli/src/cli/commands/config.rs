//! `bowerbird config` – show where the config lives and what is in effect.

use anyhow::Result;
use bowerbird_core::config::{self, BowerbirdConfig};
use bowerbird_core::logging;

pub fn run_config(cfg: &BowerbirdConfig) -> Result<()> {
    println!("config file: {}", config::config_path()?.display());
    println!("log file:    {}", logging::log_file_path()?.display());
    println!("save root:   {}", cfg.download.root_dir_or_default()?.display());
    println!();
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
