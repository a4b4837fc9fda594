use anyhow::Result;
use clap::Parser;

use cellmtx::cli::{self, Cli};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    cli::run(&cli)
}
