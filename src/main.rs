use anyhow::Context;
use clap::Parser;

use testu01_threads::{
    cli,
    settings::{Args, RunSettings},
};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = RunSettings::from_args(args).context("invalid run configuration")?;
    env_logger::Builder::new().filter_level(settings.log_level_filter()).init();
    cli::run_cli(settings).context("run failed")?;
    Ok(())
}
