mod cli;
mod paths;
mod run;

use anyhow::Result;
use tracing::debug;

use crate::cli::Command;
use crate::paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let app_paths = AppPaths::discover()?;
    let (config, origin) = paths::load_config(cli.config.as_deref(), &app_paths)?;
    debug!(?origin, config_dir = %app_paths.config_dir().display(), "configuration loaded");

    match cli.command {
        Command::Load(args) => run::run_load(args, config),
        Command::Render(args) => run::run_render(args, config),
        Command::Session(args) => run::run_session(args, config),
        Command::Config => run::print_config(&config),
    }
}
