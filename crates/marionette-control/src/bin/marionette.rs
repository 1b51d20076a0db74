//! CLI entrypoint for the marionette host.

#[path = "marionette/cli.rs"]
mod cli;
#[path = "marionette/ctl.rs"]
mod ctl;
#[path = "marionette/serve.rs"]
mod serve;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use cli::{Cli, Command};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
            scene,
            endpoint,
        } => serve::run_serve(config, scene, endpoint, cli.verbose),
        Command::Ctl {
            endpoint,
            config,
            action,
        } => {
            init_tracing("warn", cli.verbose);
            ctl::run_control(endpoint, config, action)
        }
    }
}

/// Log to stderr at `level`; `RUST_LOG` directives still apply.
pub(crate) fn init_tracing(level: &str, verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        level.parse().unwrap_or(LevelFilter::INFO)
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
