//! CLI entry point - the composition root.
//!
//! Parses arguments, loads settings, wires the runtime through `bootstrap`
//! and dispatches to a handler. Errors carrying a `CliError` map to its exit
//! code.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use scry_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers, load_cli_settings};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,scry_core=debug,scry_runtime=debug,scry_cli=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let mut config = CliConfig {
        settings_path: cli.settings,
        watch_artifact: false,
    };
    let settings = load_cli_settings(&config)?;

    match command {
        Commands::Run {
            no_services,
            no_watch,
        } => {
            config.watch_artifact = !no_watch;
            let ctx = bootstrap(settings, &config)?;
            handlers::run::execute(&ctx, !no_services).await?;
        }
        Commands::Status { json } => {
            handlers::status::execute(&settings, json).await?;
        }
        Commands::Settings { check } => {
            handlers::settings::execute(&settings, check)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads `SCRY_SETTINGS`
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e:#}");
        let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}
