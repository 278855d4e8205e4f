//! Root CLI structure with global options.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Supervise the local inference backend and its companion services.
#[derive(Parser)]
#[command(name = "scry")]
#[command(about = "Supervise the local inference backend and its services")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to <config dir>/scry/settings.json)
    #[arg(long = "settings", env = "SCRY_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from(["scry", "status", "--verbose", "--settings", "/tmp/s.json"]);
        assert!(cli.verbose);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/s.json")));
        assert!(matches!(cli.command, Some(Commands::Status { json: false })));
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["scry", "run", "--no-services", "--no-watch"]);
        match cli.command {
            Some(Commands::Run {
                no_services,
                no_watch,
            }) => {
                assert!(no_services);
                assert!(no_watch);
            }
            _ => panic!("expected run"),
        }
    }
}
