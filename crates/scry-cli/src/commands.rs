//! Subcommand definitions.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start every service, connect the socket and watch for model changes.
    ///
    /// Events are printed to stdout as JSON lines. Lines read from stdin are
    /// sent as prompts; `/cancel <id>`, `/clear`, `/restart`, `/status` and
    /// `/logs <name>` are commands.
    Run {
        /// Skip the control and transfer services
        #[arg(long)]
        no_services: bool,

        /// Do not watch the configuration artifact
        #[arg(long)]
        no_watch: bool,
    },

    /// Probe every configured service once and print the result.
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective settings as JSON.
    Settings {
        /// Only validate, print nothing on success
        #[arg(long)]
        check: bool,
    },
}
