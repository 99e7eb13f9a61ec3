//! circlectl - CLI for the CircleCI REST API
//!
//! Resolves a token and defaults from `~/.circlectl.toml` and the
//! environment, performs one API call per invocation and prints the result.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod build_config;
mod client;
mod commands;
mod config;
mod error;
mod filters;
mod output;

use commands::Cli;
use config::{EnvOverrides, TerminalPrompt};
use error::CliError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Logs go to stderr so stdout stays parseable (RUST_LOG, default warn)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let quiet = cli.quiet();

    let env = EnvOverrides::from_process();
    let mut prompt = TerminalPrompt;

    let code = match cli.execute(&env, &mut prompt).await {
        Ok(()) => 0,
        Err(CliError::Usage(message)) => Cli::command()
            .error(ErrorKind::MissingRequiredArgument, message)
            .exit(),
        Err(err) => {
            if !quiet || matches!(err, CliError::UnknownAction(_)) {
                error::print_error(&err);
            }
            err.exit_code()
        }
    };

    std::process::exit(code);
}
