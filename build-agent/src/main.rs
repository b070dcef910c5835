mod client;
mod commands;
mod config;
mod discovery;
mod output;
mod rpc;
mod server;
mod telemetry;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::Level;

use commands::build::BuildArgs;
use commands::cancel::CancelArgs;
use commands::listen::ListenArgs;
use commands::status::StatusArgs;
use commands::submit::SubmitArgs;

#[derive(Parser)]
#[command(name = "build-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run builds locally, listen for submitted jobs, or submit jobs to agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true, env = "BUILD_AGENT_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one build locally
    Build(BuildArgs),

    /// Serve a build queue to remote submitters
    Listen(ListenArgs),

    /// Submit a project to agents
    Submit(SubmitArgs),

    /// Query build status on an agent
    Status(StatusArgs),

    /// Cancel a build on an agent
    Cancel(CancelArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json_logs, level);

    match cli.command {
        Commands::Build(args) => commands::build::execute(args).await,
        Commands::Listen(args) => commands::listen::execute(args).await,
        Commands::Submit(args) => commands::submit::execute(args).await,
        Commands::Status(args) => commands::status::execute(args).await,
        Commands::Cancel(args) => commands::cancel::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit_with_host() {
        let cli = Cli::try_parse_from([
            "build-agent",
            "--verbose",
            "submit",
            "project.yaml",
            "--target",
            "linux",
            "--host",
            "10.0.0.5:5511",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.target.as_deref(), Some("linux"));
                assert_eq!(args.host.as_deref(), Some("10.0.0.5:5511"));
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_status_wait_requires_build_id() {
        assert!(Cli::try_parse_from(["build-agent", "status", "--wait"]).is_err());
        assert!(Cli::try_parse_from(["build-agent", "status", "3", "--wait"]).is_ok());
    }
}
