use crate::client::AgentClient;
use crate::config::DEFAULT_DISCOVERY_PORT;
use crate::discovery::discover_agents;
use crate::output;
use crate::rpc::EnqueueBuildResponse;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use color_eyre::Result;

use build_pipeline::{ConfigResolver, DocumentFormat, StepRegistry};

/// Submit a project to one agent, or to every agent on the network
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Project document (YAML for .yaml/.yml, JSON otherwise)
    pub project: PathBuf,

    /// Target to build (defaults to the first target)
    #[arg(long, short, value_name = "TARGET")]
    pub target: Option<String>,

    /// Agent address (host:port); discovered agents are used when omitted
    #[arg(long, env = "BUILD_AGENT_HOST")]
    pub host: Option<String>,

    /// UDP port agents broadcast beacons on
    #[arg(long, env = "BUILD_AGENT_DISCOVERY_PORT", default_value_t = DEFAULT_DISCOVERY_PORT)]
    pub discovery_port: u16,

    /// How long to listen for beacons, in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub discovery_window_ms: u64,
}

pub async fn execute(args: SubmitArgs) -> Result<()> {
    if !args.project.exists() {
        color_eyre::eyre::bail!("Project file not found: {}", args.project.display());
    }

    let format = DocumentFormat::from_path(&args.project);
    let document = std::fs::read_to_string(&args.project)?;

    // Reject documents the agents would reject anyway
    let registry = StepRegistry::with_builtin_modules();
    let project = ConfigResolver::new(&registry)
        .load(&document, format)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let addresses = match &args.host {
        Some(host) => vec![host.clone()],
        None => {
            output::status(
                "Discovering",
                &format!("agents on UDP port {}", args.discovery_port),
            );
            let agents = discover_agents(
                args.discovery_port,
                Duration::from_millis(args.discovery_window_ms),
            )
            .await?;
            if agents.is_empty() {
                color_eyre::eyre::bail!(
                    "No agents discovered on UDP port {}; pass --host to target one directly",
                    args.discovery_port
                );
            }
            for agent in &agents {
                output::dim(&format!(
                    "  found '{}' ({}) at {}",
                    agent.beacon.agent_name, agent.beacon.version, agent.address
                ));
            }
            agents.iter().map(|a| a.address.to_string()).collect()
        }
    };

    output::status(
        "Submitting",
        &format!("'{}' to {} agent(s)", project.project_name, addresses.len()),
    );

    let mut accepted = 0;
    for address in &addresses {
        match submit_to(address, &document, format, args.target.clone()).await {
            Ok(response) => {
                accepted += 1;
                output::success(&format!(
                    "{} ({}) accepted build #{}",
                    address, response.agent_name, response.build_id
                ));
            }
            Err(e) => output::failure(&format!("{}: {}", address, e)),
        }
    }

    if accepted == 0 {
        color_eyre::eyre::bail!("No agent accepted the build");
    }
    if accepted < addresses.len() {
        output::warning(&format!(
            "{} of {} agent(s) accepted the build",
            accepted,
            addresses.len()
        ));
    }
    Ok(())
}

async fn submit_to(
    address: &str,
    document: &str,
    format: DocumentFormat,
    target: Option<String>,
) -> Result<EnqueueBuildResponse> {
    let mut client = AgentClient::connect(address).await?;
    let response = client.submit(document.to_string(), format, target).await?;
    Ok(response)
}
