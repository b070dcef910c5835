use crate::client::AgentClient;
use crate::config::DEFAULT_RPC_PORT;
use crate::output;

use clap::Args;
use color_eyre::Result;

/// Cancel a build on an agent
#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Build id returned by submit
    pub build_id: u64,

    /// Agent address (host:port)
    #[arg(long, env = "BUILD_AGENT_HOST", default_value_t = format!("127.0.0.1:{}", DEFAULT_RPC_PORT))]
    pub host: String,
}

pub async fn execute(args: CancelArgs) -> Result<()> {
    let mut client = AgentClient::connect(&args.host).await?;
    let build = client.cancel(args.build_id).await?;

    output::status("Cancel", &format!("requested on {}", client.address()));
    output::build_report(&build);
    Ok(())
}
