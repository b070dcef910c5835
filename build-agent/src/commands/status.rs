use crate::client::AgentClient;
use crate::config::DEFAULT_RPC_PORT;
use crate::output;
use crate::rpc::BuildState;

use std::time::Duration;

use clap::Args;
use color_eyre::Result;

/// Show one build, or every build an agent knows about
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Build id; lists all builds when omitted
    pub build_id: Option<u64>,

    /// Agent address (host:port)
    #[arg(long, env = "BUILD_AGENT_HOST", default_value_t = format!("127.0.0.1:{}", DEFAULT_RPC_PORT))]
    pub host: String,

    /// Poll until the build finishes; exits non-zero unless it succeeds
    #[arg(long, requires = "build_id")]
    pub wait: bool,
}

fn is_finished(state: BuildState) -> bool {
    matches!(
        state,
        BuildState::Succeeded | BuildState::Failed | BuildState::Cancelled
    )
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let mut client = AgentClient::connect(&args.host).await?;

    let Some(build_id) = args.build_id else {
        let builds = client.list().await?;
        output::status("Builds", &format!("on {}", client.address()));
        if builds.is_empty() {
            output::dim("  No builds");
        }
        for build in &builds {
            println!("  {}", output::build_line(build));
        }
        return Ok(());
    };

    let mut build = client.status(build_id).await?;
    if args.wait {
        while !is_finished(build.status()) {
            tokio::time::sleep(Duration::from_secs(1)).await;
            build = client.status(build_id).await?;
        }
    }

    output::build_report(&build);
    if args.wait && build.status() != BuildState::Succeeded {
        std::process::exit(1);
    }
    Ok(())
}
