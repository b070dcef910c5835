use crate::config::AgentConfig;
use crate::discovery::{broadcast_beacons, AgentBeacon};
use crate::output;
use crate::server::{serve, AgentService};

use std::sync::Arc;

use clap::Args;
use color_eyre::Result;
use tokio::net::TcpListener;

use build_pipeline::pipeline::LogLevel;
use build_pipeline::{
    progress_channel, BuildEvent, BuildQueue, PipelineRunner, ProgressReceiver, StepRegistry,
};

/// Accept builds from remote submitters and run them one at a time
#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub agent: AgentConfig,
}

pub async fn execute(args: ListenArgs) -> Result<()> {
    let config = args.agent;
    let agent_name = config.agent_name();

    let registry = Arc::new(StepRegistry::with_builtin_modules());
    let (tx, rx) = progress_channel();
    let runner = PipelineRunner::new(Arc::clone(&registry)).with_progress(tx.clone());
    let queue = Arc::new(BuildQueue::with_runner(runner, config.queue.queue_config()).with_progress(tx));
    queue.start_queue()?;
    tokio::spawn(log_events(rx));

    let listener = TcpListener::bind(config.listen).await?;
    let address = listener.local_addr()?;

    let beacon_task = if config.no_beacon {
        None
    } else {
        let beacon = AgentBeacon::new(&agent_name, address.port());
        let port = config.discovery_port;
        let interval = config.beacon_interval();
        Some(tokio::spawn(async move {
            if let Err(e) = broadcast_beacons(beacon, port, interval).await {
                tracing::warn!(error = %e, "discovery beacon stopped");
            }
        }))
    };

    output::success(&format!("Agent '{}' listening on {}", agent_name, address));
    output::dim(&format!(
        "  builds in {}",
        queue.config().output_root.display()
    ));

    let service = AgentService::new(agent_name, Arc::clone(&queue), registry);
    let served = serve(listener, service, shutdown_signal()).await;

    if let Some(task) = beacon_task {
        task.abort();
    }
    queue.stop_queue();
    served?;

    output::info("Agent stopped");
    Ok(())
}

/// Resolves on Ctrl-C; never resolves when the signal cannot be installed
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Mirror queue progress into the log
async fn log_events(mut rx: ProgressReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            BuildEvent::BuildQueued {
                build_id,
                project_name,
                target_name,
            } => {
                tracing::info!(build_id, project = %project_name, target = ?target_name, "build accepted");
            }
            BuildEvent::BuildCompleted {
                project_name,
                target_name,
                status,
                duration,
            } => {
                tracing::info!(project = %project_name, target = %target_name, %status, ?duration, "build finished");
            }
            BuildEvent::StageCompleted {
                stage,
                status,
                duration,
            } => {
                tracing::info!(%stage, ?status, ?duration, "stage finished");
            }
            BuildEvent::StageSkipped { stage, reason } => {
                tracing::info!(%stage, %reason, "stage skipped");
            }
            BuildEvent::StepOutput {
                step_type, output, ..
            } => {
                tracing::debug!(step = %step_type, "{}", output);
            }
            BuildEvent::Log { level, message } => match level {
                LogLevel::Error => tracing::error!("{}", message),
                LogLevel::Warning => tracing::warn!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
            },
            _ => {}
        }
    }
}
