// gRPC agent service
// Exposes a build queue to remote submitters

use crate::rpc::build_agent_server::{BuildAgent, BuildAgentServer};
use crate::rpc::{
    BuildStatusResponse, CancelBuildRequest, ConfigFormat, EnqueueBuildRequest,
    EnqueueBuildResponse, GetBuildStatusRequest, ListBuildsRequest, ListBuildsResponse,
};

use build_pipeline::{BuildQueue, ConfigResolver, StepRegistry};

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

pub struct AgentService {
    agent_name: String,
    queue: Arc<BuildQueue>,
    registry: Arc<StepRegistry>,
}

impl AgentService {
    pub fn new(agent_name: impl Into<String>, queue: Arc<BuildQueue>, registry: Arc<StepRegistry>) -> Self {
        Self {
            agent_name: agent_name.into(),
            queue,
            registry,
        }
    }
}

fn unknown_build(build_id: u64) -> Status {
    Status::not_found(format!("no build with id {}", build_id))
}

#[tonic::async_trait]
impl BuildAgent for AgentService {
    async fn enqueue_build(
        &self,
        request: Request<EnqueueBuildRequest>,
    ) -> Result<Response<EnqueueBuildResponse>, Status> {
        let request = request.into_inner();
        let format = ConfigFormat::try_from(request.format).map_err(|_| {
            Status::invalid_argument(format!("unknown document format {}", request.format))
        })?;

        let project = ConfigResolver::new(&self.registry)
            .load(&request.project_config, format.into())
            .map_err(|e| {
                tracing::warn!(error = %e.message, "rejected submitted project");
                Status::invalid_argument(e.to_string())
            })?;

        let target = Some(request.target).filter(|t| !t.is_empty());
        let build = self.queue.enqueue_build(project, target).await;

        Ok(Response::new(EnqueueBuildResponse {
            build_id: build.id,
            agent_name: self.agent_name.clone(),
        }))
    }

    async fn get_build_status(
        &self,
        request: Request<GetBuildStatusRequest>,
    ) -> Result<Response<BuildStatusResponse>, Status> {
        let build_id = request.into_inner().build_id;
        let build = self
            .queue
            .get_build_result(build_id)
            .await
            .ok_or_else(|| unknown_build(build_id))?;
        Ok(Response::new(BuildStatusResponse::from(&build)))
    }

    async fn list_builds(
        &self,
        _request: Request<ListBuildsRequest>,
    ) -> Result<Response<ListBuildsResponse>, Status> {
        let builds = self
            .queue
            .get_all_build_results()
            .await
            .iter()
            .map(BuildStatusResponse::from)
            .collect();
        Ok(Response::new(ListBuildsResponse { builds }))
    }

    async fn cancel_build(
        &self,
        request: Request<CancelBuildRequest>,
    ) -> Result<Response<BuildStatusResponse>, Status> {
        let build_id = request.into_inner().build_id;
        let build = self
            .queue
            .cancel_build(build_id)
            .await
            .ok_or_else(|| unknown_build(build_id))?;
        Ok(Response::new(BuildStatusResponse::from(&build)))
    }
}

/// Serve `service` on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    service: AgentService,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()>,
{
    Server::builder()
        .add_service(BuildAgentServer::new(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AgentClient;
    use crate::rpc::BuildState;
    use build_pipeline::{DocumentFormat, PipelineRunner, QueueConfig};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    struct TestAgent {
        address: SocketAddr,
        queue: Arc<BuildQueue>,
        shutdown: Option<oneshot::Sender<()>>,
        server: tokio::task::JoinHandle<Result<(), tonic::transport::Error>>,
    }

    impl TestAgent {
        async fn start(output_root: &std::path::Path) -> Self {
            let registry = Arc::new(StepRegistry::with_builtin_modules());
            let queue = Arc::new(BuildQueue::with_runner(
                PipelineRunner::new(Arc::clone(&registry)),
                QueueConfig::new(output_root).with_poll_interval(Duration::from_millis(10)),
            ));
            queue.start_queue().unwrap();

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap();
            let (tx, rx) = oneshot::channel::<()>();
            let service = AgentService::new("test-agent", Arc::clone(&queue), registry);
            let server = tokio::spawn(serve(listener, service, async {
                rx.await.ok();
            }));

            Self {
                address,
                queue,
                shutdown: Some(tx),
                server,
            }
        }

        async fn stop(mut self) {
            if let Some(tx) = self.shutdown.take() {
                tx.send(()).ok();
            }
            self.server.await.unwrap().unwrap();
            self.queue.stop_queue();
        }
    }

    fn local_project(source: &std::path::Path) -> String {
        serde_json::json!({
            "project_name": "demo",
            "targets": [{
                "target_name": "linux",
                "source": { "type": "Local Folder", "path": source }
            }]
        })
        .to_string()
    }

    async fn wait_for_finish(client: &mut AgentClient, build_id: u64) -> BuildStatusResponse {
        for _ in 0..200 {
            let status = client.status(build_id).await.unwrap();
            if matches!(
                status.status(),
                BuildState::Succeeded | BuildState::Failed | BuildState::Cancelled
            ) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("build {} did not finish", build_id);
    }

    #[tokio::test]
    async fn test_submit_and_track_build() {
        let output = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("main.c"), "int main() { return 0; }").unwrap();

        let agent = TestAgent::start(output.path()).await;
        let mut client = AgentClient::connect(&agent.address.to_string()).await.unwrap();

        let accepted = client
            .submit(local_project(source.path()), DocumentFormat::Json, None)
            .await
            .unwrap();
        assert_eq!(accepted.agent_name, "test-agent");

        let finished = wait_for_finish(&mut client, accepted.build_id).await;
        assert_eq!(finished.status(), BuildState::Succeeded, "{}", finished.error);
        assert_eq!(finished.project_name, "demo");
        assert_eq!(finished.target_name, "linux");
        assert_eq!(finished.stages[0].stage, "source");
        assert!(!finished.finished_at.is_empty());

        let listed = client.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].build_id, accepted.build_id);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_project_is_invalid_argument() {
        let output = TempDir::new().unwrap();
        let agent = TestAgent::start(output.path()).await;
        let mut client = AgentClient::connect(&agent.address.to_string()).await.unwrap();

        let document = serde_json::json!({
            "project_name": "demo",
            "targets": [{
                "target_name": "linux",
                "source": { "type": "Carrier Pigeon" }
            }]
        })
        .to_string();
        let status = client
            .submit(document, DocumentFormat::Json, None)
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("Carrier Pigeon"));

        assert!(client.list().await.unwrap().is_empty());
        agent.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_build_is_not_found() {
        let output = TempDir::new().unwrap();
        let agent = TestAgent::start(output.path()).await;
        let mut client = AgentClient::connect(&agent.address.to_string()).await.unwrap();

        let status = client.status(42).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
        let status = client.cancel(42).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);

        agent.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_target_fails_the_build() {
        let output = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        let agent = TestAgent::start(output.path()).await;
        let mut client = AgentClient::connect(&agent.address.to_string()).await.unwrap();

        let accepted = client
            .submit(
                local_project(source.path()),
                DocumentFormat::Json,
                Some("windows".to_string()),
            )
            .await
            .unwrap();
        let finished = wait_for_finish(&mut client, accepted.build_id).await;
        assert_eq!(finished.status(), BuildState::Failed);
        assert!(finished.error.contains("windows"));

        agent.stop().await;
    }
}
