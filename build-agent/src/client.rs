// gRPC client for a remote build agent

use crate::rpc::build_agent_client::BuildAgentClient;
use crate::rpc::{
    BuildStatusResponse, CancelBuildRequest, ConfigFormat, EnqueueBuildRequest,
    EnqueueBuildResponse, GetBuildStatusRequest, ListBuildsRequest,
};

use build_pipeline::DocumentFormat;

use tonic::transport::Channel;
use tonic::Status;

pub struct AgentClient {
    inner: BuildAgentClient<Channel>,
    address: String,
}

/// `host:port` becomes `http://host:port`; explicit schemes are kept
fn endpoint_uri(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

impl AgentClient {
    pub async fn connect(address: &str) -> Result<Self, tonic::transport::Error> {
        let inner = BuildAgentClient::connect(endpoint_uri(address)).await?;
        Ok(Self {
            inner,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Enqueue a serialized project; `None` builds the first target
    pub async fn submit(
        &mut self,
        document: String,
        format: DocumentFormat,
        target: Option<String>,
    ) -> Result<EnqueueBuildResponse, Status> {
        let request = EnqueueBuildRequest {
            project_config: document,
            target: target.unwrap_or_default(),
            format: ConfigFormat::from(format) as i32,
        };
        Ok(self.inner.enqueue_build(request).await?.into_inner())
    }

    pub async fn status(&mut self, build_id: u64) -> Result<BuildStatusResponse, Status> {
        let response = self
            .inner
            .get_build_status(GetBuildStatusRequest { build_id })
            .await?;
        Ok(response.into_inner())
    }

    pub async fn list(&mut self) -> Result<Vec<BuildStatusResponse>, Status> {
        let response = self.inner.list_builds(ListBuildsRequest {}).await?;
        Ok(response.into_inner().builds)
    }

    pub async fn cancel(&mut self, build_id: u64) -> Result<BuildStatusResponse, Status> {
        let response = self
            .inner
            .cancel_build(CancelBuildRequest { build_id })
            .await?;
        Ok(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uri() {
        assert_eq!(endpoint_uri("10.0.0.5:5511"), "http://10.0.0.5:5511");
        assert_eq!(endpoint_uri("https://agent:5511"), "https://agent:5511");
    }
}
