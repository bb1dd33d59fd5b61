use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};

use crate::agent::AgentProtocol;
use crate::config::AgentConfig;
use crate::error::{CoordinatorError, Result};
use crate::launch::LaunchContext;
use crate::proto::agent_service_client::AgentServiceClient;
use crate::proto::{GetContainerStatusRequest, StartContainerRequest, StopContainerRequest};
use crate::rpc::{launch_context_to_proto, proto_to_container_status, slot_to_proto};
use crate::slot::{ContainerStatus, Slot};

/// [`AgentProtocol`] over gRPC, one cached connection per agent node.
#[derive(Clone)]
pub struct GrpcAgent {
    rpc_timeout: Duration,
    pool: Arc<Mutex<HashMap<String, AgentServiceClient<Channel>>>>,
}

impl GrpcAgent {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            rpc_timeout: Duration::from_millis(config.rpc_timeout_ms),
            pool: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get or create a cached connection to the agent at `node_address`.
    async fn get_client(&self, slot: &Slot) -> Result<AgentServiceClient<Channel>> {
        let mut pool = self.pool.lock().await;

        if let Some(client) = pool.get(&slot.node_address) {
            return Ok(client.clone());
        }

        let uri = if slot.node_address.contains("://") {
            slot.node_address.clone()
        } else {
            format!("http://{}", slot.node_address)
        };
        let channel = Endpoint::from_shared(uri)?
            .timeout(self.rpc_timeout)
            .connect_timeout(self.rpc_timeout)
            .connect()
            .await
            .map_err(|e| CoordinatorError::Agent {
                slot_id: slot.id.to_string(),
                message: format!("failed to connect to {}: {}", slot.node_address, e),
            })?;
        tracing::debug!(node = %slot.node_address, "Connected to agent");

        let client = AgentServiceClient::new(channel);
        pool.insert(slot.node_address.clone(), client.clone());
        Ok(client)
    }

    fn rpc_error(slot: &Slot, status: tonic::Status) -> CoordinatorError {
        CoordinatorError::Agent {
            slot_id: slot.id.to_string(),
            message: status.message().to_string(),
        }
    }
}

#[tonic::async_trait]
impl AgentProtocol for GrpcAgent {
    async fn start_container(&self, slot: &Slot, context: &LaunchContext) -> Result<()> {
        let mut client = self.get_client(slot).await?;
        client
            .start_container(StartContainerRequest {
                container: Some(slot_to_proto(slot)),
                launch_context: Some(launch_context_to_proto(context)),
            })
            .await
            .map_err(|status| Self::rpc_error(slot, status))?;
        Ok(())
    }

    async fn container_status(&self, slot: &Slot) -> Result<ContainerStatus> {
        let mut client = self.get_client(slot).await?;
        let response = client
            .get_container_status(GetContainerStatusRequest {
                container_id: slot.id.to_string(),
            })
            .await
            .map_err(|status| Self::rpc_error(slot, status))?
            .into_inner();
        Ok(proto_to_container_status(&response))
    }

    async fn stop_container(&self, slot: &Slot) -> Result<()> {
        let mut client = self.get_client(slot).await?;
        client
            .stop_container(StopContainerRequest {
                container_id: slot.id.to_string(),
            })
            .await
            .map_err(|status| Self::rpc_error(slot, status))?;
        Ok(())
    }
}
