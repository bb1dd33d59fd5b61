use std::time::Duration;

use tonic::transport::{Channel, Endpoint};

use crate::arbiter::{ArbiterProtocol, HeartbeatReply, HeartbeatRequest, Registration};
use crate::config::ArbiterConfig;
use crate::error::{CoordinatorError, Result};
use crate::proto::arbiter_service_client::ArbiterServiceClient;
use crate::proto::{AllocateRequest, RegisterRequest, UnregisterRequest};
use crate::rpc::{
    final_status_to_proto, proto_to_capability, proto_to_outcome, proto_to_slot,
    request_to_proto,
};
use crate::slot::{ClusterLimits, FinalStatus};

/// [`ArbiterProtocol`] over gRPC.
#[derive(Clone)]
pub struct GrpcArbiter {
    client: ArbiterServiceClient<Channel>,
}

impl GrpcArbiter {
    pub async fn connect(config: &ArbiterConfig) -> Result<Self> {
        let endpoint = Endpoint::from_shared(config.address.clone())?
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .connect_timeout(Duration::from_millis(config.rpc_timeout_ms));

        let channel = endpoint.connect().await?;
        tracing::info!(addr = %config.address, "Connected to arbiter");

        Ok(Self {
            client: ArbiterServiceClient::new(channel),
        })
    }
}

#[tonic::async_trait]
impl ArbiterProtocol for GrpcArbiter {
    async fn register(&self, registration: &Registration) -> Result<ClusterLimits> {
        let mut client = self.client.clone();
        let response = client
            .register(RegisterRequest {
                host: registration.host.clone(),
                rpc_port: registration.port,
                tracking_url: registration.tracking_url.clone().unwrap_or_default(),
            })
            .await
            .map_err(|status| CoordinatorError::Registration(status.message().to_string()))?
            .into_inner();

        let max_capability = response
            .max_capability
            .as_ref()
            .map(proto_to_capability)
            .ok_or_else(|| {
                CoordinatorError::InvalidResponse("arbiter: register without max capability".to_string())
            })?;

        Ok(ClusterLimits::new(max_capability))
    }

    async fn allocate(&self, request: HeartbeatRequest) -> Result<HeartbeatReply> {
        let mut client = self.client.clone();
        let response = client
            .allocate(AllocateRequest {
                asks: request.asks.iter().map(request_to_proto).collect(),
                progress: request.progress,
            })
            .await
            .map_err(|status| CoordinatorError::Heartbeat(status.message().to_string()))?
            .into_inner();

        let allocated = response
            .allocated
            .iter()
            .map(proto_to_slot)
            .collect::<Result<Vec<_>>>()?;

        Ok(HeartbeatReply {
            allocated,
            completed: response.completed.iter().map(proto_to_outcome).collect(),
            shutdown_requested: response.shutdown_requested,
        })
    }

    async fn unregister(
        &self,
        status: FinalStatus,
        message: &str,
        tracking_url: Option<&str>,
    ) -> Result<()> {
        let mut client = self.client.clone();
        client
            .unregister(UnregisterRequest {
                final_status: final_status_to_proto(status) as i32,
                diagnostics: message.to_string(),
                tracking_url: tracking_url.unwrap_or_default().to_string(),
            })
            .await
            .map_err(|status| CoordinatorError::Unregistration(status.message().to_string()))?;
        Ok(())
    }
}
