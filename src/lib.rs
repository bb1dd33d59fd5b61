pub mod agent;
pub mod arbiter;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod launch;
pub mod rpc;
pub mod shutdown;
pub mod slot;
pub mod submitter;
pub mod tracker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("coordinator");
}
