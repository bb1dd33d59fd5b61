//! Conversions between wire messages and the slot data model.

use crate::error::{CoordinatorError, Result};
use crate::launch::{LaunchContext, LocalResource, LocalResourceKind, LocalResourceVisibility};
use crate::proto;
use crate::slot::{
    Capability, ContainerState, ContainerStatus, FinalStatus, Slot, SlotId, SlotRequest,
    WorkUnitOutcome,
};

pub fn capability_to_proto(capability: &Capability) -> proto::Resource {
    proto::Resource {
        memory_mb: capability.memory_mb,
        vcores: capability.vcores,
    }
}

pub fn proto_to_capability(resource: &proto::Resource) -> Capability {
    Capability::new(resource.memory_mb, resource.vcores)
}

fn hint_to_proto(hint: &Option<String>) -> String {
    hint.clone().unwrap_or_default()
}

fn proto_to_hint(hint: &str) -> Option<String> {
    if hint.is_empty() {
        None
    } else {
        Some(hint.to_string())
    }
}

pub fn request_to_proto(request: &SlotRequest) -> proto::ResourceRequest {
    proto::ResourceRequest {
        capability: Some(capability_to_proto(&request.capability)),
        priority: request.priority,
        node_hint: hint_to_proto(&request.node_hint),
        rack_hint: hint_to_proto(&request.rack_hint),
    }
}

pub fn proto_to_request(request: &proto::ResourceRequest) -> Result<SlotRequest> {
    let capability = request
        .capability
        .as_ref()
        .map(proto_to_capability)
        .ok_or_else(|| CoordinatorError::InvalidResponse("ask without capability".to_string()))?;

    Ok(SlotRequest {
        capability,
        priority: request.priority,
        node_hint: proto_to_hint(&request.node_hint),
        rack_hint: proto_to_hint(&request.rack_hint),
    })
}

pub fn slot_to_proto(slot: &Slot) -> proto::Container {
    proto::Container {
        id: slot.id.to_string(),
        capability: Some(capability_to_proto(&slot.capability)),
        node_address: slot.node_address.clone(),
    }
}

pub fn proto_to_slot(container: &proto::Container) -> Result<Slot> {
    if container.id.is_empty() {
        return Err(CoordinatorError::InvalidResponse(
            "arbiter: container without id".to_string(),
        ));
    }
    let capability = container
        .capability
        .as_ref()
        .map(proto_to_capability)
        .ok_or_else(|| {
            CoordinatorError::InvalidResponse(format!(
                "arbiter: container {} without capability",
                container.id
            ))
        })?;

    Ok(Slot::new(
        container.id.clone(),
        capability,
        container.node_address.clone(),
    ))
}

pub fn outcome_to_proto(outcome: &WorkUnitOutcome) -> proto::ContainerOutcome {
    proto::ContainerOutcome {
        container_id: outcome.slot_id.to_string(),
        exit_code: outcome.exit_code,
        diagnostics: outcome.diagnostics.clone(),
    }
}

pub fn proto_to_outcome(outcome: &proto::ContainerOutcome) -> WorkUnitOutcome {
    WorkUnitOutcome::new(
        outcome.container_id.clone(),
        outcome.exit_code,
        outcome.diagnostics.clone(),
    )
}

pub fn final_status_to_proto(status: FinalStatus) -> proto::FinalStatus {
    match status {
        FinalStatus::Succeeded => proto::FinalStatus::Succeeded,
        FinalStatus::Failed => proto::FinalStatus::Failed,
        FinalStatus::Killed => proto::FinalStatus::Killed,
    }
}

pub fn proto_to_final_status(status: proto::FinalStatus) -> Option<FinalStatus> {
    match status {
        proto::FinalStatus::Succeeded => Some(FinalStatus::Succeeded),
        proto::FinalStatus::Failed => Some(FinalStatus::Failed),
        proto::FinalStatus::Killed => Some(FinalStatus::Killed),
        proto::FinalStatus::Unspecified => None,
    }
}

fn local_resource_to_proto(resource: &LocalResource) -> proto::LocalResource {
    let kind = match resource.kind {
        LocalResourceKind::File => proto::LocalResourceKind::File,
        LocalResourceKind::Archive => proto::LocalResourceKind::Archive,
        LocalResourceKind::Pattern => proto::LocalResourceKind::Pattern,
    };
    let visibility = match resource.visibility {
        LocalResourceVisibility::Private => proto::LocalResourceVisibility::Private,
        LocalResourceVisibility::Application => proto::LocalResourceVisibility::Application,
        LocalResourceVisibility::Public => proto::LocalResourceVisibility::Public,
    };

    proto::LocalResource {
        url: resource.url.clone(),
        size: resource.size,
        timestamp: resource.timestamp,
        kind: kind as i32,
        visibility: visibility as i32,
    }
}

pub fn launch_context_to_proto(context: &LaunchContext) -> proto::LaunchContext {
    proto::LaunchContext {
        commands: context.commands.clone(),
        environment: context
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        local_resources: context
            .local_resources
            .iter()
            .map(|(name, resource)| (name.clone(), local_resource_to_proto(resource)))
            .collect(),
        tokens: context.tokens.clone(),
    }
}

pub fn proto_to_container_status(response: &proto::GetContainerStatusResponse) -> ContainerStatus {
    let state = match response.state() {
        proto::ContainerState::New => ContainerState::New,
        proto::ContainerState::Running => ContainerState::Running,
        proto::ContainerState::Complete => ContainerState::Complete,
    };

    ContainerStatus {
        slot_id: SlotId::new(response.container_id.clone()),
        state,
        exit_code: if state == ContainerState::Complete {
            Some(response.exit_code)
        } else {
            None
        },
        diagnostics: response.diagnostics.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hints_map_to_none() {
        let req = SlotRequest::new(Capability::new(128, 1), 0);
        let wire = request_to_proto(&req);
        assert!(wire.node_hint.is_empty());
        assert!(wire.rack_hint.is_empty());
        assert_eq!(proto_to_request(&wire).unwrap(), req);
    }

    #[test]
    fn container_without_capability_is_rejected() {
        let wire = proto::Container {
            id: "container_1".to_string(),
            capability: None,
            node_address: "127.0.0.1:9000".to_string(),
        };
        assert!(proto_to_slot(&wire).is_err());
    }

    #[test]
    fn container_without_id_is_rejected() {
        let wire = proto::Container {
            id: String::new(),
            capability: Some(capability_to_proto(&Capability::new(128, 1))),
            node_address: "127.0.0.1:9000".to_string(),
        };
        assert!(proto_to_slot(&wire).is_err());
    }

    #[test]
    fn unspecified_final_status_has_no_domain_value() {
        assert_eq!(proto_to_final_status(proto::FinalStatus::Unspecified), None);
        assert_eq!(
            proto_to_final_status(final_status_to_proto(FinalStatus::Killed)),
            Some(FinalStatus::Killed)
        );
    }

    #[test]
    fn running_container_has_no_exit_code() {
        let response = proto::GetContainerStatusResponse {
            container_id: "container_7".to_string(),
            state: proto::ContainerState::Running as i32,
            exit_code: 0,
            diagnostics: String::new(),
        };
        let status = proto_to_container_status(&response);
        assert_eq!(status.state, ContainerState::Running);
        assert_eq!(status.exit_code, None);
    }

    #[test]
    fn launch_context_carries_resources_and_tokens() {
        let mut context = LaunchContext {
            commands: vec!["true".to_string()],
            tokens: vec![7, 7, 7],
            ..LaunchContext::default()
        };
        context
            .local_resources
            .insert("unit.bin".to_string(), LocalResource::file("hdfs://nn/unit.bin"));

        let wire = launch_context_to_proto(&context);
        assert_eq!(wire.tokens, vec![7, 7, 7]);
        let resource = &wire.local_resources["unit.bin"];
        assert_eq!(resource.url, "hdfs://nn/unit.bin");
        assert_eq!(resource.kind, proto::LocalResourceKind::File as i32);
        assert_eq!(
            resource.visibility,
            proto::LocalResourceVisibility::Private as i32
        );
    }
}
