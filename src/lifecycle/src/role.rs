//! Role classification of the local node.

use crate::error::{BootstrapError, Result};
use crate::topology::{InstanceGroup, Member, TopologyDescriptor};
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

pub const DEFAULT_CONTROLLER_GROUP: &str = "ControllerGroup";

/// Provisioning parameters shipped alongside the lifecycle scripts.
///
/// Names the groups that play the control and gateway roles. Every other
/// group is a worker group.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningParameters {
    #[serde(default)]
    pub workload_manager: Option<String>,
    #[serde(default = "default_controller_group")]
    pub controller_group: String,
    #[serde(default)]
    pub login_group: Option<String>,
    #[serde(default)]
    pub worker_groups: Vec<WorkerGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerGroup {
    pub instance_group_name: String,
    #[serde(default)]
    pub partition_name: Option<String>,
}

fn default_controller_group() -> String {
    DEFAULT_CONTROLLER_GROUP.to_string()
}

impl Default for ProvisioningParameters {
    fn default() -> Self {
        Self {
            workload_manager: None,
            controller_group: default_controller_group(),
            login_group: None,
            worker_groups: Vec::new(),
        }
    }
}

impl ProvisioningParameters {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::Parse(format!(
                "Failed to read provisioning parameters {:?}: {}",
                path, e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            BootstrapError::Parse(format!(
                "Invalid provisioning parameters {:?}: {}",
                path, e
            ))
        })
    }

    /// Role played by members of `group_name`.
    pub fn role_of(&self, group_name: &str) -> NodeRole {
        if group_name == self.controller_group {
            NodeRole::Control
        } else if self.login_group.as_deref() == Some(group_name) {
            NodeRole::Gateway
        } else {
            NodeRole::Worker
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Hosts the control plane and publishes the join credential.
    Control,
    /// Login/gateway node; joins like a worker.
    Gateway,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Control => "controller",
            NodeRole::Gateway => "login",
            NodeRole::Worker => "compute",
        }
    }

    /// Whether this node consumes the join credential instead of producing it.
    pub fn joins(&self) -> bool {
        !matches!(self, NodeRole::Control)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the local node sits in the topology.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedNode<'a> {
    pub group: &'a InstanceGroup,
    pub member: &'a Member,
    pub role: NodeRole,
}

/// Locate `local` in `topology` and classify its role.
pub fn resolve_node<'a>(
    topology: &'a TopologyDescriptor,
    params: &ProvisioningParameters,
    local: Ipv4Addr,
) -> Result<ResolvedNode<'a>> {
    let (group, member) = topology.resolve_self(local)?;
    let role = params.role_of(&group.name);
    tracing::info!(
        "[RoleResolver] {} is {} ({}) in group {} as {}",
        local,
        member.name,
        member.instance_id,
        group.name,
        role
    );
    Ok(ResolvedNode {
        group,
        member,
        role,
    })
}
