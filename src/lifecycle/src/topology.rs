//! Static cluster topology loaded from the resource config document.
//!
//! The document lists every instance group and its instances. It is read once
//! at startup and never mutated; components receive it by reference.

use crate::error::{BootstrapError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

const ARN_PREFIX: &str = "arn:aws:sagemaker:";

/// Structured parts of a cluster ARN
/// (`arn:aws:sagemaker:<region>:<account>:cluster/<cluster-id>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterArn {
    pub region: String,
    pub account: String,
    pub cluster_id: String,
}

impl FromStr for ClusterArn {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BootstrapError::Parse(format!("Malformed cluster ARN '{}'", s));

        let rest = s.strip_prefix(ARN_PREFIX).ok_or_else(invalid)?;
        let mut parts = rest.splitn(3, ':');
        let (region, account, resource) = match (parts.next(), parts.next(), parts.next()) {
            (Some(r), Some(a), Some(res)) => (r, a, res),
            _ => return Err(invalid()),
        };
        let cluster_id = resource.strip_prefix("cluster/").ok_or_else(invalid)?;

        let region_ok = !region.is_empty()
            && region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        let account_ok = !account.is_empty() && account.chars().all(|c| c.is_ascii_digit());
        let id_ok = !cluster_id.is_empty()
            && cluster_id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

        if !(region_ok && account_ok && id_ok) {
            return Err(invalid());
        }

        Ok(Self {
            region: region.to_string(),
            account: account.to_string(),
            cluster_id: cluster_id.to_string(),
        })
    }
}

/// Cluster name plus its decomposed ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub name: String,
    pub arn: String,
    pub parsed: ClusterArn,
}

impl ClusterIdentity {
    pub fn new(name: impl Into<String>, arn: impl Into<String>) -> Result<Self> {
        let arn = arn.into();
        let parsed = arn.parse()?;
        Ok(Self {
            name: name.into(),
            arn,
            parsed,
        })
    }

    pub fn region(&self) -> &str {
        &self.parsed.region
    }

    pub fn cluster_id(&self) -> &str {
        &self.parsed.cluster_id
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.arn)
    }
}

/// Node name for a data address: octets joined with `-` behind an `ip-` prefix.
///
/// Distinct IPv4 addresses always give distinct names.
pub fn derived_name(address: Ipv4Addr) -> String {
    let [a, b, c, d] = address.octets();
    format!("ip-{}-{}-{}-{}", a, b, c, d)
}

/// One cluster instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub instance_id: String,
    pub instance_name: String,
    pub group_name: String,
    pub instance_type: String,
    /// Address used by the platform agent.
    pub control_address: Ipv4Addr,
    /// Address the node is reachable on inside the customer network.
    pub data_address: Ipv4Addr,
    /// Always `derived_name(data_address)`.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceGroup {
    pub name: String,
    pub instance_type: String,
    pub members: Vec<Member>,
}

/// Immutable view of all cluster members.
#[derive(Debug, Clone)]
pub struct TopologyDescriptor {
    identity: ClusterIdentity,
    groups: Vec<InstanceGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceConfigDocument {
    cluster_config: ClusterConfigDocument,
    #[serde(default)]
    instance_groups: Vec<InstanceGroupDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClusterConfigDocument {
    cluster_arn: String,
    cluster_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceGroupDocument {
    name: String,
    instance_type: String,
    #[serde(default)]
    instances: Vec<InstanceDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceDocument {
    agent_ip_address: Ipv4Addr,
    customer_ip_address: Ipv4Addr,
    instance_id: String,
    #[serde(default)]
    instance_name: String,
}

impl TopologyDescriptor {
    /// Load the resource config document from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::Parse(format!("Failed to read resource config {:?}: {}", path, e))
        })?;
        let topology = Self::from_json(&content).map_err(|e| match e {
            BootstrapError::Parse(msg) => {
                BootstrapError::Parse(format!("{} (in {:?})", msg, path))
            }
            other => other,
        })?;

        tracing::info!(
            "[Topology] Loaded {} member(s) in {} group(s) for cluster {} from {:?}",
            topology.members().count(),
            topology.groups.len(),
            topology.identity,
            path
        );
        Ok(topology)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let doc: ResourceConfigDocument = serde_json::from_str(content)
            .map_err(|e| BootstrapError::Parse(format!("Invalid resource config: {}", e)))?;

        let identity =
            ClusterIdentity::new(doc.cluster_config.cluster_name, doc.cluster_config.cluster_arn)?;

        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(doc.instance_groups.len());
        for group in doc.instance_groups {
            let mut members = Vec::with_capacity(group.instances.len());
            for instance in group.instances {
                if !seen.insert(instance.customer_ip_address) {
                    return Err(BootstrapError::Parse(format!(
                        "Address {} is assigned to more than one instance",
                        instance.customer_ip_address
                    )));
                }
                members.push(Member {
                    name: derived_name(instance.customer_ip_address),
                    instance_id: instance.instance_id,
                    instance_name: instance.instance_name,
                    group_name: group.name.clone(),
                    instance_type: group.instance_type.clone(),
                    control_address: instance.agent_ip_address,
                    data_address: instance.customer_ip_address,
                });
            }
            groups.push(InstanceGroup {
                name: group.name,
                instance_type: group.instance_type,
                members,
            });
        }

        Ok(Self { identity, groups })
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub fn groups(&self) -> &[InstanceGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&InstanceGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// All members in document order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    /// Data addresses of every member of `group_name`; empty if no such group.
    pub fn addresses_of_group(&self, group_name: &str) -> Vec<Ipv4Addr> {
        self.group(group_name)
            .map(|g| g.members.iter().map(|m| m.data_address).collect())
            .unwrap_or_default()
    }

    /// Find the member whose data address is `local`.
    pub fn resolve_self(&self, local: Ipv4Addr) -> Result<(&InstanceGroup, &Member)> {
        self.groups
            .iter()
            .find_map(|g| {
                g.members
                    .iter()
                    .find(|m| m.data_address == local)
                    .map(|m| (g, m))
            })
            .ok_or_else(|| {
                BootstrapError::NotFound(format!(
                    "This instance ({}) is not in the resource config of cluster {}",
                    local, self.identity.name
                ))
            })
    }
}
