//! Node lifecycle bootstrap
//!
//! Brings a freshly launched instance into its cluster: finds itself in the
//! resource config, trades the join credential through the secret store,
//! joins the control plane, waits for the membership to show up and labels
//! the registered node.

pub mod config;
pub mod error;
pub mod exec;
pub mod identity;
pub mod join;
pub mod labels;
pub mod pipeline;
pub mod poll;
pub mod readiness;
pub mod rendezvous;
pub mod role;
pub mod store;
pub mod topology;

pub use config::BootstrapConfig;
pub use error::{BootstrapError, Result};
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use join::{JoinExecutor, JoinOutcome};
pub use labels::{labels_for, LabelSet, NodeLabelApplier};
pub use pipeline::{BootstrapReport, Bootstrapper};
pub use poll::{poll_until, PollError};
pub use readiness::{Readiness, ReadinessWaiter};
pub use rendezvous::{await_credential, mint_credential, publish_credential, JoinCredential};
pub use role::{resolve_node, NodeRole, ProvisioningParameters, ResolvedNode};
pub use store::{secret_key, SecretStore, SecretsManagerStore, StoreError};
pub use topology::{derived_name, ClusterArn, ClusterIdentity, Member, TopologyDescriptor};
