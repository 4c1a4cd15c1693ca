/// Per-node bootstrap pipeline.
///
/// Resolve → (publish | await credential → join) → readiness → labels.
/// Strictly sequential and fail-fast: a failed step stops the pipeline and the
/// whole run can be repeated from the start.
use crate::config::BootstrapConfig;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::join::{JoinExecutor, JoinOutcome};
use crate::labels::{labels_for, LabelSet, NodeLabelApplier};
use crate::readiness::{Readiness, ReadinessWaiter};
use crate::rendezvous::{await_credential, mint_credential, publish_credential};
use crate::role::{resolve_node, NodeRole, ProvisioningParameters};
use crate::store::{secret_key, SecretStore};
use crate::topology::TopologyDescriptor;
use std::future::Future;
use std::net::Ipv4Addr;

/// What a bootstrap run did.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub node_name: String,
    pub role: NodeRole,
    /// `None` on the control node, which publishes instead of joining.
    pub join: Option<JoinOutcome>,
    pub configuration: Readiness,
    pub membership: Readiness,
    pub labels: LabelSet,
}

pub struct Bootstrapper<'a> {
    topology: &'a TopologyDescriptor,
    params: &'a ProvisioningParameters,
    config: &'a BootstrapConfig,
    runner: &'a dyn CommandRunner,
    store: &'a dyn SecretStore,
}

async fn timed<F: Future>(step: &str, fut: F) -> F::Output {
    let step_start = tokio::time::Instant::now();
    let output = fut.await;
    tracing::info!(
        "[TIMING] Step {} completed in {}ms",
        step,
        step_start.elapsed().as_millis()
    );
    output
}

impl<'a> Bootstrapper<'a> {
    pub fn new(
        topology: &'a TopologyDescriptor,
        params: &'a ProvisioningParameters,
        config: &'a BootstrapConfig,
        runner: &'a dyn CommandRunner,
        store: &'a dyn SecretStore,
    ) -> Self {
        Self {
            topology,
            params,
            config,
            runner,
            store,
        }
    }

    /// Bring the node at `local` into the cluster.
    pub async fn run(&self, local: Ipv4Addr) -> Result<BootstrapReport> {
        let node = resolve_node(self.topology, self.params, local)?;
        let key = secret_key(
            &self.config.rendezvous.secret_prefix,
            self.topology.identity(),
        );

        let join = if node.role.joins() {
            let credential = timed(
                "rendezvous",
                await_credential(
                    self.store,
                    &key,
                    self.config.rendezvous.interval(),
                    self.config.rendezvous.timeout(),
                ),
            )
            .await?;

            let executor = JoinExecutor::new(self.runner, &self.config.commands, &self.config.join);
            Some(timed("join", executor.join(&credential)).await?)
        } else {
            let credential =
                timed("mint", mint_credential(self.runner, &self.config.commands)).await?;
            timed("publish", publish_credential(self.store, &key, &credential)).await?;
            None
        };

        let waiter = ReadinessWaiter::new(
            self.runner,
            &self.config.readiness,
            &self.config.commands,
        )
        .with_workload_manager(self.params.workload_manager.as_deref());
        let controllers = self.topology.addresses_of_group(&self.params.controller_group);

        let configuration = timed(
            "configuration-propagation",
            waiter.configuration_propagated(&controllers),
        )
        .await;
        if !configuration.is_ready() {
            tracing::warn!("[Bootstrap] Workload manager config not propagated yet; continuing");
        }

        let membership = timed("membership", waiter.membership_visible()).await;
        if !membership.is_ready() {
            tracing::warn!("[Bootstrap] Membership not visible yet; continuing");
        }

        let labels = labels_for(node.member, self.topology.identity(), &self.config.labels);
        let applier = NodeLabelApplier::new(self.runner, &self.config.commands);
        timed("labels", applier.apply_labels(&node.member.name, &labels)).await?;

        tracing::info!(
            "[Bootstrap] Success: {} ({}) bootstrap completed",
            node.member.name,
            node.role
        );

        Ok(BootstrapReport {
            node_name: node.member.name.clone(),
            role: node.role,
            join,
            configuration,
            membership,
            labels,
        })
    }
}
