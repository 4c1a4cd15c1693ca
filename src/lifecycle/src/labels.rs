/// Descriptive node labels applied after the join.
use crate::config::{CommandConfig, LabelConfig};
use crate::error::{BootstrapError, Result};
use crate::exec::CommandRunner;
use crate::topology::{ClusterIdentity, Member, TopologyDescriptor};
use std::collections::BTreeMap;

pub const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
pub const CLUSTER_LABEL: &str = "sagemaker.aws.dev/cluster";
pub const LAUNCH_TYPE_LABEL: &str = "sagemaker.aws.dev/launch-type";

/// Label key → value. Keys are unique, so applying a set is replace-by-key.
pub type LabelSet = BTreeMap<String, String>;

/// Labels for `member` of the cluster `identity`.
pub fn labels_for(member: &Member, identity: &ClusterIdentity, config: &LabelConfig) -> LabelSet {
    LabelSet::from([
        (INSTANCE_TYPE_LABEL.to_string(), member.instance_type.clone()),
        (CLUSTER_LABEL.to_string(), identity.name.clone()),
        (LAUNCH_TYPE_LABEL.to_string(), config.launch_type.clone()),
    ])
}

pub struct NodeLabelApplier<'a> {
    runner: &'a dyn CommandRunner,
    commands: &'a CommandConfig,
}

impl<'a> NodeLabelApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner, commands: &'a CommandConfig) -> Self {
        Self { runner, commands }
    }

    /// Apply every label in `labels` to `node`, one command per key.
    ///
    /// `--overwrite` makes each call a plain set, so re-running after a
    /// partial failure is safe. Stops at the first failure.
    pub async fn apply_labels(&self, node: &str, labels: &LabelSet) -> Result<()> {
        for (key, value) in labels {
            let mut args = self.commands.kubectl_global_args();
            args.extend([
                "label".to_string(),
                "node".to_string(),
                node.to_string(),
                format!("{}={}", key, value),
                "--overwrite".to_string(),
            ]);

            let output = self
                .runner
                .run(&self.commands.kubectl, &args)
                .await
                .map_err(|source| BootstrapError::Command {
                    program: self.commands.kubectl.clone(),
                    source,
                })?;

            if !output.success() {
                tracing::error!(
                    "[NodeLabelApplier] Labeling {} with {} failed (exit {}): {}",
                    node,
                    key,
                    output.exit_code,
                    output.last_line()
                );
                return Err(BootstrapError::Label {
                    node: node.to_string(),
                    key: key.clone(),
                    exit_code: output.exit_code,
                    message: output.last_line().to_string(),
                });
            }
            tracing::debug!("[NodeLabelApplier] {} labeled {}={}", node, key, value);
        }

        tracing::info!("[NodeLabelApplier] Applied {} label(s) to {}", labels.len(), node);
        Ok(())
    }

    /// Label every member of `topology`. Returns the number of nodes labeled.
    pub async fn label_all_members(
        &self,
        topology: &TopologyDescriptor,
        config: &LabelConfig,
    ) -> Result<usize> {
        let mut labeled = 0;
        for member in topology.members() {
            let labels = labels_for(member, topology.identity(), config);
            self.apply_labels(&member.name, &labels).await?;
            labeled += 1;
        }
        Ok(labeled)
    }
}
