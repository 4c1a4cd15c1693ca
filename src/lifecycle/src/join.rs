/// Join handshake against the control plane.
///
/// One `kubeadm join` per attempt. A second join on a node that already
/// joined fails kubeadm's preflight checks, so that condition is detected and
/// reported as [`JoinOutcome::AlreadyMember`] instead of an error.
use crate::config::{CommandConfig, JoinConfig};
use crate::error::{BootstrapError, Result};
use crate::exec::{with_prefix, CommandOutput, CommandRunner};
use crate::rendezvous::JoinCredential;

/// Preflight markers kubeadm prints when the kubelet kubeconfig is present.
const ALREADY_JOINED_MARKERS: &[&str] = &[
    "FileAvailable--etc-kubernetes-kubelet.conf",
    "kubelet.conf already exists",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

/// True when a failed join only failed because the node is already a member.
pub fn is_already_member(output: &CommandOutput) -> bool {
    ALREADY_JOINED_MARKERS.iter().any(|m| output.mentions(m))
}

/// Execution context for the join step
pub struct JoinExecutor<'a> {
    runner: &'a dyn CommandRunner,
    commands: &'a CommandConfig,
    config: &'a JoinConfig,
}

impl<'a> JoinExecutor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        commands: &'a CommandConfig,
        config: &'a JoinConfig,
    ) -> Self {
        Self {
            runner,
            commands,
            config,
        }
    }

    fn join_command(&self, credential: &JoinCredential) -> (String, Vec<String>) {
        with_prefix(
            &self.commands.privilege_prefix(),
            &self.commands.kubeadm,
            vec![
                "join".to_string(),
                credential.join_target.clone(),
                "--token".to_string(),
                credential.token.clone(),
                "--discovery-token-ca-cert-hash".to_string(),
                credential.discovery_hash_arg(),
            ],
        )
    }

    /// Join the cluster described by `credential`.
    pub async fn join(&self, credential: &JoinCredential) -> Result<JoinOutcome> {
        if self.config.kubelet_kubeconfig.exists() {
            tracing::info!(
                "[JoinExecutor] {:?} exists, node already joined; skipping join",
                self.config.kubelet_kubeconfig
            );
            return Ok(JoinOutcome::AlreadyMember);
        }

        let max_attempts = self.config.max_attempts.max(1);
        let (program, args) = self.join_command(credential);
        let mut attempt = 1;

        loop {
            tracing::info!(
                "[JoinExecutor] Joining cluster at {} (attempt {}/{})",
                credential.join_target,
                attempt,
                max_attempts
            );

            let output = self
                .runner
                .run(&program, &args)
                .await
                .map_err(|source| BootstrapError::Command {
                    program: program.clone(),
                    source,
                })?;

            if output.success() {
                tracing::info!("[JoinExecutor] Joined cluster at {}", credential.join_target);
                return Ok(JoinOutcome::Joined);
            }

            if is_already_member(&output) {
                tracing::info!(
                    "[JoinExecutor] Join reported an existing kubelet config; node is already a member"
                );
                return Ok(JoinOutcome::AlreadyMember);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    "[JoinExecutor] Join failed with exit code {}: {}",
                    output.exit_code,
                    output.last_line()
                );
                return Err(BootstrapError::Join {
                    exit_code: output.exit_code,
                    message: output.last_line().to_string(),
                });
            }

            tracing::warn!(
                "[JoinExecutor] Join attempt {}/{} failed (exit {}): {}. Retrying in {}s",
                attempt,
                max_attempts,
                output.exit_code,
                output.last_line(),
                self.config.retry_delay_secs
            );
            tokio::time::sleep(self.config.retry_delay()).await;
            attempt += 1;
        }
    }
}
