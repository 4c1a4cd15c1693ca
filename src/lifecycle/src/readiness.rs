//! Readiness checks after the join.
//!
//! Propagation through the cluster is eventually consistent, so both checks
//! are bounded polls that report [`Readiness`] rather than failing. Callers
//! log `NotReady` and carry on.

use crate::config::{CommandConfig, ReadinessConfig, DEFAULT_KUBECTL};
use crate::exec::CommandRunner;
use crate::poll::{poll_until, PollError};
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// True when `address` appears in `data` as a whole address, not as the
/// prefix of a longer one (`10.0.0.1` must not match `10.0.0.12`).
pub fn mentions_address(data: &str, address: Ipv4Addr) -> bool {
    let needle = address.to_string();
    let is_addr_char = |c: char| c.is_ascii_digit() || c == '.';
    data.match_indices(&needle).any(|(start, _)| {
        let before = data[..start].chars().next_back();
        let after = data[start + needle.len()..].chars().next();
        !before.is_some_and(is_addr_char) && !after.is_some_and(is_addr_char)
    })
}

pub struct ReadinessWaiter<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a ReadinessConfig,
    commands: &'a CommandConfig,
    workload_manager: Option<&'a str>,
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a ReadinessConfig,
        commands: &'a CommandConfig,
    ) -> Self {
        Self {
            runner,
            config,
            commands,
            workload_manager: None,
        }
    }

    /// Pick the default membership query for this workload manager.
    pub fn with_workload_manager(mut self, workload_manager: Option<&'a str>) -> Self {
        self.workload_manager = workload_manager;
        self
    }

    /// Membership query as it will be run. A kubectl query goes through the
    /// configured kubectl binary and its global arguments, like labeling does.
    pub fn membership_query(&self) -> Vec<String> {
        let query = self.config.query_command(self.workload_manager);
        match query.split_first() {
            Some((program, rest))
                if program == DEFAULT_KUBECTL || *program == self.commands.kubectl =>
            {
                let mut resolved = vec![self.commands.kubectl.clone()];
                resolved.extend(self.commands.kubectl_global_args());
                resolved.extend(rest.iter().cloned());
                resolved
            }
            _ => query,
        }
    }

    /// Wait until the workload-manager config names one of `control_addresses`.
    ///
    /// No artifact at all means this role has nothing to wait for.
    pub async fn configuration_propagated(&self, control_addresses: &[Ipv4Addr]) -> Readiness {
        let path = self.config.artifact_path();
        let path: &Path = &path;

        let outcome = poll_until(
            self.config.artifact_interval(),
            self.config.artifact_timeout(),
            || async move {
                let data = match tokio::fs::read_to_string(path).await {
                    Ok(data) => data,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::info!(
                            "[ReadinessWaiter] {:?} is not present; nothing to wait for on this node",
                            path
                        );
                        return Ok::<_, Infallible>(Some(()));
                    }
                    Err(e) => {
                        tracing::warn!("[ReadinessWaiter] Cannot read {:?} yet: {}", path, e);
                        return Ok(None);
                    }
                };

                if control_addresses
                    .iter()
                    .any(|addr| mentions_address(&data, *addr))
                {
                    tracing::info!(
                        "[ReadinessWaiter] {:?} contains at least one controller address",
                        path
                    );
                    Ok(Some(()))
                } else {
                    tracing::info!(
                        "[ReadinessWaiter] {:?} has no controller address yet. Retrying...",
                        path
                    );
                    Ok(None)
                }
            },
        )
        .await;

        match outcome {
            Ok(()) => Readiness::Ready,
            Err(PollError::Timeout { waited, .. }) => {
                tracing::warn!(
                    "[ReadinessWaiter] No controller address in {:?} after {}s",
                    path,
                    waited.as_secs()
                );
                Readiness::NotReady
            }
            Err(PollError::Aborted(never)) => match never {},
        }
    }

    /// Wait until the membership query prints something.
    pub async fn membership_visible(&self) -> Readiness {
        let query = self.membership_query();
        let Some((program, args)) = query.split_first() else {
            tracing::warn!("[ReadinessWaiter] No membership query command configured; skipping");
            return Readiness::Ready;
        };
        let runner = self.runner;

        let outcome = poll_until(
            self.config.query_interval(),
            self.config.query_timeout(),
            || async move {
                match runner.run(program, args).await {
                    Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                        tracing::info!(
                            "[ReadinessWaiter] Nodes registered with the control plane:\n{}",
                            output.stdout.trim_end()
                        );
                        Ok::<_, Infallible>(Some(()))
                    }
                    Ok(output) if !output.success() => {
                        tracing::info!(
                            "[ReadinessWaiter] {} exited with {}. Retrying...",
                            program,
                            output.exit_code
                        );
                        Ok(None)
                    }
                    Ok(_) => {
                        tracing::info!("[ReadinessWaiter] Waiting for output from {}. Retrying...", program);
                        Ok(None)
                    }
                    Err(e) => {
                        tracing::info!("[ReadinessWaiter] Could not run {}: {}. Retrying...", program, e);
                        Ok(None)
                    }
                }
            },
        )
        .await;

        match outcome {
            Ok(()) => Readiness::Ready,
            Err(PollError::Timeout { waited, .. }) => {
                tracing::warn!(
                    "[ReadinessWaiter] Exceeded maximum wait time of {}s. No output from {}",
                    waited.as_secs(),
                    program
                );
                Readiness::NotReady
            }
            Err(PollError::Aborted(never)) => match never {},
        }
    }
}
