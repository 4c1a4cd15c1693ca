//! Join credential rendezvous through the secret store.
//!
//! The control node mints a join command and publishes it under a key derived
//! from the cluster identity. Every other node polls that key until the value
//! shows up. The store is the only thing the two sides share.

use crate::config::CommandConfig;
use crate::error::{BootstrapError, Result};
use crate::exec::{with_prefix, CommandRunner};
use crate::poll::{poll_until, PollError};
use crate::store::SecretStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const HASH_SCHEME: &str = "sha256:";

/// Everything a node needs to join the control plane.
///
/// Held in memory only. `Debug` redacts the token and CA hash so the value can
/// appear in logs safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCredential {
    /// API server `host:port`.
    #[serde(rename = "master_addr_port")]
    pub join_target: String,
    pub token: String,
    /// Hex digest of the cluster CA public key, without the `sha256:` scheme.
    #[serde(rename = "discovery_token_ca_cert_hash")]
    pub ca_cert_hash: String,
}

impl fmt::Debug for JoinCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinCredential")
            .field("join_target", &self.join_target)
            .field("token", &"<redacted>")
            .field("ca_cert_hash", &"<redacted>")
            .finish()
    }
}

impl JoinCredential {
    pub fn new(
        join_target: impl Into<String>,
        token: impl Into<String>,
        ca_cert_hash: impl Into<String>,
    ) -> Self {
        let ca_cert_hash = ca_cert_hash.into();
        let ca_cert_hash = match ca_cert_hash.strip_prefix(HASH_SCHEME) {
            Some(bare) => bare.to_string(),
            None => ca_cert_hash,
        };
        Self {
            join_target: join_target.into(),
            token: token.into(),
            ca_cert_hash,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: JoinCredential = serde_json::from_str(raw).map_err(|e| {
            // serde_json errors carry positions, never the input itself.
            BootstrapError::Parse(format!("Published join credential is malformed: {}", e))
        })?;
        let credential = Self::new(parsed.join_target, parsed.token, parsed.ca_cert_hash);
        if credential.join_target.is_empty()
            || credential.token.is_empty()
            || credential.ca_cert_hash.is_empty()
        {
            return Err(BootstrapError::Parse(
                "Published join credential has empty fields".to_string(),
            ));
        }
        Ok(credential)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| BootstrapError::Parse(format!("Cannot encode join credential: {}", e)))
    }

    /// Value for `--discovery-token-ca-cert-hash`.
    pub fn discovery_hash_arg(&self) -> String {
        format!("{}{}", HASH_SCHEME, self.ca_cert_hash)
    }

    /// Parse the line printed by `kubeadm token create --print-join-command`:
    /// `kubeadm join <host:port> --token <t> --discovery-token-ca-cert-hash sha256:<h>`.
    pub fn from_join_command(output: &str) -> Result<Self> {
        let line = output
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with("kubeadm join"))
            .ok_or_else(|| {
                BootstrapError::Parse("No 'kubeadm join' line in join command output".to_string())
            })?;

        let mut target = None;
        let mut token = None;
        let mut hash = None;
        let mut words = line.split_whitespace().skip(2);
        while let Some(word) = words.next() {
            match word {
                "--token" => token = words.next(),
                "--discovery-token-ca-cert-hash" => hash = words.next(),
                flag if flag.starts_with("--") => {}
                positional if target.is_none() => target = Some(positional),
                _ => {}
            }
        }

        match (target, token, hash) {
            (Some(target), Some(token), Some(hash)) => Ok(Self::new(target, token, hash)),
            _ => Err(BootstrapError::Parse(
                "Join command is missing the target, token or CA hash".to_string(),
            )),
        }
    }
}

/// Wait until the credential under `key` is published.
///
/// "Not found" is retried every `interval` until `timeout` has elapsed; any
/// other store failure aborts at once.
pub async fn await_credential(
    store: &dyn SecretStore,
    key: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<JoinCredential> {
    tracing::info!(
        "[Rendezvous] Waiting up to {}s for join credential {}",
        timeout.as_secs(),
        key
    );

    let fetched = poll_until(interval, timeout, || async move {
        tracing::info!("[Rendezvous] Fetching join credential from {}", key);
        match store.get(key).await {
            Ok(Some(raw)) => JoinCredential::from_json(&raw).map(Some),
            Err(e) => Err(BootstrapError::from(e)),
            Ok(None) => {
                tracing::info!(
                    "[Rendezvous] Join information is not ready in the secret store. Retrying in {}s...",
                    interval.as_secs()
                );
                Ok(None)
            }
        }
    })
    .await;

    match fetched {
        Ok(credential) => {
            tracing::info!(
                "[Rendezvous] Received join credential for {}",
                credential.join_target
            );
            Ok(credential)
        }
        Err(PollError::Timeout { waited, attempts }) => {
            tracing::error!(
                "[Rendezvous] Join credential {} not published after {} attempt(s)",
                key,
                attempts
            );
            Err(BootstrapError::Timeout {
                what: format!("join credential '{}' was never published", key),
                waited,
            })
        }
        Err(PollError::Aborted(e)) => Err(e),
    }
}

/// Mint a fresh join command on the control node.
pub async fn mint_credential(
    runner: &dyn CommandRunner,
    commands: &CommandConfig,
) -> Result<JoinCredential> {
    let (program, args) = with_prefix(
        &commands.privilege_prefix(),
        &commands.kubeadm,
        vec![
            "token".to_string(),
            "create".to_string(),
            "--print-join-command".to_string(),
        ],
    );

    let output = runner
        .run(&program, &args)
        .await
        .map_err(|source| BootstrapError::Command {
            program: program.clone(),
            source,
        })?;

    if !output.success() {
        return Err(BootstrapError::Join {
            exit_code: output.exit_code,
            message: format!("creating a join token failed: {}", output.last_line()),
        });
    }

    JoinCredential::from_join_command(&output.stdout)
}

/// Publish `credential` under `key`. Re-publishing replaces the value.
pub async fn publish_credential(
    store: &dyn SecretStore,
    key: &str,
    credential: &JoinCredential,
) -> Result<()> {
    store.put(key, &credential.to_json()?).await?;
    tracing::info!(
        "[Rendezvous] Published join credential for {} as {}",
        credential.join_target,
        key
    );
    Ok(())
}
