/// Bootstrap configuration
/// Loaded from lifecycle.toml; every section and field is optional.
use crate::error::{BootstrapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "LIFECYCLE_CONFIG";
pub const RESOURCE_CONFIG_ENV: &str = "SAGEMAKER_RESOURCE_CONFIG_PATH";
pub const DEFAULT_RESOURCE_CONFIG: &str = "/opt/ml/config/resource_config.json";
pub const ARTIFACT_ENV: &str = "SLURM_CONF";
pub const DEFAULT_ARTIFACT: &str = "/opt/slurm/etc/slurm.conf";
pub const DEFAULT_KUBECTL: &str = "kubectl";

/// Resource config location: explicit path, then `SAGEMAKER_RESOURCE_CONFIG_PATH`,
/// then the platform default.
pub fn resource_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(RESOURCE_CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RESOURCE_CONFIG))
}

/// Bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub rendezvous: RendezvousConfig,

    #[serde(default)]
    pub join: JoinConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub labels: LabelConfig,

    #[serde(default)]
    pub commands: CommandConfig,
}

impl BootstrapConfig {
    /// Load configuration from `explicit`, `$LIFECYCLE_CONFIG` or `./lifecycle.toml`.
    ///
    /// An explicit path must exist. Without one, a missing file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let config_paths = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .into_iter()
            .chain(std::iter::once(PathBuf::from("lifecycle.toml")));

        for path in config_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        tracing::warn!("No lifecycle.toml found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::Parse(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml(&content).map_err(|e| {
            BootstrapError::Parse(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        tracing::info!("Loaded bootstrap config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Join credential rendezvous
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousConfig {
    #[serde(default = "default_rendezvous_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_rendezvous_timeout")]
    pub timeout_secs: u64,

    /// Secret name is `<prefix>-<cluster name>`.
    #[serde(default = "default_secret_prefix")]
    pub secret_prefix: String,
}

fn default_rendezvous_interval() -> u64 {
    10
}

fn default_rendezvous_timeout() -> u64 {
    5 * 60
}

fn default_secret_prefix() -> String {
    "hyperpod-k8s-".to_string()
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_rendezvous_interval(),
            timeout_secs: default_rendezvous_timeout(),
            secret_prefix: default_secret_prefix(),
        }
    }
}

impl RendezvousConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Join handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_join_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_join_retry_delay")]
    pub retry_delay_secs: u64,

    /// Written by a successful join; its presence means the node is a member.
    #[serde(default = "default_kubelet_kubeconfig")]
    pub kubelet_kubeconfig: PathBuf,
}

fn default_join_attempts() -> u32 {
    1
}

fn default_join_retry_delay() -> u64 {
    10
}

fn default_kubelet_kubeconfig() -> PathBuf {
    PathBuf::from("/etc/kubernetes/kubelet.conf")
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_join_attempts(),
            retry_delay_secs: default_join_retry_delay(),
            kubelet_kubeconfig: default_kubelet_kubeconfig(),
        }
    }
}

impl JoinConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Readiness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Workload-manager config artifact; `$SLURM_CONF` or the default when unset.
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,

    #[serde(default = "default_artifact_interval")]
    pub artifact_interval_secs: u64,

    #[serde(default = "default_artifact_timeout")]
    pub artifact_timeout_secs: u64,

    /// Command whose non-empty output means this node's membership is visible.
    /// Unset: chosen from the workload manager. Empty: skip the check.
    #[serde(default)]
    pub query_command: Option<Vec<String>>,

    #[serde(default = "default_query_interval")]
    pub query_interval_secs: u64,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_artifact_interval() -> u64 {
    5
}

fn default_artifact_timeout() -> u64 {
    60
}

fn default_query_command(workload_manager: Option<&str>) -> Vec<String> {
    let words = match workload_manager {
        Some(wm) if wm.eq_ignore_ascii_case("slurm") => &["scontrol", "show", "nodes"][..],
        _ => &[DEFAULT_KUBECTL, "get", "nodes", "--no-headers"][..],
    };
    words.iter().map(|w| w.to_string()).collect()
}

fn default_query_interval() -> u64 {
    5
}

fn default_query_timeout() -> u64 {
    120
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            artifact_path: None,
            artifact_interval_secs: default_artifact_interval(),
            artifact_timeout_secs: default_artifact_timeout(),
            query_command: None,
            query_interval_secs: default_query_interval(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl ReadinessConfig {
    pub fn artifact_path(&self) -> PathBuf {
        self.artifact_path
            .clone()
            .or_else(|| std::env::var_os(ARTIFACT_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT))
    }

    pub fn artifact_interval(&self) -> Duration {
        Duration::from_secs(self.artifact_interval_secs)
    }

    pub fn artifact_timeout(&self) -> Duration {
        Duration::from_secs(self.artifact_timeout_secs)
    }

    /// Membership query for a cluster running `workload_manager`.
    pub fn query_command(&self, workload_manager: Option<&str>) -> Vec<String> {
        match &self.query_command {
            Some(command) => command.clone(),
            None => default_query_command(workload_manager),
        }
    }

    pub fn query_interval(&self) -> Duration {
        Duration::from_secs(self.query_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Node labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_launch_type")]
    pub launch_type: String,
}

fn default_launch_type() -> String {
    "HyperPod".to_string()
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            launch_type: default_launch_type(),
        }
    }
}

/// External tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Prefix for node-modifying commands. Unset: `sudo -E` unless running as root.
    #[serde(default)]
    pub privilege_prefix: Option<Vec<String>>,

    #[serde(default = "default_kubeadm")]
    pub kubeadm: String,

    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    /// Passed to kubectl as `--kubeconfig` when set.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

fn default_kubeadm() -> String {
    "kubeadm".to_string()
}

fn default_kubectl() -> String {
    DEFAULT_KUBECTL.to_string()
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            privilege_prefix: None,
            kubeadm: default_kubeadm(),
            kubectl: default_kubectl(),
            kubeconfig: None,
        }
    }
}

impl CommandConfig {
    pub fn privilege_prefix(&self) -> Vec<String> {
        self.privilege_prefix
            .clone()
            .unwrap_or_else(crate::exec::default_privilege_prefix)
    }

    /// `kubectl` arguments that precede the subcommand.
    pub fn kubectl_global_args(&self) -> Vec<String> {
        match &self.kubeconfig {
            Some(path) => vec![
                "--kubeconfig".to_string(),
                path.to_string_lossy().into_owned(),
            ],
            None => Vec::new(),
        }
    }
}
