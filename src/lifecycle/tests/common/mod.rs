//! Fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use lifecycle::config::BootstrapConfig;
use lifecycle::{CommandOutput, CommandRunner, SecretStore, StoreError, TopologyDescriptor};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub const SAMPLE_TOPOLOGY: &str = r#"{
    "ClusterConfig": {
        "ClusterArn": "arn:aws:sagemaker:us-west-2:842413447717:cluster/kb8v11zrrpvr",
        "ClusterName": "K8-1"
    },
    "InstanceGroups": [
        {
            "InstanceType": "ml.t3.xlarge",
            "Instances": [
                {
                    "AgentIpAddress": "172.16.102.203",
                    "CustomerIpAddress": "10.1.113.28",
                    "InstanceId": "i-07259dd159a1c7130",
                    "InstanceName": "ControllerGroup-1"
                }
            ],
            "Name": "ControllerGroup"
        },
        {
            "InstanceType": "ml.g5.8xlarge",
            "Instances": [
                {
                    "AgentIpAddress": "172.16.100.157",
                    "CustomerIpAddress": "10.1.38.128",
                    "InstanceId": "i-0cbbe3075137ffa1d",
                    "InstanceName": "WorkerGroup-1"
                },
                {
                    "AgentIpAddress": "172.16.98.182",
                    "CustomerIpAddress": "10.1.29.16",
                    "InstanceId": "i-0cc2532921ec06344",
                    "InstanceName": "WorkerGroup-2"
                }
            ],
            "Name": "WorkerGroup"
        }
    ]
}"#;

pub const SECRET_KEY: &str = "hyperpod-k8s--K8-1";

pub fn sample_topology() -> TopologyDescriptor {
    TopologyDescriptor::from_json(SAMPLE_TOPOLOGY).unwrap()
}

pub fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed(exit_code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Config that never shells out through sudo and points every node-local
/// path into `dir`, where nothing exists unless the test creates it.
pub fn test_config(dir: &Path) -> BootstrapConfig {
    let mut config = BootstrapConfig::default();
    config.commands.privilege_prefix = Some(Vec::new());
    config.join.kubelet_kubeconfig = dir.join("kubelet.conf");
    config.readiness.artifact_path = Some(dir.join("slurm.conf"));
    config
}

type Responder = Box<dyn Fn(&str, &[String], usize) -> std::io::Result<CommandOutput> + Send + Sync>;

/// Records every invocation and answers from a closure that also sees how many
/// times the same program has been called before.
pub struct ScriptedRunner {
    responder: Responder,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &[String], usize) -> std::io::Result<CommandOutput> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every command succeeds with empty output.
    pub fn always_ok() -> Self {
        Self::new(|_, _, _| Ok(ok("")))
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|(p, _)| p == program)
            .map(|(_, a)| a)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let previous = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|(p, _)| p == program).count();
            calls.push((program.to_string(), args.to_vec()));
            previous
        };
        (self.responder)(program, args, previous)
    }
}

/// In-memory secret store with optional delayed publication and failure.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    pending: Mutex<Option<(String, String, u32)>>,
    failure: Option<StoreError>,
    reads: AtomicU32,
    writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        store
    }

    /// `key` stays missing for the first `misses` reads, then holds `value`.
    pub fn published_after(key: &str, value: &str, misses: u32) -> Self {
        let store = Self::new();
        *store.pending.lock().unwrap() = Some((key.to_string(), value.to_string(), misses));
        store
    }

    pub fn failing(error: StoreError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let mut pending = self.pending.lock().unwrap();
        let due = matches!(pending.as_ref(), Some((_, _, misses)) if reads > *misses);
        if due {
            if let Some((pending_key, value, _)) = pending.take() {
                self.values.lock().unwrap().insert(pending_key, value);
            }
        }

        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
