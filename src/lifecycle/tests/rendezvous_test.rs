//! Tests for the join credential rendezvous.
//!
//! Timing tests run on a paused clock: sleeps advance virtual time instantly,
//! so elapsed durations are exact.

mod common;

use common::{args, failed, ok, sample_topology, test_config, MemoryStore, ScriptedRunner, SECRET_KEY};
use lifecycle::{
    await_credential, mint_credential, publish_credential, secret_key, BootstrapError,
    JoinCredential, StoreError,
};
use std::time::Duration;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_secs(10);
const TIMEOUT: Duration = Duration::from_secs(300);

const PUBLISHED: &str = r#"{
    "master_addr_port": "10.1.113.28:6443",
    "token": "abcdef.0123456789abcdef",
    "discovery_token_ca_cert_hash": "8cb2de97839780a412b93877f8507ad6c94f73add17d5d7058e91741c9d5ec78"
}"#;

fn expected_credential() -> JoinCredential {
    JoinCredential::new(
        "10.1.113.28:6443",
        "abcdef.0123456789abcdef",
        "8cb2de97839780a412b93877f8507ad6c94f73add17d5d7058e91741c9d5ec78",
    )
}

#[test]
fn test_secret_key_is_derived_from_cluster_name() {
    let topology = sample_topology();
    assert_eq!(secret_key("hyperpod-k8s-", topology.identity()), SECRET_KEY);
    assert_eq!(
        secret_key("hyperpod-k8s-", topology.identity()),
        secret_key("hyperpod-k8s-", sample_topology().identity())
    );
}

#[tokio::test(start_paused = true)]
async fn test_credential_already_published() {
    let store = MemoryStore::with_value(SECRET_KEY, PUBLISHED);
    let start = Instant::now();

    let credential = await_credential(&store, SECRET_KEY, INTERVAL, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(credential, expected_credential());
    assert_eq!(store.reads(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_credential_published_after_three_misses() {
    let store = MemoryStore::published_after(SECRET_KEY, PUBLISHED, 3);
    let start = Instant::now();

    let credential = await_credential(&store, SECRET_KEY, INTERVAL, TIMEOUT)
        .await
        .unwrap();

    let elapsed = start.elapsed();
    assert_eq!(credential, expected_credential());
    assert_eq!(store.reads(), 4);
    assert!(
        elapsed >= Duration::from_secs(30) && elapsed <= Duration::from_secs(40),
        "elapsed {:?}",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_credential_never_published_times_out() {
    let store = MemoryStore::new();
    let start = Instant::now();

    let err = await_credential(&store, SECRET_KEY, INTERVAL, TIMEOUT)
        .await
        .unwrap_err();

    let elapsed = start.elapsed();
    match err {
        BootstrapError::Timeout { waited, .. } => assert!(waited >= TIMEOUT),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed >= TIMEOUT && elapsed <= TIMEOUT + INTERVAL);
    // One read at t=0, then one per interval up to the deadline.
    assert!((30..=31).contains(&store.reads()), "reads {}", store.reads());
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_aborts_immediately() {
    let store = MemoryStore::failing(StoreError::Read {
        key: SECRET_KEY.to_string(),
        message: "AccessDeniedException".to_string(),
    });
    let start = Instant::now();

    let err = await_credential(&store, SECRET_KEY, INTERVAL, TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::Store(StoreError::Read { .. })));
    assert_eq!(store.reads(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_credential_is_fatal() {
    let store = MemoryStore::with_value(SECRET_KEY, r#"{"token": "abcdef.0123456789abcdef"}"#);

    let err = await_credential(&store, SECRET_KEY, INTERVAL, TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::Parse(_)));
    assert!(!err.to_string().contains("0123456789abcdef"));
    assert_eq!(store.reads(), 1);
}

#[test]
fn test_credential_debug_redacts_secrets() {
    let credential = expected_credential();
    let debug = format!("{:?}", credential);

    assert!(debug.contains("10.1.113.28:6443"));
    assert!(!debug.contains("abcdef.0123456789abcdef"));
    assert!(!debug.contains("8cb2de97"));
}

#[test]
fn test_credential_hash_scheme_is_normalized() {
    let credential = JoinCredential::new("10.1.113.28:6443", "t.t", "sha256:abc123");
    assert_eq!(credential.ca_cert_hash, "abc123");
    assert_eq!(credential.discovery_hash_arg(), "sha256:abc123");

    let json = credential.to_json().unwrap();
    assert!(json.contains(r#""discovery_token_ca_cert_hash":"abc123""#));
    assert!(json.contains(r#""master_addr_port":"10.1.113.28:6443""#));
}

#[test]
fn test_parse_print_join_command_output() {
    let output = "kubeadm join 10.1.113.28:6443 --token abcdef.0123456789abcdef \
                  --discovery-token-ca-cert-hash sha256:8cb2de97839780a412b93877f8507ad6c94f73add17d5d7058e91741c9d5ec78 \n";
    let credential = JoinCredential::from_join_command(output).unwrap();
    assert_eq!(credential, expected_credential());

    assert!(matches!(
        JoinCredential::from_join_command("kubeadm join 10.1.113.28:6443 --token abc"),
        Err(BootstrapError::Parse(_))
    ));
    assert!(matches!(
        JoinCredential::from_join_command(""),
        Err(BootstrapError::Parse(_))
    ));
}

#[tokio::test]
async fn test_mint_credential_runs_kubeadm() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let runner = ScriptedRunner::new(|_, _, _| {
        Ok(ok(
            "kubeadm join 10.1.113.28:6443 --token abcdef.0123456789abcdef --discovery-token-ca-cert-hash sha256:8cb2de97839780a412b93877f8507ad6c94f73add17d5d7058e91741c9d5ec78\n",
        ))
    });

    let credential = mint_credential(&runner, &config.commands).await.unwrap();

    assert_eq!(credential, expected_credential());
    assert_eq!(
        runner.calls(),
        vec![(
            "kubeadm".to_string(),
            args(&["token", "create", "--print-join-command"])
        )]
    );
}

#[tokio::test]
async fn test_mint_credential_uses_privilege_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.commands.privilege_prefix = Some(args(&["sudo", "-E"]));
    let runner = ScriptedRunner::new(|_, _, _| Ok(failed(1, "error: no kubeconfig")));

    let err = mint_credential(&runner, &config.commands).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Join { exit_code: 1, .. }));
    assert_eq!(
        runner.calls(),
        vec![(
            "sudo".to_string(),
            args(&["-E", "kubeadm", "token", "create", "--print-join-command"])
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_published_credential_is_what_joiners_receive() {
    let store = MemoryStore::new();
    publish_credential(&store, SECRET_KEY, &expected_credential())
        .await
        .unwrap();
    // Re-publishing the same value is harmless.
    publish_credential(&store, SECRET_KEY, &expected_credential())
        .await
        .unwrap();

    assert_eq!(store.writes(), 2);
    let received = await_credential(&store, SECRET_KEY, INTERVAL, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(received, expected_credential());
}
