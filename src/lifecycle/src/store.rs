//! Secret store capability used as the rendezvous point between nodes.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::config::Region;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client;

use crate::topology::ClusterIdentity;

/// Store failures other than "key not found".
///
/// Absence is not an error: [`SecretStore::get`] returns `Ok(None)` for it.
/// Everything here (unreachable, unauthorized, throttled) must abort the
/// caller instead of being mistaken for "not published yet".
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("reading '{key}' failed: {message}")]
    Read { key: String, message: String },

    #[error("writing '{key}' failed: {message}")]
    Write { key: String, message: String },
}

/// Key/value secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Current value of `key`, or `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Create `key` or replace its value.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Name of the secret holding the join credential for `identity`.
pub fn secret_key(prefix: &str, identity: &ClusterIdentity) -> String {
    format!("{}-{}", prefix, identity.name)
}

/// AWS Secrets Manager in the cluster's region.
pub struct SecretsManagerStore {
    client: Client,
}

impl SecretsManagerStore {
    pub async fn for_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        tracing::debug!("[SecretStore] Using Secrets Manager in {}", region);
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.client.get_secret_value().secret_id(key).send().await {
            Ok(output) => match output.secret_string() {
                Some(value) => Ok(Some(value.to_string())),
                None => Err(StoreError::Read {
                    key: key.to_string(),
                    message: "secret has no string value".to_string(),
                }),
            },
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(StoreError::Read {
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let write_error = |message: String| StoreError::Write {
            key: key.to_string(),
            message,
        };

        match self
            .client
            .put_secret_value()
            .secret_id(key)
            .secret_string(value)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                tracing::info!("[SecretStore] Secret {} does not exist yet, creating it", key);
                self.client
                    .create_secret()
                    .name(key)
                    .secret_string(value)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| write_error(DisplayErrorContext(&e).to_string()))
            }
            Err(err) => Err(write_error(DisplayErrorContext(&err).to_string())),
        }
    }
}
