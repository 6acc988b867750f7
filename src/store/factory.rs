//! Primary/fallback backend selection (§4.3's startup policy): try the
//! primary store; fall back only on a transient failure. Configuration
//! errors are fatal and never trigger a fallback, so a misconfigured
//! primary doesn't silently degrade to an empty local store.

use std::sync::Arc;

use tracing::{info, warn};

use super::qdrant::QdrantVectorStore;
use super::sqlite::SqliteVectorStore;
use super::{HealthStatus, VectorStoreBackend};
use crate::config::VectorStoreConfig;
use crate::error::{ErrorKind, Result, RetrievalError};

pub struct StoreFactory;

/// Which backend actually ended up serving requests, and why.
pub struct SelectedStore {
    pub backend: Arc<dyn VectorStoreBackend>,
    pub used_fallback: bool,
    pub reason: Option<String>,
}

impl StoreFactory {
    pub async fn build(config: &VectorStoreConfig) -> Result<SelectedStore> {
        let endpoint = config
            .primary
            .endpoint
            .as_deref()
            .unwrap_or("http://localhost:6334");
        match QdrantVectorStore::new(endpoint, config.primary.api_key.as_deref()) {
            Ok(store) => {
                let health = store.health().await;
                if matches!(health.state, super::HealthState::Healthy) {
                    info!(target: "specsmith::store", backend = "qdrant", "primary vector store selected");
                    return Ok(SelectedStore {
                        backend: Arc::new(store),
                        used_fallback: false,
                        reason: None,
                    });
                }
                if health.error_code == Some(ErrorKind::Auth.as_code()) {
                    // Bad credentials are not a transient failure - fail
                    // fast rather than silently degrading to an empty
                    // local store (S5).
                    return Err(RetrievalError::auth(health.detail.unwrap_or_else(|| "primary vector store rejected credentials".into())));
                }
                warn!(
                    target: "specsmith::store",
                    detail = ?health.detail,
                    "primary vector store unhealthy at startup, falling back"
                );
                Self::fallback(config, health).await
            }
            Err(err) if matches!(err.kind, ErrorKind::Config | ErrorKind::Auth) => {
                // A bad URL, malformed client configuration, or rejected
                // credentials are not transient - surface them (S5).
                Err(err)
            }
            Err(err) => {
                warn!(target: "specsmith::store", error = %err, "primary vector store construction failed, falling back");
                Self::fallback(
                    config,
                    HealthStatus {
                        backend: "qdrant",
                        state: super::HealthState::Unavailable,
                        latency_ms: None,
                        detail: Some(err.to_string()),
                        error_code: None,
                    },
                )
                .await
            }
        }
    }

    async fn fallback(config: &VectorStoreConfig, primary_health: HealthStatus) -> Result<SelectedStore> {
        let store = SqliteVectorStore::open(&config.fallback.path)
            .await
            .map_err(|err| RetrievalError::connection("fallback vector store also unavailable").with_source(err))?;
        Ok(SelectedStore {
            backend: Arc::new(store),
            used_fallback: true,
            reason: primary_health.detail,
        })
    }
}
