//! Minimal in-cluster Kubernetes API client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use pvwatch_core::{Event, ObjectList, Pod};
use pvwatch_reconciler::PodDeleter;
use reqwest::{Certificate, Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors talking to the API server.
#[derive(Debug, Error)]
pub enum KubeError {
    #[error("not running in a cluster: {0} is not set")]
    NotInCluster(&'static str),

    #[error("failed to read {path}: {source}")]
    Credentials {
        path: String,
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
}

/// What the relister needs from the cluster.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn list_pods(&self) -> Result<Vec<Pod>, KubeError>;
    async fn list_events(&self) -> Result<Vec<Event>, KubeError>;
}

/// API client authenticated with the pod's service account.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: Client,
    base_url: String,
    token: String,
}

impl KubeClient {
    /// Build a client from the in-cluster environment and service account.
    ///
    /// # Errors
    ///
    /// Returns error outside a cluster or if the credentials are unreadable.
    pub fn in_cluster() -> Result<Self, KubeError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| KubeError::NotInCluster("KUBERNETES_SERVICE_HOST"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| KubeError::NotInCluster("KUBERNETES_SERVICE_PORT"))?;
        let dir = Path::new(SERVICE_ACCOUNT_DIR);

        let token = read_credential(&dir.join("token"))?;
        let ca = read_credential(&dir.join("ca.crt"))?;
        let http = Client::builder()
            .add_root_certificate(Certificate::from_pem(ca.as_bytes())?)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self::new(http, format!("https://{host}:{port}"), token.trim()))
    }

    pub fn new(http: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, KubeError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(KubeError::Status {
                method: "GET",
                path: path.to_string(),
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        let list: ObjectList<T> =
            serde_json::from_slice(&body).map_err(|source| KubeError::Decode {
                path: path.to_string(),
                source,
            })?;
        Ok(list.items)
    }

    /// Delete a pod. A pod that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or any other non-success status.
    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), KubeError> {
        let path = format!("/api/v1/namespaces/{namespace}/pods/{name}");
        let response = self
            .http
            .delete(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(namespace, name, "Pod already gone");
            return Ok(());
        }
        if !status.is_success() {
            return Err(KubeError::Status {
                method: "DELETE",
                path,
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterSource for KubeClient {
    async fn list_pods(&self) -> Result<Vec<Pod>, KubeError> {
        self.list("/api/v1/pods").await
    }

    async fn list_events(&self) -> Result<Vec<Event>, KubeError> {
        self.list("/apis/events.k8s.io/v1/events").await
    }
}

#[async_trait]
impl PodDeleter for KubeClient {
    async fn delete(&self, namespace: &str, name: &str) -> pvwatch_reconciler::Result<()> {
        self.delete_pod(namespace, name)
            .await
            .map_err(|e| pvwatch_reconciler::Error::sink(e.to_string()))
    }
}

fn read_credential(path: &Path) -> Result<String, KubeError> {
    std::fs::read_to_string(path).map_err(|source| KubeError::Credentials {
        path: path.display().to_string(),
        source,
    })
}
