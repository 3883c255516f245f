//! Cluster lookups.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::error::DeployError;

/// Read-only queries against the cluster Eclipse Che is deployed to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Public hostname of the first rule of an ingress.
    ///
    /// # Errors
    ///
    /// Returns an error if the ingress cannot be read or has no host rule.
    async fn ingress_host(&self, namespace: &str, name: &str) -> Result<String>;
}

/// [`ClusterQuery`] over the Kubernetes API.
///
/// The client is created on first use from the default kubeconfig, so
/// constructing this never touches the cluster.
#[derive(Default)]
pub struct KubeIngressQuery {
    client: OnceCell<Client>,
}

impl KubeIngressQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client: OnceCell::new_with(Some(client)),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                Client::try_default()
                    .await
                    .context("Failed to create Kubernetes client")
            })
            .await
    }
}

#[async_trait]
impl ClusterQuery for KubeIngressQuery {
    #[instrument(skip(self))]
    async fn ingress_host(&self, namespace: &str, name: &str) -> Result<String> {
        let ingresses: Api<Ingress> = Api::namespaced(self.client().await?.clone(), namespace);
        let ingress = ingresses
            .get(name)
            .await
            .with_context(|| format!("Failed to get ingress {namespace}/{name}"))?;

        let host = ingress
            .spec
            .and_then(|spec| spec.rules)
            .and_then(|rules| rules.into_iter().next())
            .and_then(|rule| rule.host)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| DeployError::MissingIngressHost {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        debug!(%host, "Resolved ingress host");
        Ok(host)
    }
}
