//! Kubernetes API access
//!
//! Lists Services and Ingresses and writes Ingresses. Every write is a single
//! call with no retry; dry run is passed through to the API server.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use thiserror::Error;
use tracing::{debug, instrument};

/// Operations the reconciler needs from the cluster
///
/// This trait allows for mocking in tests while keeping the concrete
/// implementation for production use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngressStore: Send + Sync {
    /// List Services across all namespaces
    async fn list_services(
        &self,
        label_selector: &str,
        timeout_secs: u32,
    ) -> Result<Vec<Service>, StoreError>;

    /// List Ingresses across all namespaces
    async fn list_ingresses(
        &self,
        label_selector: &str,
        timeout_secs: u32,
    ) -> Result<Vec<Ingress>, StoreError>;

    /// Create an Ingress
    async fn create_ingress(&self, ingress: &Ingress, dry_run: bool)
        -> Result<Ingress, StoreError>;

    /// Replace an existing Ingress with the given object
    async fn replace_ingress(
        &self,
        ingress: &Ingress,
        dry_run: bool,
    ) -> Result<Ingress, StoreError>;

    /// Delete an Ingress by namespace and name
    async fn delete_ingress(
        &self,
        namespace: &str,
        name: &str,
        dry_run: bool,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error fetching services: {0}")]
    ListServices(#[source] kube::Error),
    #[error("error fetching ingresses: {0}")]
    ListIngresses(#[source] kube::Error),
    #[error("error creating ingress {namespace}/{name}: {source}")]
    Create {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("error updating ingress {namespace}/{name}: {source}")]
    Update {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("error deleting ingress {namespace}/{name}: {source}")]
    Delete {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

/// [`IngressStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn ingresses(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn list_params(label_selector: &str, timeout_secs: u32) -> ListParams {
    ListParams::default()
        .labels(label_selector)
        .timeout(timeout_secs)
}

fn post_params(dry_run: bool) -> PostParams {
    PostParams {
        dry_run,
        ..Default::default()
    }
}

fn object_ref(ingress: &Ingress) -> (String, String) {
    (
        ingress.metadata.namespace.clone().unwrap_or_default(),
        ingress.metadata.name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl IngressStore for KubeStore {
    #[instrument(skip(self))]
    async fn list_services(
        &self,
        label_selector: &str,
        timeout_secs: u32,
    ) -> Result<Vec<Service>, StoreError> {
        let api: Api<Service> = Api::all(self.client.clone());
        let list = api
            .list(&list_params(label_selector, timeout_secs))
            .await
            .map_err(StoreError::ListServices)?;

        debug!(count = list.items.len(), "Listed services");
        Ok(list.items)
    }

    #[instrument(skip(self))]
    async fn list_ingresses(
        &self,
        label_selector: &str,
        timeout_secs: u32,
    ) -> Result<Vec<Ingress>, StoreError> {
        let api: Api<Ingress> = Api::all(self.client.clone());
        let list = api
            .list(&list_params(label_selector, timeout_secs))
            .await
            .map_err(StoreError::ListIngresses)?;

        debug!(count = list.items.len(), "Listed ingresses");
        Ok(list.items)
    }

    #[instrument(skip(self, ingress), fields(
        namespace = ingress.metadata.namespace.as_deref().unwrap_or_default(),
        name = ingress.metadata.name.as_deref().unwrap_or_default(),
    ))]
    async fn create_ingress(
        &self,
        ingress: &Ingress,
        dry_run: bool,
    ) -> Result<Ingress, StoreError> {
        let (namespace, name) = object_ref(ingress);
        self.ingresses(&namespace)
            .create(&post_params(dry_run), ingress)
            .await
            .map_err(|source| StoreError::Create {
                namespace,
                name,
                source,
            })
    }

    #[instrument(skip(self, ingress), fields(
        namespace = ingress.metadata.namespace.as_deref().unwrap_or_default(),
        name = ingress.metadata.name.as_deref().unwrap_or_default(),
    ))]
    async fn replace_ingress(
        &self,
        ingress: &Ingress,
        dry_run: bool,
    ) -> Result<Ingress, StoreError> {
        let (namespace, name) = object_ref(ingress);
        self.ingresses(&namespace)
            .replace(&name, &post_params(dry_run), ingress)
            .await
            .map_err(|source| StoreError::Update {
                namespace,
                name,
                source,
            })
    }

    #[instrument(skip(self))]
    async fn delete_ingress(
        &self,
        namespace: &str,
        name: &str,
        dry_run: bool,
    ) -> Result<(), StoreError> {
        let params = DeleteParams {
            dry_run,
            ..Default::default()
        };
        self.ingresses(namespace)
            .delete(name, &params)
            .await
            .map_err(|source| StoreError::Delete {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?;

        Ok(())
    }
}

/// Implement trait for Arc-wrapped stores to support shared ownership
#[async_trait]
impl<T: IngressStore + ?Sized> IngressStore for Arc<T> {
    async fn list_services(
        &self,
        label_selector: &str,
        timeout_secs: u32,
    ) -> Result<Vec<Service>, StoreError> {
        (**self).list_services(label_selector, timeout_secs).await
    }

    async fn list_ingresses(
        &self,
        label_selector: &str,
        timeout_secs: u32,
    ) -> Result<Vec<Ingress>, StoreError> {
        (**self).list_ingresses(label_selector, timeout_secs).await
    }

    async fn create_ingress(
        &self,
        ingress: &Ingress,
        dry_run: bool,
    ) -> Result<Ingress, StoreError> {
        (**self).create_ingress(ingress, dry_run).await
    }

    async fn replace_ingress(
        &self,
        ingress: &Ingress,
        dry_run: bool,
    ) -> Result<Ingress, StoreError> {
        (**self).replace_ingress(ingress, dry_run).await
    }

    async fn delete_ingress(
        &self,
        namespace: &str,
        name: &str,
        dry_run: bool,
    ) -> Result<(), StoreError> {
        (**self).delete_ingress(namespace, name, dry_run).await
    }
}
