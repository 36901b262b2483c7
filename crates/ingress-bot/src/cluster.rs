//! Kubernetes client construction

use std::path::Path;

use kube::config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, Config};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("error loading kubernetes config: {0}")]
    Kubeconfig(#[from] KubeconfigError),
    #[error("error loading kubernetes config: {0}")]
    Infer(#[from] InferConfigError),
    #[error("error creating kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

/// Build the API client once at startup.
///
/// In-cluster service account credentials win; outside a cluster the
/// `kubeconfig_path` override is used when given, else kube's default lookup
/// (`KUBECONFIG`, then `~/.kube/config`).
pub async fn connect(kubeconfig_path: Option<&Path>) -> Result<Client, ConnectError> {
    let config = match Config::incluster() {
        Ok(config) => {
            info!("Using in-cluster configuration");
            config
        }
        Err(e) => {
            debug!(error = %e, "Not running in-cluster");
            load_config(kubeconfig_path).await?
        }
    };

    Ok(Client::try_from(config)?)
}

async fn load_config(kubeconfig_path: Option<&Path>) -> Result<Config, ConnectError> {
    match kubeconfig_path {
        Some(path) => {
            info!(path = %path.display(), "Using kubeconfig override");
            let kubeconfig = Kubeconfig::read_from(path)?;
            Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
        }
        None => Ok(Config::infer().await?),
    }
}
