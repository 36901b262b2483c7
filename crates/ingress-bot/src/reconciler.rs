//! Reconciliation loop
//!
//! One pass lists Services and owned Ingresses, builds the desired state,
//! deletes Ingresses no Service asks for, then creates or replaces the rest.
//! The first error ends the pass and the loop; writes already issued in the
//! failing pass are not rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::networking::v1::Ingress;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use crate::compare::ingresses_equal;
use crate::config::{BotConfig, IngressDefaults};
use crate::desired::{build_desired, ConflictError};
use crate::health::HealthState;
use crate::store::{IngressStore, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

/// Writes issued by one pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// Drives live Ingresses toward the state declared on Services
pub struct Reconciler<S> {
    store: S,
    defaults: IngressDefaults,
    label_selector: String,
    timeout_secs: u32,
    dry_run: bool,
    interval: Duration,
    health: Option<Arc<HealthState>>,
}

impl<S: IngressStore> Reconciler<S> {
    pub fn new(store: S, config: &BotConfig) -> Self {
        Self {
            store,
            defaults: config.ingress.clone(),
            label_selector: config.ingress.ownership.selector().to_string(),
            timeout_secs: config.client_timeout_secs,
            dry_run: config.dry_run,
            interval: config.check_interval,
            health: None,
        }
    }

    /// Report successful passes to the readiness probe
    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    /// Run a single reconciliation pass.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn reconcile(&self) -> Result<PassSummary, ReconcileError> {
        let services = self
            .store
            .list_services(&self.label_selector, self.timeout_secs)
            .await?;

        // Keyed by name only: the name is the grouping key.
        let current: BTreeMap<String, Ingress> = self
            .store
            .list_ingresses(&self.label_selector, self.timeout_secs)
            .await?
            .into_iter()
            .filter_map(|ingress| Some((ingress.metadata.name.clone()?, ingress)))
            .collect();

        let desired = build_desired(&services, &self.defaults)?;

        debug!(
            services = services.len(),
            current = current.len(),
            desired = desired.len(),
            "Computed desired state"
        );

        let mut summary = PassSummary::default();

        for (name, ingress) in &current {
            if desired.contains_key(name) {
                continue;
            }
            let namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
            info!(namespace = %namespace, name = %name, "Deleting ingress");
            self.store
                .delete_ingress(namespace, name, self.dry_run)
                .await?;
            summary.deleted += 1;
        }

        for (name, ingress) in &desired {
            let namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
            match current.get(name) {
                Some(live) if ingresses_equal(ingress, live) => {
                    debug!(namespace = %namespace, name = %name, "Ingress unchanged");
                    summary.unchanged += 1;
                }
                Some(_) => {
                    info!(namespace = %namespace, name = %name, "Updating ingress");
                    self.store.replace_ingress(ingress, self.dry_run).await?;
                    summary.updated += 1;
                }
                None => {
                    info!(namespace = %namespace, name = %name, "Creating ingress");
                    self.store.create_ingress(ingress, self.dry_run).await?;
                    summary.created += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Run passes until one fails.
    ///
    /// Sleeps the check interval between passes. A zero interval runs exactly
    /// one pass and returns.
    pub async fn run(&self) -> Result<(), ReconcileError> {
        info!(
            interval_secs = self.interval.as_secs(),
            dry_run = self.dry_run,
            "Starting reconciliation loop"
        );

        loop {
            match self.reconcile().await {
                Ok(summary) => {
                    info!(
                        created = summary.created,
                        updated = summary.updated,
                        deleted = summary.deleted,
                        unchanged = summary.unchanged,
                        "Reconciliation pass complete"
                    );
                    if let Some(health) = &self.health {
                        health.mark_reconciled();
                    }
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation pass failed, stopping loop");
                    return Err(e);
                }
            }

            if self.interval.is_zero() {
                info!("Check interval is zero, exiting after a single pass");
                return Ok(());
            }

            sleep(self.interval).await;
        }
    }
}
