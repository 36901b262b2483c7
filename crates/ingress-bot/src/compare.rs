//! Desired vs live Ingress comparison

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::Ingress;
use tracing::debug;

/// Whether the live Ingress already matches the desired one.
///
/// Annotations and labels are compared one way: keys only present on the live
/// object are ignored, since other controllers may add their own. The spec is
/// compared structurally, so reordered rules or paths count as a change.
pub fn ingresses_equal(desired: &Ingress, current: &Ingress) -> bool {
    let name = current.metadata.name.as_deref().unwrap_or_default();

    if desired.metadata.namespace != current.metadata.namespace {
        debug!(ingress = %name, "Namespace changed");
        return false;
    }

    if !contains_all(
        desired.metadata.annotations.as_ref(),
        current.metadata.annotations.as_ref(),
    ) {
        debug!(ingress = %name, "Annotations changed");
        return false;
    }

    if !contains_all(
        desired.metadata.labels.as_ref(),
        current.metadata.labels.as_ref(),
    ) {
        debug!(ingress = %name, "Labels changed");
        return false;
    }

    if desired.spec != current.spec {
        debug!(ingress = %name, "Spec changed");
        return false;
    }

    true
}

fn contains_all(
    desired: Option<&BTreeMap<String, String>>,
    current: Option<&BTreeMap<String, String>>,
) -> bool {
    desired
        .into_iter()
        .flatten()
        .all(|(k, v)| current.and_then(|c| c.get(k)) == Some(v))
}
