//! Desired Ingress state
//!
//! Folds every Service into one Ingress per grouping key. Services sharing a
//! key are merged into the same Ingress; incompatible declarations abort the
//! whole build.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use thiserror::Error;
use tracing::debug;

use crate::config::IngressDefaults;
use crate::intent::ServiceIntent;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("service {namespace}/{service} declares host for ingress {ingress_namespace}/{ingress}")]
    Namespace {
        service: String,
        namespace: String,
        ingress: String,
        ingress_namespace: String,
    },
    #[error(
        "service {namespace}/{service} declares class {class} for ingress {namespace}/{ingress} \
         of class {existing}"
    )]
    Class {
        service: String,
        namespace: String,
        class: String,
        ingress: String,
        existing: String,
    },
}

/// Build the desired Ingresses, keyed by name.
///
/// Services are folded sorted by namespace and name, so the result and any
/// conflict reported are the same on every pass.
pub fn build_desired(
    services: &[Service],
    defaults: &IngressDefaults,
) -> Result<BTreeMap<String, Ingress>, ConflictError> {
    let mut ordered: Vec<&Service> = services.iter().collect();
    ordered.sort_by(|a, b| {
        let key = |s: &Service| (s.metadata.namespace.clone(), s.metadata.name.clone());
        key(a).cmp(&key(b))
    });

    let mut desired = BTreeMap::new();

    for service in ordered {
        let intent = ServiceIntent::from_service(service, &defaults.annotation_keys);
        let name = intent.grouping_key();

        let ingress = match desired.entry(name.clone()) {
            Entry::Occupied(entry) => {
                let ingress = entry.into_mut();
                check_compatible(ingress, &intent, &name)?;
                ingress
            }
            Entry::Vacant(entry) => {
                debug!(
                    namespace = %intent.namespace,
                    ingress = %name,
                    "Adding ingress to desired state"
                );
                entry.insert(new_ingress(&name, &intent, defaults))
            }
        };

        debug!(
            namespace = %intent.namespace,
            service = %intent.name,
            ingress = %name,
            "Attaching service to ingress"
        );
        attach_service(ingress, &intent, &defaults.path_type);
    }

    Ok(desired)
}

fn check_compatible(
    ingress: &Ingress,
    intent: &ServiceIntent,
    name: &str,
) -> Result<(), ConflictError> {
    let ingress_namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
    if ingress_namespace != intent.namespace {
        return Err(ConflictError::Namespace {
            service: intent.name.clone(),
            namespace: intent.namespace.clone(),
            ingress: name.to_string(),
            ingress_namespace: ingress_namespace.to_string(),
        });
    }

    let existing = ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.as_deref());
    if let (Some(existing), Some(class)) = (existing, intent.class()) {
        if existing != class {
            return Err(ConflictError::Class {
                service: intent.name.clone(),
                namespace: intent.namespace.clone(),
                class: class.to_string(),
                ingress: name.to_string(),
                existing: existing.to_string(),
            });
        }
    }

    Ok(())
}

/// Fresh Ingress for the first Service of a grouping key. Every host gets a
/// rule with an empty path list.
pub(crate) fn new_ingress(name: &str, intent: &ServiceIntent, defaults: &IngressDefaults) -> Ingress {
    let rules = intent
        .hosts
        .iter()
        .map(|host| IngressRule {
            host: Some(host.clone()).filter(|h| !h.is_empty()),
            http: Some(HTTPIngressRuleValue { paths: Vec::new() }),
        })
        .collect();

    let mut labels = BTreeMap::from([(
        defaults.ownership.key.clone(),
        defaults.ownership.value.clone(),
    )]);
    labels.extend(defaults.labels.clone());

    let tls = defaults.enable_tls.then(|| {
        vec![IngressTLS {
            hosts: Some(intent.hosts.clone()),
            secret_name: Some(format!("{name}-tls")),
        }]
    });

    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(intent.namespace.clone()),
            annotations: Some(defaults.annotations.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: intent.class().map(str::to_string),
            rules: Some(rules),
            tls,
            ..Default::default()
        }),
        status: None,
    }
}

/// Bind the Service to the first rule of the Ingress.
///
/// A previous binding for the same Service is replaced and the new one goes
/// to the end of the list. Hosts after the first never receive paths.
pub(crate) fn attach_service(ingress: &mut Ingress, intent: &ServiceIntent, path_type: &str) {
    let Some(rule) = ingress
        .spec
        .as_mut()
        .and_then(|s| s.rules.as_mut())
        .and_then(|rules| rules.first_mut())
    else {
        return;
    };

    let http = rule.http.get_or_insert_with(HTTPIngressRuleValue::default);
    http.paths
        .retain(|p| backend_service_name(p) != Some(intent.name.as_str()));

    http.paths.push(HTTPIngressPath {
        path: Some(intent.path.clone()).filter(|p| !p.is_empty()),
        path_type: path_type.to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: intent.name.clone(),
                port: Some(ServiceBackendPort {
                    number: Some(intent.backend_port),
                    name: None,
                }),
            }),
            resource: None,
        },
    });
}

fn backend_service_name(path: &HTTPIngressPath) -> Option<&str> {
    path.backend.service.as_ref().map(|s| s.name.as_str())
}
