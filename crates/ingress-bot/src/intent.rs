//! Routing intent declared on a Service through annotations

use k8s_openapi::api::core::v1::Service;

use crate::config::AnnotationKeys;

/// What a single Service asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIntent {
    pub name: String,
    pub namespace: String,
    /// Host annotation split on `,`; never empty, may hold `""`
    pub hosts: Vec<String>,
    /// IngressClass, empty when not annotated
    pub class: String,
    /// Path annotation, empty when not annotated
    pub path: String,
    /// First declared port, 0 when the Service declares none
    pub backend_port: i32,
}

impl ServiceIntent {
    /// Read the intent from a Service. Never fails; bad input surfaces later
    /// as a build conflict or an Ingress rejected by the API server.
    pub fn from_service(service: &Service, keys: &AnnotationKeys) -> Self {
        let annotations = service.metadata.annotations.as_ref();
        let annotation = |key: &str| {
            annotations
                .and_then(|a| a.get(key))
                .cloned()
                .unwrap_or_default()
        };

        let hosts = annotation(&keys.host)
            .split(',')
            .map(str::to_string)
            .collect();

        let backend_port = service
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .and_then(|ports| ports.first())
            .map(|p| p.port)
            .unwrap_or(0);

        Self {
            name: service.metadata.name.clone().unwrap_or_default(),
            namespace: service.metadata.namespace.clone().unwrap_or_default(),
            hosts,
            class: annotation(&keys.class),
            path: annotation(&keys.path),
            backend_port,
        }
    }

    /// Name of the Ingress this Service belongs to
    pub fn grouping_key(&self) -> String {
        self.hosts
            .first()
            .map(|host| grouping_key(host))
            .unwrap_or_default()
    }

    /// Class, or `None` when the annotation is absent or empty
    pub fn class(&self) -> Option<&str> {
        Some(self.class.as_str()).filter(|c| !c.is_empty())
    }
}

/// Derive an Ingress name from a host: `www.example.com` -> `www-example-com`
pub fn grouping_key(host: &str) -> String {
    host.replace('.', "-")
}
