//! ingress-bot: builds Kubernetes Ingresses from annotated Services

pub mod cluster;
pub mod compare;
pub mod config;
pub mod desired;
pub mod health;
pub mod intent;
pub mod reconciler;
pub mod store;

pub use config::BotConfig;
pub use reconciler::{PassSummary, ReconcileError, Reconciler};
pub use store::{IngressStore, KubeStore};
