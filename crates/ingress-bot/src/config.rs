//! Process configuration
//!
//! Everything is read from environment variables once at startup and passed
//! by reference afterwards. Unset variables fall back to the defaults in
//! [`defaults`]; malformed values fail startup.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Environment variable names
pub mod vars {
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const CHECK_INTERVAL: &str = "CHECK_INTERVAL";
    pub const DRY_RUN: &str = "DRY_RUN";
    pub const KUBECONFIG_PATH: &str = "KUBECONFIG_PATH";
    pub const RESOURCE_LABEL_KEY: &str = "RESOURCE_LABEL_KEY";
    pub const RESOURCE_LABEL_VALUE: &str = "RESOURCE_LABEL_VALUE";
    pub const CLIENT_TIMEOUT: &str = "CLIENT_TIMEOUT";
    pub const INGRESS_HOST_ANNOTATION: &str = "INGRESS_HOST_ANNOTATION";
    pub const INGRESS_CLASS_ANNOTATION: &str = "INGRESS_CLASS_ANNOTATION";
    pub const INGRESS_PATH_ANNOTATION: &str = "INGRESS_PATH_ANNOTATION";
    pub const INGRESS_ENABLE_TLS: &str = "INGRESS_ENABLE_TLS";
    pub const INGRESS_ANNOTATIONS: &str = "INGRESS_ANNOTATIONS";
    pub const INGRESS_LABELS: &str = "INGRESS_LABELS";
    pub const INGRESS_PATH_TYPE: &str = "INGRESS_PATH_TYPE";
    pub const HEALTH_PORT: &str = "HEALTH_PORT";
}

/// Values used when a variable is unset
pub mod defaults {
    pub const LOG_LEVEL: &str = "info";
    pub const CHECK_INTERVAL_SECS: u64 = 30;
    pub const CLIENT_TIMEOUT_SECS: u32 = 60;
    pub const RESOURCE_LABEL_KEY: &str = "ptonini.github.io/ingress-bot";
    pub const RESOURCE_LABEL_VALUE: &str = "true";
    pub const HOST_ANNOTATION: &str = "ptonini.github.io/ingress-host";
    pub const CLASS_ANNOTATION: &str = "ptonini.github.io/ingress-class";
    pub const PATH_ANNOTATION: &str = "ptonini.github.io/ingress-path";
    pub const ENABLE_TLS: bool = true;
    pub const PATH_TYPE: &str = "ImplementationSpecific";
    pub const HEALTH_PORT: u16 = 8081;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be a JSON object of string values: {source}")]
    InvalidMap {
        var: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Service annotation keys that declare routing intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationKeys {
    /// Comma-separated host list
    pub host: String,
    /// IngressClass name
    pub class: String,
    /// HTTP path
    pub path: String,
}

impl Default for AnnotationKeys {
    fn default() -> Self {
        Self {
            host: defaults::HOST_ANNOTATION.to_string(),
            class: defaults::CLASS_ANNOTATION.to_string(),
            path: defaults::PATH_ANNOTATION.to_string(),
        }
    }
}

/// Label marking objects owned by ingress-bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipLabel {
    pub key: String,
    pub value: String,
}

impl OwnershipLabel {
    /// Label selector used to list owned objects.
    ///
    /// Matches on key existence so objects survive a change of the label value.
    pub fn selector(&self) -> &str {
        &self.key
    }
}

impl Default for OwnershipLabel {
    fn default() -> Self {
        Self {
            key: defaults::RESOURCE_LABEL_KEY.to_string(),
            value: defaults::RESOURCE_LABEL_VALUE.to_string(),
        }
    }
}

/// Settings that shape every generated Ingress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressDefaults {
    pub annotation_keys: AnnotationKeys,
    pub ownership: OwnershipLabel,
    /// Add a `<name>-tls` TLS entry covering all hosts
    pub enable_tls: bool,
    /// Extra annotations copied onto every Ingress
    pub annotations: BTreeMap<String, String>,
    /// Extra labels copied onto every Ingress, after the ownership label
    pub labels: BTreeMap<String, String>,
    /// `pathType` of every generated path
    pub path_type: String,
}

impl Default for IngressDefaults {
    fn default() -> Self {
        Self {
            annotation_keys: AnnotationKeys::default(),
            ownership: OwnershipLabel::default(),
            enable_tls: defaults::ENABLE_TLS,
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            path_type: defaults::PATH_TYPE.to_string(),
        }
    }
}

/// ingress-bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub log_level: String,
    /// Pause between reconciliation passes; zero runs a single pass
    pub check_interval: Duration,
    /// Send every write with `dryRun=All`
    pub dry_run: bool,
    /// Kubeconfig used when not running in-cluster
    pub kubeconfig_path: Option<PathBuf>,
    /// Server-side timeout for list calls
    pub client_timeout_secs: u32,
    /// Port of the probe server, 0 disables it
    pub health_port: u16,
    pub ingress: IngressDefaults,
}

impl BotConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |var: &'static str, default: &str| -> Result<String, ConfigError> {
            match lookup(var) {
                Some(v) if v.is_empty() => Err(ConfigError::Empty { var }),
                Some(v) => Ok(v),
                None => Ok(default.to_string()),
            }
        };

        let annotation_keys = AnnotationKeys {
            host: string(vars::INGRESS_HOST_ANNOTATION, defaults::HOST_ANNOTATION)?,
            class: string(vars::INGRESS_CLASS_ANNOTATION, defaults::CLASS_ANNOTATION)?,
            path: string(vars::INGRESS_PATH_ANNOTATION, defaults::PATH_ANNOTATION)?,
        };

        let ownership = OwnershipLabel {
            key: string(vars::RESOURCE_LABEL_KEY, defaults::RESOURCE_LABEL_KEY)?,
            value: lookup(vars::RESOURCE_LABEL_VALUE)
                .unwrap_or_else(|| defaults::RESOURCE_LABEL_VALUE.to_string()),
        };

        let ingress = IngressDefaults {
            annotation_keys,
            ownership,
            enable_tls: parse_bool(
                vars::INGRESS_ENABLE_TLS,
                lookup(vars::INGRESS_ENABLE_TLS),
                defaults::ENABLE_TLS,
            )?,
            annotations: parse_map(vars::INGRESS_ANNOTATIONS, lookup(vars::INGRESS_ANNOTATIONS))?,
            labels: parse_map(vars::INGRESS_LABELS, lookup(vars::INGRESS_LABELS))?,
            path_type: string(vars::INGRESS_PATH_TYPE, defaults::PATH_TYPE)?,
        };

        Ok(Self {
            log_level: string(vars::LOG_LEVEL, defaults::LOG_LEVEL)?,
            check_interval: Duration::from_secs(parse_number(
                vars::CHECK_INTERVAL,
                lookup(vars::CHECK_INTERVAL),
                defaults::CHECK_INTERVAL_SECS,
            )?),
            dry_run: parse_bool(vars::DRY_RUN, lookup(vars::DRY_RUN), false)?,
            kubeconfig_path: lookup(vars::KUBECONFIG_PATH)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            client_timeout_secs: parse_number(
                vars::CLIENT_TIMEOUT,
                lookup(vars::CLIENT_TIMEOUT),
                defaults::CLIENT_TIMEOUT_SECS,
            )?,
            health_port: parse_number(
                vars::HEALTH_PORT,
                lookup(vars::HEALTH_PORT),
                defaults::HEALTH_PORT,
            )?,
            ingress,
        })
    }

    /// `EnvFilter` directive for the configured log level.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "debug" => "debug",
            "warn" => "warn",
            "error" | "dpanic" | "panic" | "fatal" => "error",
            _ => "info",
        }
    }
}

fn parse_bool(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}

fn parse_number<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value: v }),
        None => Ok(default),
    }
}

fn parse_map(
    var: &'static str,
    value: Option<String>,
) -> Result<BTreeMap<String, String>, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => {
            serde_json::from_str(&v).map_err(|source| ConfigError::InvalidMap { var, source })
        }
        _ => Ok(BTreeMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|var| env.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).expect("defaults should load");

        assert_eq!(config.log_level, "info");
        assert_eq!(config.check_interval, Duration::from_secs(30));
        assert!(!config.dry_run);
        assert!(config.kubeconfig_path.is_none());
        assert_eq!(config.client_timeout_secs, 60);
        assert_eq!(config.health_port, 8081);
        assert_eq!(config.ingress, IngressDefaults::default());
        assert_eq!(
            config.ingress.ownership.selector(),
            "ptonini.github.io/ingress-bot"
        );
        assert_eq!(
            config.ingress.annotation_keys.host,
            "ptonini.github.io/ingress-host"
        );
        assert!(config.ingress.enable_tls);
        assert_eq!(config.ingress.path_type, "ImplementationSpecific");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            (vars::CHECK_INTERVAL, "0"),
            (vars::DRY_RUN, "TRUE"),
            (vars::KUBECONFIG_PATH, "/tmp/kubeconfig"),
            (vars::CLIENT_TIMEOUT, "5"),
            (vars::INGRESS_ENABLE_TLS, "f"),
            (vars::INGRESS_PATH_TYPE, "Prefix"),
            (vars::RESOURCE_LABEL_KEY, "example.com/owned"),
            (vars::INGRESS_ANNOTATIONS, r#"{"cert-manager.io/cluster-issuer": "letsencrypt"}"#),
            (vars::INGRESS_LABELS, r#"{"team": "web"}"#),
        ])
        .expect("overrides should load");

        assert!(config.check_interval.is_zero());
        assert!(config.dry_run);
        assert_eq!(
            config.kubeconfig_path,
            Some(PathBuf::from("/tmp/kubeconfig"))
        );
        assert_eq!(config.client_timeout_secs, 5);
        assert!(!config.ingress.enable_tls);
        assert_eq!(config.ingress.path_type, "Prefix");
        assert_eq!(config.ingress.ownership.key, "example.com/owned");
        assert_eq!(
            config.ingress.annotations.get("cert-manager.io/cluster-issuer"),
            Some(&"letsencrypt".to_string())
        );
        assert_eq!(config.ingress.labels.get("team"), Some(&"web".to_string()));
    }

    #[test]
    fn test_invalid_bool() {
        let err = load(&[(vars::DRY_RUN, "yes")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBool { var, .. } if var == vars::DRY_RUN));
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[(vars::CHECK_INTERVAL, "-1")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var, .. } if var == vars::CHECK_INTERVAL));
    }

    #[test]
    fn test_invalid_map() {
        let err = load(&[(vars::INGRESS_LABELS, r#"["not", "a", "map"]"#)]).unwrap_err();
        assert!(err.to_string().contains(vars::INGRESS_LABELS));
    }

    #[test]
    fn test_empty_annotation_key_rejected() {
        let err = load(&[(vars::INGRESS_HOST_ANNOTATION, "")]).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }

    #[test]
    fn test_log_directive() {
        for (level, directive) in [
            ("debug", "debug"),
            ("INFO", "info"),
            ("warn", "warn"),
            ("fatal", "error"),
            ("bogus", "info"),
        ] {
            let config = load(&[(vars::LOG_LEVEL, level)]).unwrap();
            assert_eq!(config.log_directive(), directive, "level {level}");
        }
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(vars::CHECK_INTERVAL, "15");
        std::env::set_var(vars::DRY_RUN, "true");

        let config = BotConfig::from_env().unwrap();
        assert_eq!(config.check_interval, Duration::from_secs(15));
        assert!(config.dry_run);

        std::env::remove_var(vars::CHECK_INTERVAL);
        std::env::remove_var(vars::DRY_RUN);
    }
}
