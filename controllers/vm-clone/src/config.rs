//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Runtime settings for the clone controller
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch (all namespaces when unset)
    pub namespace: Option<String>,
    /// Maximum concurrent reconciles
    pub workers: u16,
    /// Quiet period before a burst of events triggers a reconcile
    pub debounce: Duration,
    /// Safety requeue for clones that are still in progress
    pub resync: Duration,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    /// Label/annotation key globs the target patch never touches
    pub ignored_metadata_keys: Vec<String>,
    /// Listen address of the health and metrics server
    pub metrics_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: 3,
            debounce: Duration::from_secs(1),
            resync: Duration::from_secs(300),
            backoff_min_secs: 5,
            backoff_max_secs: 300,
            ignored_metadata_keys: Vec::new(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let workers: u16 = parse(&lookup, "CLONE_WORKERS", defaults.workers)?;
        if workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "CLONE_WORKERS must be at least 1".to_string(),
            ));
        }
        let debounce = Duration::from_secs(parse(&lookup, "CLONE_DEBOUNCE_SECS", defaults.debounce.as_secs())?);
        let resync = Duration::from_secs(parse(&lookup, "CLONE_RESYNC_SECS", defaults.resync.as_secs())?);
        let backoff_min_secs = parse(&lookup, "CLONE_BACKOFF_MIN_SECS", defaults.backoff_min_secs)?;
        let backoff_max_secs = parse(&lookup, "CLONE_BACKOFF_MAX_SECS", defaults.backoff_max_secs)?;
        if backoff_max_secs < backoff_min_secs {
            return Err(ControllerError::InvalidConfig(format!(
                "CLONE_BACKOFF_MAX_SECS ({}) is lower than CLONE_BACKOFF_MIN_SECS ({})",
                backoff_max_secs, backoff_min_secs
            )));
        }
        let ignored_metadata_keys = lookup("CLONE_IGNORED_METADATA_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let metrics_addr = parse(&lookup, "METRICS_ADDR", defaults.metrics_addr)?;

        Ok(Self {
            namespace,
            workers,
            debounce,
            resync,
            backoff_min_secs,
            backoff_max_secs,
            ignored_metadata_keys,
            metrics_addr,
        })
    }

    /// Log the effective configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Namespace: {}", self.namespace.as_deref().unwrap_or("all namespaces"));
        info!("  Workers: {}", self.workers);
        info!("  Debounce: {:?}", self.debounce);
        info!("  Resync: {:?}", self.resync);
        info!("  Backoff: {}s..{}s", self.backoff_min_secs, self.backoff_max_secs);
        if self.ignored_metadata_keys.is_empty() {
            info!("  Ignored metadata keys: none");
        } else {
            info!("  Ignored metadata keys: {}", self.ignored_metadata_keys.join(", "));
        }
        info!("  Metrics address: {}", self.metrics_addr);
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.workers, 3);
        assert_eq!(config.resync, Duration::from_secs(300));
        assert!(config.ignored_metadata_keys.is_empty());
        assert_eq!(config.metrics_addr.port(), 8080);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("WATCH_NAMESPACE", "vms"),
            ("CLONE_WORKERS", "8"),
            ("CLONE_BACKOFF_MIN_SECS", "1"),
            ("CLONE_BACKOFF_MAX_SECS", "30"),
            ("CLONE_IGNORED_METADATA_KEYS", "k8s.v1.cni.cncf.io/*, kubemacpool.io/*,"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ]))
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("vms"));
        assert_eq!(config.workers, 8);
        assert_eq!(config.backoff_max_secs, 30);
        assert_eq!(
            config.ignored_metadata_keys,
            vec!["k8s.v1.cni.cncf.io/*".to_string(), "kubemacpool.io/*".to_string()]
        );
        assert_eq!(config.metrics_addr.port(), 9090);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("CLONE_WORKERS", "many")])),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("CLONE_WORKERS", "0")])),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[
                ("CLONE_BACKOFF_MIN_SECS", "60"),
                ("CLONE_BACKOFF_MAX_SECS", "10"),
            ])),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_blank_namespace_means_all() {
        let config = Config::from_lookup(lookup(&[("WATCH_NAMESPACE", "  ")])).unwrap();
        assert_eq!(config.namespace, None);
    }
}
