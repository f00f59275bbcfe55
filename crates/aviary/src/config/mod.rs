//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::catalog::OriginPredicate;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, recorded in run reports.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The conjunction of all configured filters.
    pub fn origin_predicate(&self) -> Result<OriginPredicate> {
        OriginPredicate::parse(&self.filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Origin;
    use crate::error::AviaryError;

    #[test]
    fn test_from_yaml_fills_defaults() {
        let config = Config::from_yaml(
            r#"
cluster:
  contact_points: ["10.0.0.5", "10.0.0.6"]
  local_dc: dc1
sampling:
  limit: 3
filters:
  - "shop:orders.*"
"#,
        )
        .unwrap();

        assert_eq!(config.cluster.port, 9042);
        assert_eq!(config.cluster.local_dc.as_deref(), Some("dc1"));
        assert_eq!(config.sampling.limit, 3);
        assert_eq!(config.sampling.strategy, "range");
        assert_eq!(config.sampling.output, "aviary.json");
        assert_eq!(config.verification.strategy, "simple");
        assert_eq!(config.tasks.max_in_flight, 256);

        let predicate = config.origin_predicate().unwrap();
        assert!(predicate.accepts(&Origin::new("shop", "orders_2024")));
        assert!(!predicate.accepts(&Origin::new("shop", "users")));
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.cluster.known_nodes(), vec!["127.0.0.1:9042"]);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = Config::from_yaml("cluster: [unclosed").unwrap_err();
        assert!(matches!(err, AviaryError::Yaml(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let err = Config::from_yaml("sampling:\n  limit: 0\n").unwrap_err();
        assert!(matches!(err, AviaryError::Config(_)));
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.hash(), b.hash());
        b.sampling.limit = 5;
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }
}
