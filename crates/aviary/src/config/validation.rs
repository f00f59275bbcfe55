//! Configuration validation.

use super::Config;
use crate::catalog::OriginPredicate;
use crate::error::{AviaryError, Result};
use crate::registry::{SamplerKind, VerifierKind};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Cluster validation
    if config.cluster.contact_points.iter().all(|c| c.trim().is_empty()) {
        return Err(AviaryError::Config(
            "cluster.contact_points needs at least one host".into(),
        ));
    }
    if config.cluster.port == 0 {
        return Err(AviaryError::Config("cluster.port must not be 0".into()));
    }
    if config.cluster.password.is_some() && config.cluster.username.is_none() {
        return Err(AviaryError::Config(
            "cluster.password is set without cluster.username".into(),
        ));
    }

    if config.sampling.limit == 0 {
        return Err(AviaryError::Config("sampling.limit must be at least 1".into()));
    }
    if config.verification.channel_capacity == 0 {
        return Err(AviaryError::Config(
            "verification.channel_capacity must be at least 1".into(),
        ));
    }

    if config.tasks.max_in_flight == 0 {
        return Err(AviaryError::Config(
            "tasks.max_in_flight must be at least 1".into(),
        ));
    }
    if let Some(0) = config.tasks.timeout_secs {
        return Err(AviaryError::Config(
            "tasks.timeout_secs must be at least 1 when set".into(),
        ));
    }

    OriginPredicate::parse(&config.filters)?;
    SamplerKind::resolve(&config.sampling.strategy)?;
    VerifierKind::resolve(&config.verification.strategy)?;

    Ok(())
}
