//! Static registry of sampling and verification strategies.
//!
//! Strategy names come from configuration or the command line and are
//! resolved once, before any cluster work starts.

use std::fmt;
use std::sync::Arc;

use crate::context::PhaseContext;
use crate::core::CanarySink;
use crate::error::{AviaryError, Result};
use crate::sampler::{CanarySampler, RangeSelector};
use crate::verify::{CanaryVerifier, SimpleVerifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Range,
}

impl SamplerKind {
    pub const ALL: &'static [SamplerKind] = &[SamplerKind::Range];

    pub fn name(self) -> &'static str {
        match self {
            SamplerKind::Range => RangeSelector::NAME,
        }
    }

    /// Look a sampler up by name, ignoring case.
    pub fn resolve(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| unknown("sampler", name, Self::ALL.iter().map(|k| k.name())))
    }

    pub fn build(
        self,
        ctx: PhaseContext,
        sink: Arc<dyn CanarySink>,
        limit: u32,
    ) -> Box<dyn CanarySampler> {
        match self {
            SamplerKind::Range => Box::new(RangeSelector::new(ctx, sink).with_limit(limit)),
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierKind {
    Simple,
}

impl VerifierKind {
    pub const ALL: &'static [VerifierKind] = &[VerifierKind::Simple];

    pub fn name(self) -> &'static str {
        match self {
            VerifierKind::Simple => SimpleVerifier::NAME,
        }
    }

    /// Look a verifier up by name, ignoring case.
    pub fn resolve(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| unknown("verifier", name, Self::ALL.iter().map(|k| k.name())))
    }

    pub fn build(self, ctx: PhaseContext) -> Box<dyn CanaryVerifier> {
        match self {
            VerifierKind::Simple => Box::new(SimpleVerifier::new(ctx)),
        }
    }
}

impl fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn unknown<'a>(role: &str, name: &str, available: impl Iterator<Item = &'a str>) -> AviaryError {
    AviaryError::BuildConfiguration(format!(
        "unknown {} '{}' (available: {})",
        role,
        name,
        available.collect::<Vec<_>>().join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MemoryCluster;

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(SamplerKind::resolve("range").unwrap(), SamplerKind::Range);
        assert_eq!(SamplerKind::resolve(" Range ").unwrap(), SamplerKind::Range);
        assert_eq!(VerifierKind::resolve("SIMPLE").unwrap(), VerifierKind::Simple);
    }

    #[test]
    fn test_unknown_names_list_alternatives() {
        let err = SamplerKind::resolve("random").unwrap_err();
        assert!(matches!(err, AviaryError::BuildConfiguration(_)));
        assert!(err.to_string().contains("available: range"));

        let err = VerifierKind::resolve("").unwrap_err();
        assert!(err.to_string().contains("available: simple"));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_build_returns_named_strategy() {
        let cluster = Arc::new(MemoryCluster::new());
        let ctx = PhaseContext::new(cluster.clone(), cluster);
        let verifier = VerifierKind::Simple.build(ctx.clone());
        assert_eq!(verifier.name(), "simple");

        struct Discard;
        impl CanarySink for Discard {
            fn write(&self, _: &crate::core::Canary) -> Result<()> {
                Ok(())
            }
        }
        let sampler = SamplerKind::Range.build(ctx, Arc::new(Discard), 3);
        assert_eq!(sampler.name(), "range");
    }
}
