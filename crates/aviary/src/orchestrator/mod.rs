//! Run coordinator: wires configuration, cluster and aviary file into one
//! sampling or verification run.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Config;
use crate::context::PhaseContext;
use crate::core::{CanarySink, CanarySource, ClusterSession, SchemaProvider};
use crate::error::{AviaryError, Result};
use crate::registry::{SamplerKind, VerifierKind};
use crate::report::{PhaseReport, RunReport};
use crate::store::{AviaryReader, AviaryWriter};

/// Coordinates one phase against one cluster.
pub struct Orchestrator {
    config: Config,
    schema: Arc<dyn SchemaProvider>,
    session: Arc<dyn ClusterSession>,
}

impl Orchestrator {
    /// Use an already connected cluster.
    pub fn with_cluster(
        config: Config,
        schema: Arc<dyn SchemaProvider>,
        session: Arc<dyn ClusterSession>,
    ) -> Self {
        Self {
            config,
            schema,
            session,
        }
    }

    /// Connect to the configured cluster over CQL.
    #[cfg(feature = "scylla")]
    pub async fn connect(config: Config) -> Result<Self> {
        let cluster = Arc::new(crate::drivers::CqlCluster::connect(&config.cluster).await?);
        Ok(Self::with_cluster(config, cluster.clone(), cluster))
    }

    /// Connect to the configured cluster over CQL.
    #[cfg(not(feature = "scylla"))]
    pub async fn connect(_config: Config) -> Result<Self> {
        Err(AviaryError::Connection(
            "this build has no CQL driver; rebuild with --features scylla".into(),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn context(&self, cancel: CancellationToken) -> Result<PhaseContext> {
        Ok(PhaseContext::new(self.schema.clone(), self.session.clone())
            .with_predicate(self.config.origin_predicate()?)
            .with_policy(self.config.tasks.policy())
            .with_cancel(cancel))
    }

    /// Sample canaries into the configured output file.
    pub async fn select(&self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let kind = SamplerKind::resolve(&self.config.sampling.strategy)?;
        let ctx = self.context(cancel)?;

        let output = Path::new(&self.config.sampling.output);
        info!("Starting sampling run {} into {:?}", run_id, output);
        let writer = Arc::new(AviaryWriter::create(output)?);

        let sink: Arc<dyn CanarySink> = writer.clone();
        let limit = self.config.sampling.limit;
        let phase = async move {
            let sampler = kind.build(ctx, sink, limit);
            info!("Using {} sampler", sampler.name());
            sampler.select_canaries().await
        }
        .instrument(info_span!("select", run_id = %run_id))
        .await?;

        let written = match Arc::try_unwrap(writer) {
            Ok(writer) => writer.finish()?,
            Err(writer) => {
                warn!("Aviary writer still shared at the end of sampling; flushing only");
                writer.flush()?;
                writer.written()
            }
        };
        info!("Wrote {} canaries to {:?}", written, output);

        Ok(self.run_report(run_id, started_at, phase))
    }

    /// Verify the canaries of the configured input file.
    pub async fn verify(&self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let kind = VerifierKind::resolve(&self.config.verification.strategy)?;
        let ctx = self.context(cancel)?;

        let input = Path::new(&self.config.verification.input);
        info!("Starting verification run {} from {:?}", run_id, input);
        let reader = AviaryReader::new(input)
            .with_channel_capacity(self.config.verification.channel_capacity);
        let canaries = reader.open()?;

        let phase = async move {
            let verifier = kind.build(ctx);
            info!("Using {} verifier", verifier.name());
            verifier.verify_canaries(canaries).await
        }
        .instrument(info_span!("verify", run_id = %run_id))
        .await?;

        Ok(self.run_report(run_id, started_at, phase))
    }

    fn run_report(
        &self,
        run_id: String,
        started_at: chrono::DateTime<Utc>,
        phase: PhaseReport,
    ) -> RunReport {
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let (success, total) = phase.totals();
        info!(
            "Run {} {} in {:.2}s: {}/{}",
            run_id,
            if phase.cancelled() { "cancelled" } else { "completed" },
            duration_seconds,
            success,
            total
        );
        RunReport {
            run_id,
            cluster: self.session.cluster_type().to_string(),
            started_at,
            completed_at,
            duration_seconds,
            config_hash: self.config.hash(),
            phase,
        }
    }
}
