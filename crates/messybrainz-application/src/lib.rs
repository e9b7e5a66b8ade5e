// SPDX-License-Identifier: GPL-3.0-or-later
use messybrainz_config::{AppConfig, NormalizationConfig};
pub mod clusters;
pub mod resolver;
pub mod submission;

#[cfg(test)]
mod test_support;

pub use clusters::{ClusterError, ClusterManager, ClusterResult};
pub use resolver::{PreparedRecord, Resolution, ResolutionError, ResolutionResult, Resolver};
pub use submission::{ResolvedRecording, SubmissionService};

use std::collections::BTreeSet;
use std::sync::Arc;

use messybrainz_domain::{Cluster, MergeOutcome, RawRecord, Recording, RecordingId};
use messybrainz_fingerprint::{Normalizer, NormalizerOptions};
use messybrainz_infrastructure::{
    ClusterRepository, RecordingRepository, SqliteClusterRepository, SqliteRecordingRepository,
};
use sqlx::SqlitePool;
use tracing::info;

/// Shared service context handed to the HTTP layer and the CLI.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub recordings: Arc<dyn RecordingRepository>,
    pub resolver: Arc<Resolver>,
    pub submissions: Arc<SubmissionService>,
    pub clusters: Arc<ClusterManager>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        recordings: Arc<dyn RecordingRepository>,
        clusters: Arc<dyn ClusterRepository>,
    ) -> Self {
        let normalizer = Normalizer::new(normalizer_options(&config.normalization));
        let retries = config.resolver.max_conflict_retries;

        let resolver = Arc::new(Resolver::new(normalizer, recordings.clone(), retries));
        let submissions = Arc::new(SubmissionService::new(
            resolver.clone(),
            config.submission.max_batch_size,
        ));
        let clusters = Arc::new(ClusterManager::new(recordings.clone(), clusters));

        Self {
            config,
            recordings,
            resolver,
            submissions,
            clusters,
        }
    }

    /// Wire the SQLite repositories over an initialized pool.
    pub fn from_pool(config: AppConfig, pool: SqlitePool) -> Self {
        let recordings = Arc::new(SqliteRecordingRepository::new(pool.clone()));
        let clusters = Arc::new(SqliteClusterRepository::new(pool));
        Self::new(config, recordings, clusters)
    }

    pub fn on_start(&self) {
        info!(
            target: "application",
            max_batch_size = self.config.submission.max_batch_size,
            max_conflict_retries = self.config.resolver.max_conflict_retries,
            "application state initialized"
        );
    }

    pub async fn submit_batch(&self, records: &[RawRecord]) -> ResolutionResult<Vec<ResolvedRecording>> {
        self.submissions.submit_batch(records).await
    }

    pub async fn resolve(&self, record: &RawRecord) -> ResolutionResult<Resolution> {
        self.resolver.resolve_recording(record).await
    }

    pub async fn get_recording(&self, id: RecordingId) -> ResolutionResult<Recording> {
        self.recordings
            .get_by_id(id)
            .await?
            .ok_or(ResolutionError::UnknownId(id))
    }

    pub async fn get_equivalents(&self, id: RecordingId) -> ClusterResult<BTreeSet<RecordingId>> {
        self.clusters.equivalents_of(id).await
    }

    /// The cluster containing `id`; a never-merged id is its own singleton cluster.
    pub async fn cluster_of(&self, id: RecordingId) -> ClusterResult<Cluster> {
        Ok(self.clusters.cluster_of(id).await?.unwrap_or_else(|| Cluster {
            root: id,
            members: BTreeSet::from([id]),
        }))
    }

    pub async fn merge(&self, a: RecordingId, b: RecordingId) -> ClusterResult<MergeOutcome> {
        self.clusters.merge(a, b).await
    }
}

pub fn normalizer_options(config: &NormalizationConfig) -> NormalizerOptions {
    NormalizerOptions {
        strip_diacritics: config.strip_diacritics,
        strip_punctuation: config.strip_punctuation,
        noise_tokens: config.noise_tokens.clone(),
    }
}
