// SPDX-License-Identifier: GPL-3.0-or-later

//! Batch submission of listens.
//!
//! A batch is all-or-nothing with respect to input errors: every record is normalized and
//! validated before the first storage write, so a single bad record rejects the batch
//! without leaving any of its recordings behind.

use std::sync::Arc;

use messybrainz_domain::{CanonicalFields, RawRecord, RecordingId};
use serde::Serialize;
use tracing::{debug, info};

use crate::resolver::{PreparedRecord, ResolutionError, ResolutionResult, Resolver};

/// One entry of a batch result, positionally matching the submitted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRecording {
    pub id: RecordingId,
    #[serde(flatten)]
    pub fields: CanonicalFields,
    #[serde(skip)]
    pub created: bool,
}

pub struct SubmissionService {
    resolver: Arc<Resolver>,
    max_batch_size: usize,
}

impl SubmissionService {
    pub fn new(resolver: Arc<Resolver>, max_batch_size: usize) -> Self {
        Self {
            resolver,
            max_batch_size,
        }
    }

    /// Resolve every record of a batch, preserving order and length.
    pub async fn submit_batch(&self, records: &[RawRecord]) -> ResolutionResult<Vec<ResolvedRecording>> {
        if records.len() > self.max_batch_size {
            return Err(ResolutionError::invalid(format!(
                "batch of {} records exceeds the limit of {}",
                records.len(),
                self.max_batch_size
            )));
        }

        let prepared = records
            .iter()
            .enumerate()
            .map(|(position, raw)| {
                self.resolver
                    .prepare(raw)
                    .map_err(|err| err.at_index(position))
            })
            .collect::<ResolutionResult<Vec<PreparedRecord>>>()?;

        debug!(target: "submission", records = prepared.len(), "batch validated");

        let mut resolved = Vec::with_capacity(prepared.len());
        for record in prepared {
            let resolution = self.resolver.resolve_prepared(record).await?;
            resolved.push(ResolvedRecording {
                id: resolution.recording.id,
                fields: resolution.recording.fields,
                created: resolution.created,
            });
        }

        let created = resolved.iter().filter(|r| r.created).count();
        info!(
            target: "submission",
            records = resolved.len(),
            created,
            "batch resolved"
        );

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;
    use messybrainz_fingerprint::Normalizer;
    use messybrainz_infrastructure::{RecordingRepository, SqliteRecordingRepository};

    async fn service(max_batch_size: usize) -> (SubmissionService, Arc<dyn RecordingRepository>) {
        let pool = memory_pool().await;
        let recordings: Arc<dyn RecordingRepository> =
            Arc::new(SqliteRecordingRepository::new(pool));
        let resolver = Arc::new(Resolver::new(Normalizer::default(), recordings.clone(), 3));
        (SubmissionService::new(resolver, max_batch_size), recordings)
    }

    #[tokio::test]
    async fn batch_preserves_order_and_duplicates() {
        let (service, recordings) = service(10).await;
        let r1 = RawRecord::new("The Beatles", "Let It Be");
        let r2 = RawRecord::new("Nina Simone", "Sinnerman");
        let r3 = RawRecord::new("THE BEATLES", "let it be ");

        let result = service
            .submit_batch(&[r1, r2, r3])
            .await
            .expect("batch resolves");

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].id, result[2].id);
        assert_ne!(result[0].id, result[1].id);
        assert_eq!(result[1].fields.artist, "nina simone");
        assert!(result[0].created);
        assert!(!result[2].created);
        assert_eq!(recordings.count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn invalid_record_fails_the_batch_without_writes() {
        let (service, recordings) = service(10).await;
        let good = RawRecord::new("Massive Attack", "Teardrop");
        let bad = RawRecord {
            title: Some("No Artist".to_string()),
            ..RawRecord::default()
        };

        let err = service
            .submit_batch(&[good, bad])
            .await
            .expect_err("batch must fail");

        assert!(matches!(err, ResolutionError::InvalidInput { index: Some(1), .. }));
        assert_eq!(recordings.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let (service, recordings) = service(2).await;
        let batch = vec![RawRecord::new("a", "b"); 3];

        let err = service.submit_batch(&batch).await.expect_err("too many records");

        assert!(matches!(err, ResolutionError::InvalidInput { index: None, .. }));
        assert_eq!(recordings.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn empty_batch_resolves_to_empty_result() {
        let (service, _) = service(2).await;
        let result = service.submit_batch(&[]).await.expect("empty batch");
        assert!(result.is_empty());
    }

    #[test]
    fn resolved_recording_serializes_flat() {
        let resolved = ResolvedRecording {
            id: RecordingId::new(),
            fields: CanonicalFields {
                artist: "the beatles".to_string(),
                title: "let it be".to_string(),
                ..CanonicalFields::default()
            },
            created: true,
        };

        let json = serde_json::to_value(&resolved).expect("serializes");
        assert_eq!(json["artist"], "the beatles");
        assert_eq!(json["id"], resolved.id.to_string());
        assert!(json.get("created").is_none());
    }
}
