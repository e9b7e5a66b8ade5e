// SPDX-License-Identifier: GPL-3.0-or-later

//! Resolution of submitted records to stable recording ids.
//!
//! A record is normalized and fingerprinted, then looked up by fingerprint. On a miss a
//! new recording is inserted. Storage holds a uniqueness constraint on the fingerprint,
//! so when two resolvers race on a never-seen fingerprint exactly one insert lands and
//! the loser sees a conflict, which sends it back to the lookup.

use std::sync::Arc;

use messybrainz_domain::{CanonicalFields, Fingerprint, RawRecord, Recording, RecordingId};
use messybrainz_fingerprint::{fingerprint, Normalizer};
use messybrainz_infrastructure::{RecordingRepository, StorageError};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors that can occur while resolving records
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The caller sent something that cannot identify a recording. `index` locates the
    /// offending record within a batch.
    #[error("invalid input: {reason}")]
    InvalidInput {
        index: Option<usize>,
        reason: String,
    },

    #[error("unknown recording id: {0}")]
    UnknownId(RecordingId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ResolutionError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            index: None,
            reason: reason.into(),
        }
    }

    /// Attach a batch position to an input error.
    pub fn at_index(self, position: usize) -> Self {
        match self {
            Self::InvalidInput { reason, .. } => Self::InvalidInput {
                index: Some(position),
                reason: format!("record {position}: {reason}"),
            },
            other => other,
        }
    }
}

pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// A validated record, ready to be resolved without further checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRecord {
    pub fields: CanonicalFields,
    pub fingerprint: Fingerprint,
}

/// Outcome of resolving one record.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub recording: Recording,
    /// True when this call minted the recording.
    pub created: bool,
}

pub struct Resolver {
    normalizer: Normalizer,
    recordings: Arc<dyn RecordingRepository>,
    max_attempts: u32,
}

impl Resolver {
    pub fn new(
        normalizer: Normalizer,
        recordings: Arc<dyn RecordingRepository>,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            normalizer,
            recordings,
            max_attempts: max_conflict_retries.max(1),
        }
    }

    /// Normalize, validate, and fingerprint without touching storage.
    pub fn prepare(&self, raw: &RawRecord) -> ResolutionResult<PreparedRecord> {
        let fields = self.normalizer.normalize(raw);

        if fields.artist.is_empty() {
            return Err(ResolutionError::invalid("artist is missing or empty"));
        }
        if fields.title.is_empty() {
            return Err(ResolutionError::invalid("title is missing or empty"));
        }
        if !fields.recording_mbid.is_empty() && Uuid::parse_str(&fields.recording_mbid).is_err() {
            return Err(ResolutionError::invalid(format!(
                "recording_mbid {:?} is not a UUID",
                fields.recording_mbid
            )));
        }
        if let Some(duration_ms) = fields.duration_ms {
            if i64::try_from(duration_ms).is_err() {
                return Err(ResolutionError::invalid(format!(
                    "duration_ms {duration_ms} is out of range"
                )));
            }
        }

        let fingerprint = fingerprint(&fields);
        Ok(PreparedRecord {
            fields,
            fingerprint,
        })
    }

    pub async fn resolve(&self, raw: &RawRecord) -> ResolutionResult<RecordingId> {
        self.resolve_recording(raw)
            .await
            .map(|resolution| resolution.recording.id)
    }

    pub async fn resolve_recording(&self, raw: &RawRecord) -> ResolutionResult<Resolution> {
        let prepared = self.prepare(raw)?;
        self.resolve_prepared(prepared).await
    }

    /// Find the recording for a prepared record, creating it on first sight.
    pub async fn resolve_prepared(&self, prepared: PreparedRecord) -> ResolutionResult<Resolution> {
        let PreparedRecord {
            fields,
            fingerprint,
        } = prepared;

        if let Some(existing) = self.recordings.get_by_fingerprint(&fingerprint).await? {
            debug!(
                target: "resolver",
                recording_id = %existing.id,
                %fingerprint,
                "fingerprint already known"
            );
            return Ok(Resolution {
                recording: existing,
                created: false,
            });
        }

        for attempt in 1..=self.max_attempts {
            let candidate = Recording::new(fields.clone(), fingerprint.clone());
            match self.recordings.insert(&candidate).await {
                Ok(()) => {
                    info!(
                        target: "resolver",
                        recording_id = %candidate.id,
                        %fingerprint,
                        "minted new recording"
                    );
                    return Ok(Resolution {
                        recording: candidate,
                        created: true,
                    });
                }
                Err(err) if err.is_conflict() => {
                    debug!(
                        target: "resolver",
                        attempt,
                        %fingerprint,
                        "lost insert race, looking up the winner"
                    );
                    // A conflict means the winning row is already committed.
                    if let Some(winner) = self.recordings.get_by_fingerprint(&fingerprint).await? {
                        return Ok(Resolution {
                            recording: winner,
                            created: false,
                        });
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(StorageError::Corrupt(format!(
            "fingerprint {fingerprint} conflicted {} times without a visible winner",
            self.max_attempts
        ))
        .into())
    }
}
