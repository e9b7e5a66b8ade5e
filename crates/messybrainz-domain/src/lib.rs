// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// ============================================================================
// Value Objects & IDs
// ============================================================================

/// Stable MessyBrainz identifier of a recording. Minted once, never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingId(pub Uuid);

impl RecordingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Content fingerprint of a canonical field set: 64 lowercase hex characters (256 bits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const HEX_LEN: usize = 64;

    /// Wrap an already computed digest. Returns `None` unless `hex` is 64 lowercase hex digits.
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        let well_formed = hex.len() == Self::HEX_LEN
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        well_formed.then_some(Self(hex))
    }

    /// Hex-encode a raw SHA-256 digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Submitted & Canonical Records
// ============================================================================

/// A listen as submitted by a client, after the boundary has dropped unknown keys
/// and coerced values into the fixed field set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub release: Option<String>,
    pub recording_mbid: Option<String>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
}

impl RawRecord {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: Some(artist.into()),
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn with_recording_mbid(mut self, mbid: impl Into<String>) -> Self {
        self.recording_mbid = Some(mbid.into());
        self
    }

    pub fn with_track_number(mut self, track_number: u32) -> Self {
        self.track_number = Some(track_number);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Normalized identity fields. Two records are the same recording iff their
/// canonical fields are equal. Absent text fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalFields {
    pub artist: String,
    pub title: String,
    pub release: String,
    pub recording_mbid: String,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
}

impl CanonicalFields {
    /// View the canonical form as a submission again, e.g. to re-normalize it.
    pub fn to_raw(&self) -> RawRecord {
        fn non_empty(value: &str) -> Option<String> {
            (!value.is_empty()).then(|| value.to_string())
        }

        RawRecord {
            artist: non_empty(&self.artist),
            title: non_empty(&self.title),
            release: non_empty(&self.release),
            recording_mbid: non_empty(&self.recording_mbid),
            track_number: self.track_number,
            duration_ms: self.duration_ms,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub id: RecordingId,
    pub fields: CanonicalFields,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
}

impl Recording {
    /// A new recording with a freshly minted id.
    pub fn new(fields: CanonicalFields, fingerprint: Fingerprint) -> Self {
        Self {
            id: RecordingId::new(),
            fields,
            fingerprint,
            created_at: Utc::now(),
        }
    }
}

/// An equivalence class of recordings known to be the same real-world recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Canonical representative (union-find root).
    pub root: RecordingId,
    /// Every member, root included.
    pub members: BTreeSet<RecordingId>,
}

impl Cluster {
    pub fn contains(&self, id: RecordingId) -> bool {
        self.members.contains(&id)
    }

    /// Members other than `id`.
    pub fn others(&self, id: RecordingId) -> BTreeSet<RecordingId> {
        self.members.iter().copied().filter(|m| *m != id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged { root: RecordingId },
    AlreadyEquivalent { root: RecordingId },
}

impl MergeOutcome {
    pub fn root(&self) -> RecordingId {
        match self {
            Self::Merged { root } | Self::AlreadyEquivalent { root } => *root,
        }
    }
}
