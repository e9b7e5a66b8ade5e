// SPDX-License-Identifier: GPL-3.0-or-later
use messybrainz_domain::{Fingerprint, Recording, RecordingId};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write: another writer got there first.
    #[error("{entity} already exists for {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("corrupt storage state: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// Repository Traits
// ============================================================================

/// Keyed access to recordings by id and by fingerprint.
///
/// Implementations must enforce at most one recording per fingerprint and report a
/// violated constraint on `insert` as [`StorageError::Conflict`].
#[async_trait::async_trait]
pub trait RecordingRepository: Send + Sync {
    async fn insert(&self, recording: &Recording) -> StorageResult<()>;
    async fn get_by_id(&self, id: RecordingId) -> StorageResult<Option<Recording>>;
    async fn get_by_fingerprint(&self, fingerprint: &Fingerprint)
        -> StorageResult<Option<Recording>>;
    async fn exists(&self, id: RecordingId) -> StorageResult<bool>;
    async fn count(&self) -> StorageResult<i64>;
}

/// One row of the union-find forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterNode {
    pub id: RecordingId,
    /// Equal to `id` for a root.
    pub parent: RecordingId,
    pub rank: u32,
}

impl ClusterNode {
    pub fn is_root(&self) -> bool {
        self.id == self.parent
    }
}

/// Transactional access to cluster membership.
#[async_trait::async_trait]
pub trait ClusterRepository: Send + Sync {
    /// A consistent snapshot for reading; dropped without commit it is rolled back.
    async fn begin_read(&self) -> StorageResult<Box<dyn ClusterTransaction>>;

    /// An exclusive write transaction. Holds the cluster write lock from the start so
    /// concurrent merges serialize instead of interleaving their reads and writes.
    async fn begin_write(&self) -> StorageResult<Box<dyn ClusterTransaction>>;
}

#[async_trait::async_trait]
pub trait ClusterTransaction: Send {
    /// Insert `id` as its own root unless it already has a node.
    async fn make_set(&mut self, id: RecordingId) -> StorageResult<()>;
    async fn node(&mut self, id: RecordingId) -> StorageResult<Option<ClusterNode>>;
    /// Nodes whose parent is `id`, excluding `id` itself.
    async fn children(&mut self, id: RecordingId) -> StorageResult<Vec<RecordingId>>;
    async fn set_parent(&mut self, id: RecordingId, parent: RecordingId) -> StorageResult<()>;
    async fn set_rank(&mut self, id: RecordingId, rank: u32) -> StorageResult<()>;
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
