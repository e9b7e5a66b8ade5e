// SPDX-License-Identifier: GPL-3.0-or-later

//! Equivalence clusters ("aka") over recording ids.
//!
//! Clusters are a union-find forest stored as parent pointers. A merge runs in one write
//! transaction: both ids are made sets, both roots are found (compressing the walked
//! paths), and the lower-rank root is hung under the higher-rank one. Reads walk to the
//! root and collect its descendants inside a read transaction, so a reader sees either
//! the whole union or none of it.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use messybrainz_domain::{Cluster, MergeOutcome, RecordingId};
use messybrainz_infrastructure::{
    ClusterNode, ClusterRepository, ClusterTransaction, RecordingRepository, StorageError,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("unknown recording id: {0}")]
    UnknownId(RecordingId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

pub struct ClusterManager {
    recordings: Arc<dyn RecordingRepository>,
    clusters: Arc<dyn ClusterRepository>,
}

impl ClusterManager {
    pub fn new(
        recordings: Arc<dyn RecordingRepository>,
        clusters: Arc<dyn ClusterRepository>,
    ) -> Self {
        Self {
            recordings,
            clusters,
        }
    }

    /// Declare `a` and `b` the same recording, joining their whole clusters.
    pub async fn merge(&self, a: RecordingId, b: RecordingId) -> ClusterResult<MergeOutcome> {
        self.ensure_known(a).await?;
        self.ensure_known(b).await?;

        if a == b {
            let root = self.cluster_root(a).await?.unwrap_or(a);
            return Ok(MergeOutcome::AlreadyEquivalent { root });
        }

        self.merge_in_transaction(a, b).await
    }

    /// All other ids known to be the same recording as `id`. Empty when `id` was never merged.
    pub async fn equivalents_of(&self, id: RecordingId) -> ClusterResult<BTreeSet<RecordingId>> {
        Ok(self
            .cluster_of(id)
            .await?
            .map(|cluster| cluster.others(id))
            .unwrap_or_default())
    }

    /// The full cluster of `id`, or `None` when `id` is an implicit singleton.
    pub async fn cluster_of(&self, id: RecordingId) -> ClusterResult<Option<Cluster>> {
        self.ensure_known(id).await?;

        let mut tx = self.clusters.begin_read().await?;
        let Some((root, _)) = walk_to_root(tx.as_mut(), id).await? else {
            return Ok(None);
        };

        let mut members = BTreeSet::from([root.id]);
        let mut queue = VecDeque::from([root.id]);
        while let Some(current) = queue.pop_front() {
            for child in tx.children(current).await? {
                if members.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        tx.commit().await?;

        Ok(Some(Cluster {
            root: root.id,
            members,
        }))
    }

    async fn cluster_root(&self, id: RecordingId) -> ClusterResult<Option<RecordingId>> {
        let mut tx = self.clusters.begin_read().await?;
        let root = walk_to_root(tx.as_mut(), id).await?.map(|(root, _)| root.id);
        tx.commit().await?;
        Ok(root)
    }

    async fn merge_in_transaction(&self, a: RecordingId, b: RecordingId) -> ClusterResult<MergeOutcome> {
        let mut tx = self.clusters.begin_write().await?;
        tx.make_set(a).await?;
        tx.make_set(b).await?;

        let root_a = find_and_compress(tx.as_mut(), a).await?;
        let root_b = find_and_compress(tx.as_mut(), b).await?;

        if root_a.id == root_b.id {
            tx.commit().await?;
            debug!(target: "clusters", %a, %b, root = %root_a.id, "already equivalent");
            return Ok(MergeOutcome::AlreadyEquivalent { root: root_a.id });
        }

        // Union by rank; equal ranks elect the smaller id so the outcome is deterministic.
        let (winner, loser) = match root_a.rank.cmp(&root_b.rank) {
            std::cmp::Ordering::Greater => (root_a, root_b),
            std::cmp::Ordering::Less => (root_b, root_a),
            std::cmp::Ordering::Equal if root_a.id < root_b.id => (root_a, root_b),
            std::cmp::Ordering::Equal => (root_b, root_a),
        };

        tx.set_parent(loser.id, winner.id).await?;
        if winner.rank == loser.rank {
            tx.set_rank(winner.id, winner.rank + 1).await?;
        }
        tx.commit().await?;

        info!(target: "clusters", %a, %b, root = %winner.id, absorbed = %loser.id, "merged clusters");
        Ok(MergeOutcome::Merged { root: winner.id })
    }

    async fn ensure_known(&self, id: RecordingId) -> ClusterResult<()> {
        if self.recordings.exists(id).await? {
            Ok(())
        } else {
            Err(ClusterError::UnknownId(id))
        }
    }
}

/// Follow parent pointers from `id`. Returns the root and the non-root nodes walked,
/// or `None` when `id` has no node.
async fn walk_to_root(
    tx: &mut dyn ClusterTransaction,
    id: RecordingId,
) -> Result<Option<(ClusterNode, Vec<ClusterNode>)>, StorageError> {
    let Some(mut current) = tx.node(id).await? else {
        return Ok(None);
    };

    let mut path = Vec::new();
    let mut seen = HashSet::from([current.id]);
    while !current.is_root() {
        let parent = current.parent;
        path.push(current);
        if !seen.insert(parent) {
            return Err(StorageError::Corrupt(format!(
                "cluster cycle through {parent}"
            )));
        }
        current = tx.node(parent).await?.ok_or_else(|| {
            StorageError::Corrupt(format!("cluster node points at missing parent {parent}"))
        })?;
    }

    Ok(Some((current, path)))
}

/// Find the root of a node that is known to exist, re-pointing the walked path at it.
async fn find_and_compress(
    tx: &mut dyn ClusterTransaction,
    id: RecordingId,
) -> Result<ClusterNode, StorageError> {
    let (root, path) = walk_to_root(&mut *tx, id)
        .await?
        .ok_or_else(|| StorageError::Corrupt(format!("no cluster node for {id}")))?;

    for node in path.into_iter().filter(|node| node.parent != root.id) {
        tx.set_parent(node.id, root.id).await?;
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_pool, seed_recording};
    use messybrainz_infrastructure::{
        SqliteClusterRepository, SqliteRecordingRepository, StorageResult,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        manager: ClusterManager,
        recordings: Arc<dyn RecordingRepository>,
        clusters: Arc<dyn ClusterRepository>,
    }

    async fn fixture() -> Fixture {
        let pool = memory_pool().await;
        let recordings: Arc<dyn RecordingRepository> =
            Arc::new(SqliteRecordingRepository::new(pool.clone()));
        let clusters: Arc<dyn ClusterRepository> = Arc::new(SqliteClusterRepository::new(pool));
        Fixture {
            manager: ClusterManager::new(recordings.clone(), clusters.clone()),
            recordings,
            clusters,
        }
    }

    async fn seed_many(fixture: &Fixture, count: usize) -> Vec<RecordingId> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            ids.push(seed_recording(fixture.recordings.as_ref(), &format!("track {n}")).await);
        }
        ids
    }

    fn set(ids: &[RecordingId]) -> BTreeSet<RecordingId> {
        ids.iter().copied().collect()
    }

    #[tokio::test]
    async fn unmerged_id_has_no_equivalents() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 1).await;

        let equivalents = fixture.manager.equivalents_of(ids[0]).await.expect("query");
        assert!(equivalents.is_empty());
        assert!(fixture.manager.cluster_of(ids[0]).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn merges_are_transitive() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 3).await;
        let (a, b, c) = (ids[0], ids[1], ids[2]);

        fixture.manager.merge(a, b).await.expect("merge a b");
        fixture.manager.merge(b, c).await.expect("merge b c");

        assert_eq!(fixture.manager.equivalents_of(a).await.expect("a"), set(&[b, c]));
        assert_eq!(fixture.manager.equivalents_of(c).await.expect("c"), set(&[a, b]));
        assert_eq!(fixture.manager.equivalents_of(b).await.expect("b"), set(&[a, c]));
    }

    #[tokio::test]
    async fn merging_twice_is_a_no_op() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 2).await;

        let first = fixture.manager.merge(ids[0], ids[1]).await.expect("first merge");
        let cluster_after_first = fixture.manager.cluster_of(ids[0]).await.expect("cluster");

        let second = fixture.manager.merge(ids[0], ids[1]).await.expect("second merge");
        let reversed = fixture.manager.merge(ids[1], ids[0]).await.expect("reversed merge");
        let cluster_after_second = fixture.manager.cluster_of(ids[0]).await.expect("cluster");

        assert!(matches!(first, MergeOutcome::Merged { .. }));
        assert_eq!(second, MergeOutcome::AlreadyEquivalent { root: first.root() });
        assert_eq!(reversed, MergeOutcome::AlreadyEquivalent { root: first.root() });
        assert_eq!(cluster_after_first, cluster_after_second);
    }

    #[tokio::test]
    async fn merging_two_clusters_unions_every_member() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 6).await;

        fixture.manager.merge(ids[0], ids[1]).await.expect("merge");
        fixture.manager.merge(ids[1], ids[2]).await.expect("merge");
        fixture.manager.merge(ids[3], ids[4]).await.expect("merge");
        fixture.manager.merge(ids[4], ids[5]).await.expect("merge");

        // Link through non-root members of both clusters.
        fixture.manager.merge(ids[2], ids[5]).await.expect("merge clusters");

        let cluster = fixture
            .manager
            .cluster_of(ids[0])
            .await
            .expect("cluster")
            .expect("ids[0] is clustered");
        assert_eq!(cluster.members, set(&ids));
        for id in &ids {
            let others = fixture.manager.equivalents_of(*id).await.expect("equivalents");
            assert_eq!(others.len(), 5);
            assert!(!others.contains(id));
        }
    }

    #[tokio::test]
    async fn merge_with_unknown_id_fails_and_writes_nothing() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 1).await;
        let stranger = RecordingId::new();

        let err = fixture
            .manager
            .merge(ids[0], stranger)
            .await
            .expect_err("unknown id must be rejected");
        assert!(matches!(err, ClusterError::UnknownId(id) if id == stranger));
        assert!(fixture.manager.cluster_of(ids[0]).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn equivalents_of_unknown_id_fails() {
        let fixture = fixture().await;
        let stranger = RecordingId::new();

        let err = fixture
            .manager
            .equivalents_of(stranger)
            .await
            .expect_err("unknown id must be rejected");
        assert!(matches!(err, ClusterError::UnknownId(id) if id == stranger));
    }

    #[tokio::test]
    async fn self_merge_changes_nothing() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 1).await;

        let outcome = fixture.manager.merge(ids[0], ids[0]).await.expect("self merge");
        assert_eq!(outcome, MergeOutcome::AlreadyEquivalent { root: ids[0] });
        assert!(fixture.manager.cluster_of(ids[0]).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn equal_rank_union_elects_the_smaller_id() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 2).await;
        let expected_root = ids[0].min(ids[1]);

        let outcome = fixture.manager.merge(ids[0], ids[1]).await.expect("merge");
        assert_eq!(outcome, MergeOutcome::Merged { root: expected_root });
    }

    #[tokio::test]
    async fn deep_paths_are_compressed_on_merge() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 4).await;
        let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

        // Hand-build a chain d -> c -> b -> a, as an older writer might have left it.
        let mut tx = fixture.clusters.begin_write().await.expect("begin");
        for id in [a, b, c, d] {
            tx.make_set(id).await.expect("make_set");
        }
        tx.set_parent(b, a).await.expect("link");
        tx.set_parent(c, b).await.expect("link");
        tx.set_parent(d, c).await.expect("link");
        tx.set_rank(a, 3).await.expect("rank");
        tx.commit().await.expect("commit");

        assert_eq!(fixture.manager.equivalents_of(d).await.expect("read"), set(&[a, b, c]));

        let outcome = fixture.manager.merge(d, a).await.expect("merge");
        assert_eq!(outcome, MergeOutcome::AlreadyEquivalent { root: a });

        let mut read = fixture.clusters.begin_read().await.expect("begin read");
        let node_d = read.node(d).await.expect("node").expect("d has a node");
        let node_c = read.node(c).await.expect("node").expect("c has a node");
        assert_eq!(node_d.parent, a);
        assert_eq!(node_c.parent, a);
    }

    #[tokio::test]
    async fn cycles_are_reported_as_corruption() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 2).await;

        let mut tx = fixture.clusters.begin_write().await.expect("begin");
        tx.make_set(ids[0]).await.expect("make_set");
        tx.make_set(ids[1]).await.expect("make_set");
        tx.set_parent(ids[0], ids[1]).await.expect("link");
        tx.set_parent(ids[1], ids[0]).await.expect("link");
        tx.commit().await.expect("commit");

        let err = fixture
            .manager
            .equivalents_of(ids[0])
            .await
            .expect_err("cycle must be detected");
        assert!(matches!(err, ClusterError::Storage(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn merge_storage_errors_surface_after_one_attempt() {
        let fixture = fixture().await;
        let ids = seed_many(&fixture, 2).await;
        let failing = Arc::new(FailingWrites {
            writes: AtomicU32::new(0),
        });
        let manager = ClusterManager::new(fixture.recordings.clone(), failing.clone());

        let err = manager.merge(ids[0], ids[1]).await.expect_err("write fails");

        assert!(matches!(err, ClusterError::Storage(StorageError::Conflict { .. })));
        assert_eq!(failing.writes.load(Ordering::SeqCst), 1);
    }

    /// Refuses every transaction with a conflict.
    struct FailingWrites {
        writes: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ClusterRepository for FailingWrites {
        async fn begin_read(&self) -> StorageResult<Box<dyn ClusterTransaction>> {
            Err(StorageError::Corrupt("reads are not expected".to_string()))
        }

        async fn begin_write(&self) -> StorageResult<Box<dyn ClusterTransaction>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Conflict {
                entity: "cluster",
                key: "generation".to_string(),
            })
        }
    }
}
