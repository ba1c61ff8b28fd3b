use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::AgentAccessor;
use crate::builder::TransactionBuilder;
use crate::entity::Snapshot;
use crate::store::{SnapshotStore, SourceStore};

use super::MultipleEntityRepository;

/// Struct used to build a brand new [`MultipleEntityRepository`].
pub struct RepositoryBuilder<E, R, G>
where
    E: Snapshot,
{
    source_store: R,
    agent_accessor: G,
    snapshot_store: Option<Arc<dyn SnapshotStore<E>>>,
}

impl<E, R, G> RepositoryBuilder<E, R, G>
where
    E: Snapshot,
    R: SourceStore,
    G: AgentAccessor,
{
    /// Creates a new instance of a [`RepositoryBuilder`].
    pub fn new(agent_accessor: G, source_store: R) -> Self {
        Self {
            source_store,
            agent_accessor,
            snapshot_store: None,
        }
    }

    /// Set the snapshot store. Without one, entities are always replayed from their first delta and
    /// nothing is snapshotted on commit.
    pub fn with_snapshot_store(mut self, snapshot_store: impl SnapshotStore<E> + 'static) -> Self {
        self.snapshot_store = Some(Arc::new(snapshot_store));
        self
    }

    /// Set a snapshot store shared with other repositories.
    pub fn with_shared_snapshot_store(mut self, snapshot_store: Arc<dyn SnapshotStore<E>>) -> Self {
        self.snapshot_store = Some(snapshot_store);
        self
    }

    /// Returns a repository with an empty session.
    pub fn build(self) -> MultipleEntityRepository<E, R, G> {
        MultipleEntityRepository {
            source_store: self.source_store,
            agent_accessor: self.agent_accessor,
            snapshot_store: self.snapshot_store,
            builder: TransactionBuilder::new(),
            baselines: HashMap::new(),
            snapshot_writes: vec![],
        }
    }
}
