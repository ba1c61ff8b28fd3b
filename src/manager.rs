use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use builder::RepositoryBuilder;

use crate::agent::AgentAccessor;
use crate::builder::TransactionBuilder;
use crate::entity::Snapshot;
use crate::error::Error;
use crate::query::standard::GetDeltasQuery;
use crate::source::{Lease, Source, Tag};
use crate::store::{SnapshotStore, SourceStore};
use crate::types::{Id, Pointer, VersionNumber};

mod builder;

/// The MultipleEntityRepository is responsible for coupling entities of one type with a
/// [`SourceStore`], so that the deltas appended to them are committed as one source, and their state
/// can be reconstructed by replaying committed deltas, optionally on top of a snapshot.
///
/// The basic APIs are:
/// 1. create / try_load
/// 2. append
/// 3. commit
/// 4. get_current / get_at_version
///
/// A repository is a single session: it is not meant to be shared between tasks. Open one repository
/// per unit of work on a shared, cloneable store.
pub struct MultipleEntityRepository<E, R, G>
where
    E: Snapshot,
{
    source_store: R,
    agent_accessor: G,
    snapshot_store: Option<Arc<dyn SnapshotStore<E>>>,
    builder: TransactionBuilder<E>,
    baselines: HashMap<Id, E>,
    snapshot_writes: Vec<JoinHandle<()>>,
}

impl<E, R, G> MultipleEntityRepository<E, R, G>
where
    E: Snapshot,
    R: SourceStore,
    G: AgentAccessor,
{
    /// Constructs a new entity in this session, without recording anything.
    ///
    /// # Errors
    ///
    /// Will return [`Error::ExistingEntity`] if the entity is already known.
    pub fn create(&mut self, entity_id: Id) -> Result<(), Error> {
        let _ = self.builder.load(entity_id, E::construct(entity_id))?;
        Ok(())
    }

    /// Makes the entity known at the state the pointer asks for. A pointer at version zero asks for the
    /// latest state.
    ///
    /// Returns `false` if the entity is already known at a newer version than requested, if the
    /// committed deltas do not reach the requested version, or if nothing was ever committed for it.
    pub async fn try_load(&mut self, pointer: Pointer, cancel: &CancellationToken) -> Result<bool, Error> {
        let up_to = (!pointer.version.is_zero()).then_some(pointer.version);

        let entity = match self.builder.get(pointer.id).cloned() {
            Some(known) => {
                let known_pointer = known.pointer();

                if pointer.is_satisfied_by(&known_pointer) {
                    return Ok(true);
                }

                if pointer.version < known_pointer.version {
                    return Ok(false);
                }

                known
            }
            None => cancellable(cancel, self.starting_point(pointer.id, up_to)).await?,
        };

        let entity = cancellable(cancel, self.replay(entity, up_to)).await?;

        // Version zero is an entity that was never committed, not a loadable state.
        if entity.version().is_zero() || !pointer.is_satisfied_by(&entity.pointer()) {
            return Ok(false);
        }

        let _ = self.baselines.insert(pointer.id, entity.clone());
        self.builder.put_known(entity);

        Ok(true)
    }

    /// # Errors
    ///
    /// Will return [`Error::UnknownEntity`] if the entity has not been created or loaded.
    pub fn get(&self, entity_id: Id) -> Result<&E, Error> {
        self.builder.get(entity_id).ok_or(Error::UnknownEntity(entity_id))
    }

    /// # Errors
    ///
    /// Will return [`Error::UnknownEntity`] if the entity has not been created or loaded.
    pub fn append(&mut self, entity_id: Id, delta: impl Into<E::Delta>) -> Result<(), Error> {
        let _ = self.builder.append(entity_id, delta.into())?;
        Ok(())
    }

    pub fn add_lease(&mut self, entity_id: Id, lease: Lease) -> Result<(), Error> {
        let _ = self.builder.add_lease(entity_id, lease)?;
        Ok(())
    }

    pub fn delete_lease(&mut self, entity_id: Id, lease: Lease) -> Result<(), Error> {
        let _ = self.builder.delete_lease(entity_id, lease)?;
        Ok(())
    }

    pub fn add_tag(&mut self, entity_id: Id, tag: Tag) -> Result<(), Error> {
        let _ = self.builder.add_tag(entity_id, tag)?;
        Ok(())
    }

    pub fn delete_tag(&mut self, entity_id: Id, tag: Tag) -> Result<(), Error> {
        let _ = self.builder.delete_tag(entity_id, tag)?;
        Ok(())
    }

    /// Commits every pending message as one source, signed by the current agent.
    ///
    /// Returns `false` when the store rejects the source, e.g. on a concurrency conflict: the caller should
    /// then reload the involved entities and retry. Pending messages are kept on any failure.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if a payload cannot be serialized or resolved, or if the commit is cancelled.
    #[allow(clippy::blocks_in_conditions)]
    #[tracing::instrument(skip_all, err)]
    pub async fn commit(&mut self, cancel: &CancellationToken) -> Result<bool, Error> {
        if !self.builder.has_pending() {
            return Ok(true);
        }

        let agent = cancellable(cancel, self.agent_accessor.agent()).await?;

        let source = Source {
            id: Id::new(),
            time_stamp: agent.time_stamp,
            agent_signature: agent.signature,
            messages: self.builder.take_messages(),
        };

        let committed = cancellable(cancel, self.source_store.commit(&source)).await;

        if let Err(error) = committed {
            let source_id = source.id;
            self.builder.restore_messages(source.messages);

            return if error.is_rejection() {
                tracing::warn!({ source_id = %source_id, error = %error }, "source rejected");
                Ok(false)
            } else {
                Err(error)
            };
        }

        let mut seen = HashSet::new();

        for pointer in source.entity_pointers() {
            if !seen.insert(pointer.id) {
                continue;
            }

            if let Some(next) = self.builder.get(pointer.id).cloned() {
                self.put_snapshot_if_needed(&next);
                let _ = self.baselines.insert(pointer.id, next);
            }
        }

        tracing::debug!({ source_id = %source.id, messages = source.messages.len() }, "source committed");

        Ok(true)
    }

    /// Replays the latest committed state of the entity.
    ///
    /// # Errors
    ///
    /// Will return [`Error::NotConstructed`] if nothing has ever been committed for the entity.
    pub async fn get_current(&self, entity_id: Id, cancel: &CancellationToken) -> Result<E, Error> {
        cancellable(cancel, self.reconstruct(entity_id, None)).await
    }

    /// Replays the committed state of the entity up to the given version. A snapshot newer than the
    /// version is not used.
    ///
    /// # Errors
    ///
    /// Will return [`Error::NotConstructed`] if nothing has ever been committed for the entity.
    pub async fn get_at_version(
        &self,
        entity_id: Id,
        version: VersionNumber,
        cancel: &CancellationToken,
    ) -> Result<E, Error> {
        cancellable(cancel, self.reconstruct(entity_id, Some(version))).await
    }

    /// Waits for every snapshot write spawned by previous commits.
    pub async fn flush_snapshots(&mut self) {
        let snapshot_writes = std::mem::take(&mut self.snapshot_writes);

        for result in futures::future::join_all(snapshot_writes).await {
            if let Err(error) = result {
                tracing::error!({ error = ?error }, "snapshot write task failed");
            }
        }
    }

    /// The number of spawned snapshot writes still held by this session. Finished writes are dropped on the
    /// next commit that spawns one.
    pub fn pending_snapshot_writes(&self) -> usize {
        self.snapshot_writes.len()
    }

    /// Returns the internal source store
    pub fn source_store(&self) -> &R {
        &self.source_store
    }

    /// Returns the internal snapshot store, if any
    pub fn snapshot_store(&self) -> Option<&Arc<dyn SnapshotStore<E>>> {
        self.snapshot_store.as_ref()
    }

    fn put_snapshot_if_needed(&mut self, next: &E) {
        let Some(snapshot_store) = &self.snapshot_store else {
            return;
        };

        if !E::should_put_snapshot(self.baselines.get(&next.entity_id()), next) {
            return;
        }

        let snapshot_store = Arc::clone(snapshot_store);
        let snapshot = next.clone();

        self.snapshot_writes.retain(|handle| !handle.is_finished());

        self.snapshot_writes.push(tokio::spawn(async move {
            let entity_id = snapshot.entity_id();

            match snapshot_store.put_snapshot(entity_id, &snapshot).await {
                Ok(stored) => {
                    tracing::debug!({ entity_id = %entity_id, version = %snapshot.version(), stored = stored }, "snapshot written")
                }
                Err(error) => {
                    tracing::error!({ entity_id = %entity_id, error = ?error }, "failed to put snapshot")
                }
            }
        }));
    }

    async fn reconstruct(&self, entity_id: Id, up_to: Option<VersionNumber>) -> Result<E, Error> {
        let entity = self.starting_point(entity_id, up_to).await?;
        let entity = self.replay(entity, up_to).await?;

        if entity.version().is_zero() {
            return Err(Error::NotConstructed(entity_id));
        }

        Ok(entity)
    }

    /// The stored snapshot, unless it is newer than `up_to`, or else a constructed entity.
    async fn starting_point(&self, entity_id: Id, up_to: Option<VersionNumber>) -> Result<E, Error> {
        let snapshot = match &self.snapshot_store {
            Some(snapshot_store) => snapshot_store.get_snapshot(entity_id).await?,
            None => None,
        };

        Ok(snapshot
            .filter(|snapshot| up_to.map_or(true, |version| snapshot.version() <= version))
            .unwrap_or_else(|| E::construct(entity_id)))
    }

    async fn replay(&self, entity: E, up_to: Option<VersionNumber>) -> Result<E, Error> {
        let query = GetDeltasQuery {
            entity_id: entity.entity_id(),
            after: entity.version(),
            up_to,
        };

        let deltas: Vec<E::Delta> = self.source_store.get_deltas(&query).await?;

        Ok(deltas.iter().fold(entity, |entity, delta| entity.reduce(delta)))
    }
}

impl<E, R, G> std::fmt::Debug for MultipleEntityRepository<E, R, G>
where
    E: Snapshot,
    R: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipleEntityRepository")
            .field("source_store", &self.source_store)
            .field("builder", &self.builder)
            .finish()
    }
}

/// Races the future against the token. Cancellation always wins a tie.
async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}
