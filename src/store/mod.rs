use std::ops::Deref;

use async_trait::async_trait;

use crate::envelope::Polymorphic;
use crate::error::Error;
use crate::query::{LeaseDataQuery, MessageDataQuery, SourceDataQuery, TagDataQuery};
use crate::source::{AnnotatedMessageData, AnnotatedSourceData, Lease, Source, Tag};
use crate::types::Id;

#[cfg(feature = "memory")]
pub mod memory;

/// A SourceStore is responsible for atomically committing sources into a backend, and reading back
/// what has been committed through the query algebra.
///
/// Every read is ordered by the query sort, filtered by the query filter and paginated by the query
/// skip and take, in this order. Reads returning ids return each id once, and paginate over the
/// distinct ids.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Commits every message of the source, or none.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if:
    /// - the session is read-only ([`Error::ReadOnly`]), before reaching the backend;
    /// - any message would commit an entity at version zero ([`Error::ReservedVersion`]);
    /// - any entity version is already committed, two messages of the source claim the same entity
    ///   version, a lease is already held or the source id is already committed ([`Error::Conflict`]);
    /// - a payload cannot be serialized, or the backend fails.
    async fn commit<D, A>(&self, source: &Source<D, A>) -> Result<(), Error>
    where
        D: Polymorphic,
        A: Polymorphic;

    async fn get_source_ids_by_source_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: SourceDataQuery + Sync;

    async fn get_source_ids_by_message_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: MessageDataQuery + Sync;

    async fn get_source_ids_by_lease_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: LeaseDataQuery + Sync;

    async fn get_source_ids_by_tag_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: TagDataQuery + Sync;

    async fn get_entity_ids_by_source_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: SourceDataQuery + Sync;

    async fn get_entity_ids_by_message_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: MessageDataQuery + Sync;

    async fn get_entity_ids_by_lease_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: LeaseDataQuery + Sync;

    async fn get_entity_ids_by_tag_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: TagDataQuery + Sync;

    async fn get_agent_signatures<A, Q>(&self, query: &Q) -> Result<Vec<A>, Error>
    where
        A: Polymorphic,
        Q: SourceDataQuery + Sync;

    async fn get_deltas<D, Q>(&self, query: &Q) -> Result<Vec<D>, Error>
    where
        D: Polymorphic,
        Q: MessageDataQuery + Sync;

    async fn get_leases<Q>(&self, query: &Q) -> Result<Vec<Lease>, Error>
    where
        Q: LeaseDataQuery + Sync;

    async fn get_tags<Q>(&self, query: &Q) -> Result<Vec<Tag>, Error>
    where
        Q: TagDataQuery + Sync;

    async fn get_annotated_agent_signatures<A, Q>(&self, query: &Q) -> Result<Vec<AnnotatedSourceData<A>>, Error>
    where
        A: Polymorphic,
        Q: SourceDataQuery + Sync;

    async fn get_annotated_deltas<D, Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<D>>, Error>
    where
        D: Polymorphic,
        Q: MessageDataQuery + Sync;

    async fn get_annotated_leases<Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<Lease>>, Error>
    where
        Q: LeaseDataQuery + Sync;

    async fn get_annotated_tags<Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<Tag>>, Error>
    where
        Q: TagDataQuery + Sync;
}

/// Blanket implementation making a [`SourceStore`] every (smart) pointer to a [`SourceStore`],
/// e.g. `&Store`, `Box<Store>`, `Arc<Store>`.
#[async_trait]
impl<S, T> SourceStore for T
where
    S: SourceStore,
    T: Deref<Target = S> + Send + Sync,
{
    async fn commit<D, A>(&self, source: &Source<D, A>) -> Result<(), Error>
    where
        D: Polymorphic,
        A: Polymorphic,
    {
        self.deref().commit(source).await
    }

    async fn get_source_ids_by_source_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: SourceDataQuery + Sync,
    {
        self.deref().get_source_ids_by_source_data(query).await
    }

    async fn get_source_ids_by_message_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: MessageDataQuery + Sync,
    {
        self.deref().get_source_ids_by_message_data(query).await
    }

    async fn get_source_ids_by_lease_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        self.deref().get_source_ids_by_lease_data(query).await
    }

    async fn get_source_ids_by_tag_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        self.deref().get_source_ids_by_tag_data(query).await
    }

    async fn get_entity_ids_by_source_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: SourceDataQuery + Sync,
    {
        self.deref().get_entity_ids_by_source_data(query).await
    }

    async fn get_entity_ids_by_message_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: MessageDataQuery + Sync,
    {
        self.deref().get_entity_ids_by_message_data(query).await
    }

    async fn get_entity_ids_by_lease_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        self.deref().get_entity_ids_by_lease_data(query).await
    }

    async fn get_entity_ids_by_tag_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        self.deref().get_entity_ids_by_tag_data(query).await
    }

    async fn get_agent_signatures<A, Q>(&self, query: &Q) -> Result<Vec<A>, Error>
    where
        A: Polymorphic,
        Q: SourceDataQuery + Sync,
    {
        self.deref().get_agent_signatures(query).await
    }

    async fn get_deltas<D, Q>(&self, query: &Q) -> Result<Vec<D>, Error>
    where
        D: Polymorphic,
        Q: MessageDataQuery + Sync,
    {
        self.deref().get_deltas(query).await
    }

    async fn get_leases<Q>(&self, query: &Q) -> Result<Vec<Lease>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        self.deref().get_leases(query).await
    }

    async fn get_tags<Q>(&self, query: &Q) -> Result<Vec<Tag>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        self.deref().get_tags(query).await
    }

    async fn get_annotated_agent_signatures<A, Q>(&self, query: &Q) -> Result<Vec<AnnotatedSourceData<A>>, Error>
    where
        A: Polymorphic,
        Q: SourceDataQuery + Sync,
    {
        self.deref().get_annotated_agent_signatures(query).await
    }

    async fn get_annotated_deltas<D, Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<D>>, Error>
    where
        D: Polymorphic,
        Q: MessageDataQuery + Sync,
    {
        self.deref().get_annotated_deltas(query).await
    }

    async fn get_annotated_leases<Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<Lease>>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        self.deref().get_annotated_leases(query).await
    }

    async fn get_annotated_tags<Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<Tag>>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        self.deref().get_annotated_tags(query).await
    }
}

/// A SnapshotStore persists the latest worthwhile state of entities, used as a shortcut for replaying
/// their whole history.
#[async_trait]
pub trait SnapshotStore<S>: Send + Sync
where
    S: Send + Sync,
{
    /// Stores the snapshot, unless the stored one should not be replaced by it. Returns whether the
    /// snapshot has been stored.
    async fn put_snapshot(&self, snapshot_id: Id, snapshot: &S) -> Result<bool, Error>;

    async fn get_snapshot(&self, snapshot_id: Id) -> Result<Option<S>, Error>;

    /// Returns whether every snapshot has been deleted. Missing snapshots count as deleted.
    async fn delete_snapshots(&self, snapshot_ids: &[Id]) -> Result<bool, Error>;
}
