//! In-process reference implementation of the store ports.
//!
//! Nothing is persisted: every [`MemoryStore`] cloned from the same instance, or opened as a session of
//! it, shares the same data until the last one is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::envelope::{Envelope, EnvelopeService, Polymorphic};
use crate::error::{Conflict, Error};
use crate::query::{LeaseDataQuery, MessageDataQuery, SourceDataQuery, TagDataQuery};
use crate::session::SessionOptions;
use crate::source::{AnnotatedMessageData, AnnotatedSourceData, Lease, Source, Tag};
use crate::store::SourceStore;
use crate::types::{Id, VersionNumber};

pub use query::*;
pub use record::*;
pub use snapshot::*;

mod query;
mod record;
mod snapshot;

/// In-memory [`SourceStore`].
///
/// The store is protected by an [`Arc`] that allows it to be cloneable still having the same memory
/// reference.
pub struct MemoryStore {
    inner: Arc<InnerMemoryStore>,
    options: SessionOptions,
}

struct InnerMemoryStore {
    envelopes: Arc<EnvelopeService>,
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_sequence: u64,
    sources: Vec<SourceRecord>,
    messages: Vec<MessageRecord>,
    leases: Vec<LeaseRecord>,
    tags: Vec<TagRecord>,
    source_ids: HashSet<Id>,
    entity_versions: HashSet<(Id, VersionNumber)>,
}

impl MemoryState {
    fn sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

/// A message with its payload already in an envelope, ready to be checked and written.
struct SealedMessage<'a> {
    message_id: Id,
    entity_id: Id,
    expected_previous_version: VersionNumber,
    delta: Envelope,
    add_leases: &'a [Lease],
    delete_leases: &'a [Lease],
    add_tags: &'a [Tag],
    delete_tags: &'a [Tag],
}

impl MemoryStore {
    /// Creates a new, empty, store resolving payload types through the given [`EnvelopeService`].
    pub fn new(envelopes: EnvelopeService) -> Self {
        Self {
            inner: Arc::new(InnerMemoryStore {
                envelopes: Arc::new(envelopes),
                state: RwLock::new(MemoryState::default()),
            }),
            options: SessionOptions::default(),
        }
    }

    /// Opens a new session on the same data.
    pub fn session(&self, options: SessionOptions) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn envelopes(&self) -> &Arc<EnvelopeService> {
        &self.inner.envelopes
    }

    /// Creates a [`MemorySnapshotStore`] sharing this store's [`EnvelopeService`] and session options.
    pub fn snapshot_store<S>(&self) -> MemorySnapshotStore<S> {
        MemorySnapshotStore::new(Arc::clone(&self.inner.envelopes)).session(self.options.clone())
    }

    fn filter_builder<R>(&self) -> MemoryFilterBuilder<R> {
        MemoryFilterBuilder::new(Arc::clone(&self.inner.envelopes))
    }

    fn seal<'a, D, A>(&self, source: &'a Source<D, A>) -> Result<(Envelope, Vec<SealedMessage<'a>>), Error>
    where
        D: Polymorphic,
        A: Polymorphic,
    {
        let agent_signature = self.inner.envelopes.deconstruct(&source.agent_signature)?;

        let messages = source
            .messages
            .iter()
            .map(|message| -> Result<SealedMessage<'a>, Error> {
                Ok(SealedMessage {
                    message_id: message.id,
                    entity_id: message.entity_id,
                    expected_previous_version: message.expected_previous_version,
                    delta: self.inner.envelopes.deconstruct(&message.delta)?,
                    add_leases: &message.add_leases,
                    delete_leases: &message.delete_leases,
                    add_tags: &message.add_tags,
                    delete_tags: &message.delete_tags,
                })
            })
            .collect::<Result<Vec<SealedMessage<'a>>, Error>>()?;

        Ok((agent_signature, messages))
    }

    async fn messages<Q>(&self, query: &Q) -> Vec<MessageRecord>
    where
        Q: MessageDataQuery + Sync,
    {
        let filter = query.message_data_filter(&self.filter_builder());
        let sort = query.message_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;

        paginate(select(&state.messages, &filter, sort).into_iter().cloned(), query)
    }

    async fn sources<Q>(&self, query: &Q) -> Vec<SourceRecord>
    where
        Q: SourceDataQuery + Sync,
    {
        let filter = query.source_data_filter(&self.filter_builder());
        let sort = query.source_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;

        paginate(select(&state.sources, &filter, sort).into_iter().cloned(), query)
    }

    async fn leases<Q>(&self, query: &Q) -> Vec<LeaseRecord>
    where
        Q: LeaseDataQuery + Sync,
    {
        let filter = query.lease_data_filter(&self.filter_builder());
        let sort = query.lease_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;

        paginate(select(&state.leases, &filter, sort).into_iter().cloned(), query)
    }

    async fn tags<Q>(&self, query: &Q) -> Vec<TagRecord>
    where
        Q: TagDataQuery + Sync,
    {
        let filter = query.tag_data_filter(&self.filter_builder());
        let sort = query.tag_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;

        paginate(select(&state.tags, &filter, sort).into_iter().cloned(), query)
    }
}

/// Checks every commit constraint against the current state, without touching it.
fn check(state: &MemoryState, source_id: Id, messages: &[SealedMessage<'_>]) -> Result<(), Error> {
    if state.source_ids.contains(&source_id) {
        return Err(Conflict::Source(source_id).into());
    }

    let mut claimed: HashSet<(Id, VersionNumber)> = HashSet::new();
    let mut held: HashMap<&Lease, Id> = state
        .leases
        .iter()
        .map(|record| (&record.lease, record.entity_id))
        .collect();

    for message in messages {
        let entity_version = message.expected_previous_version.next();

        if entity_version.is_zero() {
            return Err(Error::ReservedVersion {
                entity_id: message.entity_id,
            });
        }

        if !claimed.insert((message.entity_id, message.expected_previous_version)) {
            return Err(Conflict::DuplicateInBatch {
                entity_id: message.entity_id,
                expected_previous_version: message.expected_previous_version,
            }
            .into());
        }

        if state.entity_versions.contains(&(message.entity_id, entity_version)) {
            return Err(Conflict::Version {
                entity_id: message.entity_id,
                version: entity_version,
            }
            .into());
        }

        for lease in message.delete_leases {
            if held.get(lease) == Some(&message.entity_id) {
                let _ = held.remove(lease);
            }
        }

        for lease in message.add_leases {
            if held.insert(lease, message.entity_id).is_some() {
                return Err(Conflict::Lease(lease.clone()).into());
            }
        }
    }

    Ok(())
}

#[async_trait]
impl SourceStore for MemoryStore {
    // Note: https://github.com/rust-lang/rust-clippy/issues/12281
    #[allow(clippy::blocks_in_conditions)]
    #[tracing::instrument(skip_all, fields(source_id = %source.id, session = self.options.log_label()), err)]
    async fn commit<D, A>(&self, source: &Source<D, A>) -> Result<(), Error>
    where
        D: Polymorphic,
        A: Polymorphic,
    {
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }

        let (agent_signature, messages) = self.seal(source)?;

        // Checks and writes happen under the same guard, without suspension points in between: a commit
        // is either entirely visible or not at all.
        let mut state = self.inner.state.write().await;

        check(&state, source.id, &messages)?;

        let sequence = state.sequence();
        state.sources.push(SourceRecord {
            sequence,
            source_id: source.id,
            source_time_stamp: source.time_stamp,
            agent_signature,
            entity_pointers: source.entity_pointers(),
        });
        let _ = state.source_ids.insert(source.id);

        for message in messages {
            let entity_version = message.expected_previous_version.next();

            state.leases.retain(|record| {
                record.entity_id != message.entity_id || !message.delete_leases.contains(&record.lease)
            });

            for lease in message.add_leases {
                let sequence = state.sequence();
                state.leases.push(LeaseRecord {
                    sequence,
                    source_id: source.id,
                    source_time_stamp: source.time_stamp,
                    message_id: message.message_id,
                    entity_id: message.entity_id,
                    entity_version,
                    lease: lease.clone(),
                });
            }

            state.tags.retain(|record| {
                record.entity_id != message.entity_id || !message.delete_tags.contains(&record.tag)
            });

            for tag in message.add_tags {
                let sequence = state.sequence();
                state.tags.push(TagRecord {
                    sequence,
                    source_id: source.id,
                    source_time_stamp: source.time_stamp,
                    message_id: message.message_id,
                    entity_id: message.entity_id,
                    entity_version,
                    tag: tag.clone(),
                });
            }

            let sequence = state.sequence();
            state.messages.push(MessageRecord {
                sequence,
                source_id: source.id,
                source_time_stamp: source.time_stamp,
                message_id: message.message_id,
                entity_id: message.entity_id,
                entity_version,
                delta: message.delta,
            });
            let _ = state.entity_versions.insert((message.entity_id, entity_version));
        }

        tracing::debug!({ messages = source.messages.len() }, "source committed");

        Ok(())
    }

    async fn get_source_ids_by_source_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: SourceDataQuery + Sync,
    {
        let filter = query.source_data_filter(&self.filter_builder());
        let sort = query.source_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.sources, &filter, sort).into_iter().map(|record| record.source_id);

        Ok(paginate(distinct(ids), query))
    }

    async fn get_source_ids_by_message_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: MessageDataQuery + Sync,
    {
        let filter = query.message_data_filter(&self.filter_builder());
        let sort = query.message_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.messages, &filter, sort).into_iter().map(|record| record.source_id);

        Ok(paginate(distinct(ids), query))
    }

    async fn get_source_ids_by_lease_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        let filter = query.lease_data_filter(&self.filter_builder());
        let sort = query.lease_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.leases, &filter, sort).into_iter().map(|record| record.source_id);

        Ok(paginate(distinct(ids), query))
    }

    async fn get_source_ids_by_tag_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        let filter = query.tag_data_filter(&self.filter_builder());
        let sort = query.tag_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.tags, &filter, sort).into_iter().map(|record| record.source_id);

        Ok(paginate(distinct(ids), query))
    }

    async fn get_entity_ids_by_source_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: SourceDataQuery + Sync,
    {
        let filter = query.source_data_filter(&self.filter_builder());
        let sort = query.source_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.sources, &filter, sort).into_iter().flat_map(|record| record.entity_ids());

        Ok(paginate(distinct(ids), query))
    }

    async fn get_entity_ids_by_message_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: MessageDataQuery + Sync,
    {
        let filter = query.message_data_filter(&self.filter_builder());
        let sort = query.message_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.messages, &filter, sort).into_iter().map(|record| record.entity_id);

        Ok(paginate(distinct(ids), query))
    }

    async fn get_entity_ids_by_lease_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        let filter = query.lease_data_filter(&self.filter_builder());
        let sort = query.lease_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.leases, &filter, sort).into_iter().map(|record| record.entity_id);

        Ok(paginate(distinct(ids), query))
    }

    async fn get_entity_ids_by_tag_data<Q>(&self, query: &Q) -> Result<Vec<Id>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        let filter = query.tag_data_filter(&self.filter_builder());
        let sort = query.tag_data_sort(&MemorySortBuilder::new());
        let state = self.inner.state.read().await;
        let ids = select(&state.tags, &filter, sort).into_iter().map(|record| record.entity_id);

        Ok(paginate(distinct(ids), query))
    }

    async fn get_agent_signatures<A, Q>(&self, query: &Q) -> Result<Vec<A>, Error>
    where
        A: Polymorphic,
        Q: SourceDataQuery + Sync,
    {
        self.sources(query)
            .await
            .iter()
            .map(|record| self.inner.envelopes.reconstruct(&record.agent_signature))
            .collect()
    }

    async fn get_deltas<D, Q>(&self, query: &Q) -> Result<Vec<D>, Error>
    where
        D: Polymorphic,
        Q: MessageDataQuery + Sync,
    {
        self.messages(query)
            .await
            .iter()
            .map(|record| self.inner.envelopes.reconstruct(&record.delta))
            .collect()
    }

    async fn get_leases<Q>(&self, query: &Q) -> Result<Vec<Lease>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        Ok(self.leases(query).await.into_iter().map(|record| record.lease).collect())
    }

    async fn get_tags<Q>(&self, query: &Q) -> Result<Vec<Tag>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        Ok(self.tags(query).await.into_iter().map(|record| record.tag).collect())
    }

    async fn get_annotated_agent_signatures<A, Q>(&self, query: &Q) -> Result<Vec<AnnotatedSourceData<A>>, Error>
    where
        A: Polymorphic,
        Q: SourceDataQuery + Sync,
    {
        self.sources(query)
            .await
            .into_iter()
            .map(|record| -> Result<AnnotatedSourceData<A>, Error> {
                Ok(AnnotatedSourceData {
                    data: self.inner.envelopes.reconstruct(&record.agent_signature)?,
                    source_id: record.source_id,
                    source_time_stamp: record.source_time_stamp,
                    entity_pointers: record.entity_pointers,
                })
            })
            .collect()
    }

    async fn get_annotated_deltas<D, Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<D>>, Error>
    where
        D: Polymorphic,
        Q: MessageDataQuery + Sync,
    {
        self.messages(query)
            .await
            .into_iter()
            .map(|record| -> Result<AnnotatedMessageData<D>, Error> {
                Ok(AnnotatedMessageData {
                    data: self.inner.envelopes.reconstruct(&record.delta)?,
                    source_id: record.source_id,
                    source_time_stamp: record.source_time_stamp,
                    message_id: record.message_id,
                    entity_id: record.entity_id,
                    entity_version: record.entity_version,
                })
            })
            .collect()
    }

    async fn get_annotated_leases<Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<Lease>>, Error>
    where
        Q: LeaseDataQuery + Sync,
    {
        Ok(self
            .leases(query)
            .await
            .into_iter()
            .map(|record| AnnotatedMessageData {
                source_id: record.source_id,
                source_time_stamp: record.source_time_stamp,
                message_id: record.message_id,
                entity_id: record.entity_id,
                entity_version: record.entity_version,
                data: record.lease,
            })
            .collect())
    }

    async fn get_annotated_tags<Q>(&self, query: &Q) -> Result<Vec<AnnotatedMessageData<Tag>>, Error>
    where
        Q: TagDataQuery + Sync,
    {
        Ok(self
            .tags(query)
            .await
            .into_iter()
            .map(|record| AnnotatedMessageData {
                source_id: record.source_id,
                source_time_stamp: record.source_time_stamp,
                message_id: record.message_id,
                entity_id: record.entity_id,
                entity_version: record.entity_version,
                data: record.tag,
            })
            .collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(EnvelopeService::default())
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            options: self.options.clone(),
        }
    }
}

/// Debug implementation for [`MemoryStore`]. It just shows the session options.
impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("options", &self.options).finish()
    }
}
