use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::entity::Snapshot;
use crate::envelope::EnvelopeService;
use crate::error::Error;
use crate::session::SessionOptions;
use crate::store::SnapshotStore;
use crate::types::Id;

/// In-memory [`SnapshotStore`], keeping snapshots in their serialized wire form.
pub struct MemorySnapshotStore<S> {
    inner: Arc<InnerMemorySnapshotStore>,
    options: SessionOptions,
    _snapshot: PhantomData<fn() -> S>,
}

struct InnerMemorySnapshotStore {
    envelopes: Arc<EnvelopeService>,
    snapshots: RwLock<HashMap<Id, Vec<u8>>>,
}

impl<S> MemorySnapshotStore<S> {
    pub fn new(envelopes: Arc<EnvelopeService>) -> Self {
        Self {
            inner: Arc::new(InnerMemorySnapshotStore {
                envelopes,
                snapshots: RwLock::new(HashMap::new()),
            }),
            options: SessionOptions::default(),
            _snapshot: PhantomData,
        }
    }

    /// Opens a new session on the same snapshots.
    pub fn session(&self, options: SessionOptions) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            options,
            _snapshot: PhantomData,
        }
    }
}

#[async_trait]
impl<S> SnapshotStore<S> for MemorySnapshotStore<S>
where
    S: Snapshot,
{
    #[tracing::instrument(skip_all, fields(snapshot_id = %snapshot_id, session = self.options.log_label()), err)]
    async fn put_snapshot(&self, snapshot_id: Id, snapshot: &S) -> Result<bool, Error> {
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }

        let bytes = self.inner.envelopes.deconstruct_and_serialize(snapshot)?;
        let mut snapshots = self.inner.snapshots.write().await;

        if let Some(previous) = snapshots.get(&snapshot_id) {
            let previous: S = self.inner.envelopes.deserialize_and_reconstruct(previous)?;

            if !snapshot.should_replace(&previous) {
                tracing::debug!({ version = %snapshot.version() }, "stored snapshot is kept");
                return Ok(false);
            }
        }

        let _ = snapshots.insert(snapshot_id, bytes);

        Ok(true)
    }

    async fn get_snapshot(&self, snapshot_id: Id) -> Result<Option<S>, Error> {
        let snapshots = self.inner.snapshots.read().await;

        snapshots
            .get(&snapshot_id)
            .map(|bytes| self.inner.envelopes.deserialize_and_reconstruct(bytes))
            .transpose()
    }

    #[tracing::instrument(skip_all, fields(session = self.options.log_label()), err)]
    async fn delete_snapshots(&self, snapshot_ids: &[Id]) -> Result<bool, Error> {
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }

        let mut snapshots = self.inner.snapshots.write().await;

        for snapshot_id in snapshot_ids {
            let _ = snapshots.remove(snapshot_id);
        }

        Ok(true)
    }
}

impl<S> Clone for MemorySnapshotStore<S> {
    fn clone(&self) -> Self {
        self.session(self.options.clone())
    }
}

impl<S> std::fmt::Debug for MemorySnapshotStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySnapshotStore")
            .field("options", &self.options)
            .finish()
    }
}
