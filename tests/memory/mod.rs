use std::io::Write;
use std::sync::{Arc, Mutex};

use deltadb::agent::StaticAgentAccessor;
use deltadb::store::memory::{MemorySnapshotStore, MemoryStore};
use deltadb::{MultipleEntityRepository, RepositoryBuilder};

use crate::entity::{TestAgent, TestEntity};

mod repository;
mod store;

pub type TestRepository = MultipleEntityRepository<TestEntity, MemoryStore, StaticAgentAccessor<TestAgent>>;

pub fn repository(store: &MemoryStore) -> TestRepository {
    RepositoryBuilder::new(StaticAgentAccessor::new(TestAgent::user("tester")), store.clone()).build()
}

pub fn repository_with_snapshots(store: &MemoryStore, snapshots: &MemorySnapshotStore<TestEntity>) -> TestRepository {
    RepositoryBuilder::new(StaticAgentAccessor::new(TestAgent::user("tester")), store.clone())
        .with_snapshot_store(snapshots.clone())
        .build()
}

/// Collects everything written by a `tracing-subscriber` fmt layer.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let buffer = self.clone();

        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || buffer.clone())
            .finish()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
