use std::sync::Arc;
use std::time::Duration;

use deltadb::agent::StaticAgentAccessor;
use deltadb::query::standard::EntityIdQuery;
use deltadb::store::memory::{MemorySnapshotStore, MemoryStore};
use deltadb::store::{SnapshotStore, SourceStore};
use deltadb::{Entity, Error, Id, Pointer, RepositoryBuilder, VersionNumber};
use tokio_util::sync::CancellationToken;

use crate::entity::{count, do_nothing, TestAgent, TestDelta, TestEntity};
use crate::memory::{repository, repository_with_snapshots};

async fn counted_entity(store: &MemoryStore, counts: &[u64]) -> Id {
    let cancel = CancellationToken::new();
    let mut repository = repository(store);
    let entity_id = Id::new();

    repository.create(entity_id).unwrap();
    for number in counts {
        repository.append(entity_id, count(*number)).unwrap();
    }
    assert!(repository.commit(&cancel).await.unwrap());

    entity_id
}

#[tokio::test]
async fn create_and_append_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let mut repository = repository(&store);
    let entity_id = Id::new();

    assert!(matches!(repository.get(entity_id), Err(Error::UnknownEntity(_))));
    assert!(matches!(repository.append(entity_id, count(1)), Err(Error::UnknownEntity(_))));

    repository.create(entity_id).unwrap();
    assert!(matches!(repository.create(entity_id), Err(Error::ExistingEntity(_))));

    // Nothing to commit yet.
    assert!(repository.commit(&cancel).await.unwrap());

    repository.append(entity_id, count(2)).unwrap();
    repository.append(entity_id, count(3)).unwrap();

    let entity = repository.get(entity_id).unwrap();
    assert_eq!(entity.count, 5);
    assert_eq!(entity.version(), VersionNumber::new(2));

    assert!(repository.commit(&cancel).await.unwrap());

    let current = repository.get_current(entity_id, &cancel).await.unwrap();
    assert_eq!(&current, repository.get(entity_id).unwrap());
}

#[tokio::test]
async fn not_constructed_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let repository = repository(&store);
    let entity_id = Id::new();

    assert!(matches!(
        repository.get_current(entity_id, &cancel).await,
        Err(Error::NotConstructed(id)) if id == entity_id
    ));
    assert!(matches!(
        repository.get_at_version(entity_id, VersionNumber::new(1), &cancel).await,
        Err(Error::NotConstructed(_))
    ));
}

#[tokio::test]
async fn get_at_version_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let entity_id = counted_entity(&store, &[1, 10, 100]).await;
    let repository = repository(&store);

    let entity = repository
        .get_at_version(entity_id, VersionNumber::new(2), &cancel)
        .await
        .unwrap();

    assert_eq!(entity.count, 11);
    assert_eq!(entity.version, VersionNumber::new(2));

    // Asking beyond the latest version gives the latest state.
    let entity = repository
        .get_at_version(entity_id, VersionNumber::new(10), &cancel)
        .await
        .unwrap();

    assert_eq!(entity.count, 111);
}

#[tokio::test]
async fn try_load_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let entity_id = counted_entity(&store, &[1, 2, 3]).await;

    let mut latest = repository(&store);
    assert!(latest.try_load(Pointer::latest(entity_id), &cancel).await.unwrap());
    assert_eq!(latest.get(entity_id).unwrap().version, VersionNumber::new(3));

    let mut repository = repository(&store);
    assert!(repository
        .try_load(Pointer::new(entity_id, VersionNumber::new(2)), &cancel)
        .await
        .unwrap());
    assert_eq!(repository.get(entity_id).unwrap().count, 3);

    // Already satisfied, or known ahead of the request.
    assert!(repository
        .try_load(Pointer::new(entity_id, VersionNumber::new(2)), &cancel)
        .await
        .unwrap());
    assert!(!repository
        .try_load(Pointer::new(entity_id, VersionNumber::new(1)), &cancel)
        .await
        .unwrap());

    // Known behind the request: replayed forward.
    assert!(repository
        .try_load(Pointer::new(entity_id, VersionNumber::new(3)), &cancel)
        .await
        .unwrap());
    assert_eq!(repository.get(entity_id).unwrap().count, 6);

    // Never committed that far.
    let mut repository = crate::memory::repository(&store);
    assert!(!repository
        .try_load(Pointer::new(entity_id, VersionNumber::new(5)), &cancel)
        .await
        .unwrap());
    assert!(matches!(repository.get(entity_id), Err(Error::UnknownEntity(_))));

    // Never committed at all: the latest state does not exist.
    let never_committed = Id::new();
    assert!(!repository
        .try_load(Pointer::latest(never_committed), &cancel)
        .await
        .unwrap());
    assert!(matches!(repository.get(never_committed), Err(Error::UnknownEntity(_))));
    assert!(matches!(
        repository.append(never_committed, count(1)),
        Err(Error::UnknownEntity(_))
    ));
    // Nothing was made pending by the failed load.
    assert!(repository.commit(&cancel).await.unwrap());
    let deltas: Vec<TestDelta> = store
        .get_deltas(&EntityIdQuery::new([never_committed]))
        .await
        .unwrap();
    assert!(deltas.is_empty());
}

#[tokio::test]
async fn loaded_entity_can_be_appended_to_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let entity_id = counted_entity(&store, &[1]).await;

    let mut repository = repository(&store);
    assert!(repository.try_load(Pointer::latest(entity_id), &cancel).await.unwrap());
    repository.append(entity_id, count(4)).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());

    let deltas: Vec<TestDelta> = store.get_deltas(&EntityIdQuery::new([entity_id])).await.unwrap();
    assert_eq!(deltas, vec![count(1), count(4)]);
}

#[tokio::test]
async fn cancellation_keeps_pending_messages_test() {
    let store = MemoryStore::default();
    let mut repository = repository(&store);
    let entity_id = Id::new();

    repository.create(entity_id).unwrap();
    repository.append(entity_id, count(7)).unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();

    assert!(matches!(repository.commit(&cancelled).await, Err(Error::Cancelled)));
    assert!(matches!(
        repository.get_current(entity_id, &cancelled).await,
        Err(Error::Cancelled)
    ));

    let deltas: Vec<TestDelta> = store.get_deltas(&EntityIdQuery::new([entity_id])).await.unwrap();
    assert!(deltas.is_empty());

    let cancel = CancellationToken::new();
    assert!(repository.commit(&cancel).await.unwrap());

    let entity = repository.get_current(entity_id, &cancel).await.unwrap();
    assert_eq!(entity.count, 7);
    assert_eq!(entity.version, VersionNumber::new(1));
}

#[tokio::test]
async fn snapshots_are_put_on_commit_test() {
    let store = MemoryStore::default();
    let snapshots: MemorySnapshotStore<TestEntity> = store.snapshot_store();
    let cancel = CancellationToken::new();
    let mut repository = repository_with_snapshots(&store, &snapshots);
    let entity_id = Id::new();

    repository.create(entity_id).unwrap();
    repository.append(entity_id, count(1)).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());
    repository.flush_snapshots().await;

    let snapshot = snapshots.get_snapshot(entity_id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, VersionNumber::new(1));
    assert_eq!(snapshot.count, 1);

    // The count does not move: not worth a snapshot.
    repository.append(entity_id, do_nothing()).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());
    repository.flush_snapshots().await;

    let snapshot = snapshots.get_snapshot(entity_id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, VersionNumber::new(1));

    repository.append(entity_id, count(2)).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());
    repository.flush_snapshots().await;

    let snapshot = snapshots.get_snapshot(entity_id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, VersionNumber::new(3));
    assert_eq!(snapshot.count, 3);
}

#[tokio::test]
async fn finished_snapshot_writes_are_released_test() {
    let store = MemoryStore::default();
    let snapshots: MemorySnapshotStore<TestEntity> = store.snapshot_store();
    let cancel = CancellationToken::new();
    let mut repository = repository_with_snapshots(&store, &snapshots);
    let entity_id = Id::new();

    repository.create(entity_id).unwrap();

    for _ in 0..10 {
        repository.append(entity_id, count(1)).unwrap();
        assert!(repository.commit(&cancel).await.unwrap());
        // Lets the spawned write run to completion without flushing.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(repository.pending_snapshot_writes(), 1);

    repository.flush_snapshots().await;
    assert_eq!(repository.pending_snapshot_writes(), 0);

    let snapshot = snapshots.get_snapshot(entity_id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, VersionNumber::new(10));
}

#[tokio::test]
async fn newer_snapshot_is_ignored_test() {
    let store = MemoryStore::default();
    let snapshots: MemorySnapshotStore<TestEntity> = store.snapshot_store();
    let cancel = CancellationToken::new();
    let entity_id = counted_entity(&store, &[1, 1, 1, 1]).await;

    // A snapshot that replaying could never produce tells whether it has been used.
    let marked = TestEntity {
        version: VersionNumber::new(4),
        count: 1000,
        ..TestEntity::construct(entity_id)
    };
    assert!(snapshots.put_snapshot(entity_id, &marked).await.unwrap());

    let repository = repository_with_snapshots(&store, &snapshots);

    let current = repository.get_current(entity_id, &cancel).await.unwrap();
    assert_eq!(current.count, 1000);

    let at_version = repository
        .get_at_version(entity_id, VersionNumber::new(2), &cancel)
        .await
        .unwrap();
    assert_eq!(at_version.count, 2);
    assert_eq!(at_version.version, VersionNumber::new(2));
}

#[tokio::test]
async fn shared_agent_accessor_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let agent_accessor = Arc::new(StaticAgentAccessor::new(TestAgent::user("shared")));
    let entity_id = Id::new();

    let mut repository: deltadb::MultipleEntityRepository<TestEntity, _, _> =
        RepositoryBuilder::new(Arc::clone(&agent_accessor), store.clone()).build();

    repository.create(entity_id).unwrap();
    repository.append(entity_id, count(1)).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());

    let signatures: Vec<TestAgent> = store
        .get_agent_signatures(&EntityIdQuery::new([entity_id]))
        .await
        .unwrap();
    assert_eq!(signatures, vec![TestAgent::user("shared")]);
}
