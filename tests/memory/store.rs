use deltadb::builder::TransactionBuilder;
use deltadb::envelope::{BoxError, Decoder, EnvelopeHeaders, EnvelopeService, TypeRegistry, TypeResolverChain};
use deltadb::query::standard::{EntityIdQuery, GetSourceQuery, LeaseMatchQuery, PayloadMatchQuery, TagMatchQuery};
use deltadb::session::SessionOptions;
use deltadb::source::{Message, Source, Tag};
use deltadb::store::memory::MemoryStore;
use deltadb::store::SourceStore;
use deltadb::{Conflict, Error, Id, Pointer, TimeStamp, VersionNumber};
use tokio_util::sync::CancellationToken;

use crate::entity::{count, do_nothing, release, reservation, reserve, TestAgent, TestDelta, TestEntity};
use crate::memory::{repository, LogBuffer};

#[tokio::test]
async fn versions_have_no_gaps_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let mut repository = repository(&store);

    let first = Id::new();
    let second = Id::new();

    repository.create(first).unwrap();
    repository.create(second).unwrap();

    for _ in 0..3 {
        repository.append(first, count(1)).unwrap();
        repository.append(second, do_nothing()).unwrap();
    }

    assert!(repository.commit(&cancel).await.unwrap());

    repository.append(first, count(1)).unwrap();
    repository.append(first, count(1)).unwrap();

    assert!(repository.commit(&cancel).await.unwrap());

    let first_versions: Vec<u64> = store
        .get_annotated_deltas::<TestDelta, _>(&EntityIdQuery::new([first]))
        .await
        .unwrap()
        .iter()
        .map(|delta| delta.entity_version.value())
        .collect();

    assert_eq!(first_versions, vec![1, 2, 3, 4, 5]);

    let second_versions: Vec<u64> = store
        .get_annotated_deltas::<TestDelta, _>(&EntityIdQuery::new([second]))
        .await
        .unwrap()
        .iter()
        .map(|delta| delta.entity_version.value())
        .collect();

    assert_eq!(second_versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn concurrent_creation_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let entity_id = Id::new();

    let mut first = repository(&store);
    let mut second = repository(&store);

    first.create(entity_id).unwrap();
    first.append(entity_id, count(1)).unwrap();
    second.create(entity_id).unwrap();
    second.append(entity_id, count(2)).unwrap();

    assert!(first.commit(&cancel).await.unwrap());
    assert!(!second.commit(&cancel).await.unwrap());

    let entity: TestEntity = second.get_current(entity_id, &cancel).await.unwrap();
    assert_eq!(entity.count, 1);
}

#[tokio::test]
async fn duplicate_lease_in_source_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let mut repository = repository(&store);

    let first = Id::new();
    let second = Id::new();

    repository.create(first).unwrap();
    repository.create(second).unwrap();
    repository.append(first, reserve("alice")).unwrap();
    repository.append(second, reserve("alice")).unwrap();

    assert!(!repository.commit(&cancel).await.unwrap());

    let leases = store.get_leases(&LeaseMatchQuery::default()).await.unwrap();
    assert!(leases.is_empty());
}

#[tokio::test]
async fn held_lease_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let mut repository = repository(&store);

    let first = Id::new();
    let second = Id::new();

    repository.create(first).unwrap();
    repository.append(first, reserve("alice")).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());

    repository.create(second).unwrap();
    repository.append(second, reserve("alice")).unwrap();
    assert!(!repository.commit(&cancel).await.unwrap());

    // Once released, the lease can be taken by someone else.
    let mut other = crate::memory::repository(&store);
    assert!(other.try_load(Pointer::latest(first), &cancel).await.unwrap());
    other.append(first, release()).unwrap();
    assert!(other.commit(&cancel).await.unwrap());

    assert!(repository.commit(&cancel).await.unwrap());

    let leases = store
        .get_annotated_leases(&LeaseMatchQuery {
            value: Some("alice".to_string()),
            ..LeaseMatchQuery::default()
        })
        .await
        .unwrap();

    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].entity_id, second);
    assert_eq!(leases[0].data, reservation("alice"));
}

#[tokio::test]
async fn duplicate_tag_in_source_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let mut repository = repository(&store);

    let first = Id::new();
    let second = Id::new();
    let tag = Tag::new("color", "red");

    repository.create(first).unwrap();
    repository.create(second).unwrap();
    repository.append(first, do_nothing()).unwrap();
    repository.add_tag(first, tag.clone()).unwrap();
    repository.append(second, do_nothing()).unwrap();
    repository.add_tag(second, tag.clone()).unwrap();

    assert!(repository.commit(&cancel).await.unwrap());

    let tags = store
        .get_tags(&TagMatchQuery {
            label: Some("color".to_string()),
            ..TagMatchQuery::default()
        })
        .await
        .unwrap();

    assert_eq!(tags, vec![tag.clone(), tag]);
}

#[tokio::test]
async fn delete_leases_and_tags_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let mut repository = repository(&store);
    let entity_id = Id::new();

    let tags = vec![Tag::new("a", "1"), Tag::new("b", "2")];

    repository.create(entity_id).unwrap();
    repository.append(entity_id, reserve("bob")).unwrap();
    for tag in &tags {
        repository.add_tag(entity_id, tag.clone()).unwrap();
    }
    assert!(repository.commit(&cancel).await.unwrap());

    let lease_query = LeaseMatchQuery {
        entity_id: Some(entity_id),
        ..LeaseMatchQuery::default()
    };
    let tag_query = TagMatchQuery {
        entity_id: Some(entity_id),
        ..TagMatchQuery::default()
    };

    assert_eq!(store.get_leases(&lease_query).await.unwrap(), vec![reservation("bob")]);
    assert_eq!(store.get_tags(&tag_query).await.unwrap(), tags);

    repository.append(entity_id, release()).unwrap();
    for tag in &tags {
        repository.delete_tag(entity_id, tag.clone()).unwrap();
    }
    assert!(repository.commit(&cancel).await.unwrap());

    assert!(store.get_leases(&lease_query).await.unwrap().is_empty());
    assert!(store.get_tags(&tag_query).await.unwrap().is_empty());
}

#[tokio::test]
async fn tagged_versions_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let entity_id = Id::new();

    let mut repository = repository(&store);
    repository.create(entity_id).unwrap();
    repository.append(entity_id, count(1)).unwrap();
    repository.add_tag(entity_id, Tag::new("n", "1")).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());

    repository.append(entity_id, count(1)).unwrap();
    repository.add_tag(entity_id, Tag::new("n", "2")).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());

    let entity = repository.get_current(entity_id, &cancel).await.unwrap();
    assert_eq!(entity.version, VersionNumber::new(2));

    let tags = store
        .get_annotated_tags(&TagMatchQuery {
            entity_id: Some(entity_id),
            label: None,
            value: Some("1".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].data, Tag::new("n", "1"));
    assert_eq!(tags[0].entity_version, VersionNumber::new(1));
}

#[tokio::test]
async fn annotated_reads_test() {
    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let entity_id = Id::new();

    let mut repository = repository(&store);
    repository.create(entity_id).unwrap();
    repository.append(entity_id, count(1)).unwrap();
    repository.append(entity_id, count(5)).unwrap();
    repository.append(entity_id, do_nothing()).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());

    let signatures = store
        .get_annotated_agent_signatures::<TestAgent, _>(&EntityIdQuery::new([entity_id]))
        .await
        .unwrap();

    assert_eq!(signatures.len(), 1);
    assert_eq!(signatures[0].data, TestAgent::user("tester"));
    assert_eq!(
        signatures[0].entity_pointers,
        (1..=3)
            .map(|version| Pointer::new(entity_id, VersionNumber::new(version)))
            .collect::<Vec<_>>()
    );

    let large_counts = PayloadMatchQuery::new(|delta: &TestDelta| matches!(delta, TestDelta::Count(count) if count.number > 1));
    let deltas = store.get_annotated_deltas::<TestDelta, _>(&large_counts).await.unwrap();

    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].data, count(5));
    assert_eq!(deltas[0].entity_pointer(), Pointer::new(entity_id, VersionNumber::new(2)));
    assert_eq!(deltas[0].source_id, signatures[0].source_id);

    let source_deltas: Vec<TestDelta> = store
        .get_deltas(&GetSourceQuery {
            source_id: signatures[0].source_id,
            entity_id: Some(entity_id),
        })
        .await
        .unwrap();

    assert_eq!(source_deltas, vec![count(1), count(5), do_nothing()]);
}

#[tokio::test]
async fn commit_rejections_test() {
    let store = MemoryStore::default();
    let entity_id = Id::new();

    let reserved = Source {
        id: Id::new(),
        time_stamp: TimeStamp::now(),
        agent_signature: TestAgent::user("tester"),
        messages: vec![Message::new(entity_id, VersionNumber::MAX, do_nothing())],
    };

    assert!(matches!(
        store.commit(&reserved).await,
        Err(Error::ReservedVersion { entity_id: id }) if id == entity_id
    ));

    let mut builder: TransactionBuilder<TestEntity> = TransactionBuilder::new();
    builder.create(entity_id, count(1)).unwrap();
    let source = builder.build(TestAgent::user("tester"), Id::new());

    store.commit(&source).await.unwrap();

    assert!(matches!(
        store.commit(&source).await,
        Err(Error::Conflict(Conflict::Source(id))) if id == source.id
    ));

    let mut twice = Source {
        id: Id::new(),
        time_stamp: TimeStamp::now(),
        agent_signature: TestAgent::user("tester"),
        messages: vec![
            Message::new(entity_id, VersionNumber::new(1), do_nothing()),
            Message::new(entity_id, VersionNumber::new(1), do_nothing()),
        ],
    };

    assert!(matches!(
        store.commit(&twice).await,
        Err(Error::Conflict(Conflict::DuplicateInBatch { .. }))
    ));

    twice.messages.truncate(1);
    twice.messages[0].expected_previous_version = VersionNumber::ZERO;

    assert!(matches!(
        store.commit(&twice).await,
        Err(Error::Conflict(Conflict::Version { version, .. })) if version == VersionNumber::new(1)
    ));

    // Rejected sources leave nothing behind.
    let deltas: Vec<TestDelta> = store.get_deltas(&EntityIdQuery::new([entity_id])).await.unwrap();
    assert_eq!(deltas, vec![count(1)]);
}

#[tokio::test]
async fn read_only_session_test() {
    let buffer = LogBuffer::default();
    let _guard = tracing::subscriber::set_default(buffer.subscriber());

    let store = MemoryStore::default();
    let cancel = CancellationToken::new();
    let entity_id = Id::new();

    let reporting = store.session(SessionOptions::builder().read_only(true).label("reporting").build());
    let mut repository = crate::memory::repository(&reporting);

    repository.create(entity_id).unwrap();
    repository.append(entity_id, count(1)).unwrap();

    assert!(!repository.commit(&cancel).await.unwrap());

    let logs = buffer.contents();
    assert!(logs.contains("source rejected"));
    assert!(logs.contains("read-only"));
    assert!(logs.contains("reporting"));

    // Nothing reached the store: the first version of the entity is still free.
    let deltas: Vec<TestDelta> = store.get_deltas(&EntityIdQuery::new([entity_id])).await.unwrap();
    assert!(deltas.is_empty());
    assert!(matches!(
        store.commit(&Source {
            id: Id::new(),
            time_stamp: TimeStamp::now(),
            agent_signature: TestAgent::user("tester"),
            messages: vec![Message::new(entity_id, VersionNumber::ZERO, count(1))],
        })
        .await,
        Ok(())
    ));
}

#[tokio::test]
async fn failing_resolver_is_logged_and_skipped_test() {
    let buffer = LogBuffer::default();
    let _guard = tracing::subscriber::set_default(buffer.subscriber());

    let chain = TypeResolverChain::<TestDelta>::default().register_fn(
        "upcaster",
        |_: &EnvelopeHeaders| -> Result<Option<Decoder<TestDelta>>, BoxError> { Err("registry offline".into()) },
    );
    let store = MemoryStore::new(EnvelopeService::new(TypeRegistry::new().with_chain(chain)));
    let cancel = CancellationToken::new();
    let mut repository = repository(&store);
    let entity_id = Id::new();

    repository.create(entity_id).unwrap();
    repository.append(entity_id, count(3)).unwrap();
    assert!(repository.commit(&cancel).await.unwrap());

    // The declared resolver still decodes every delta.
    let deltas: Vec<TestDelta> = store.get_deltas(&EntityIdQuery::new([entity_id])).await.unwrap();
    assert_eq!(deltas, vec![count(3)]);

    let logs = buffer.contents();
    assert!(logs.contains("type resolver failed"));
    assert!(logs.contains("upcaster"));
    assert!(logs.contains("registry offline"));
    assert!(!logs.contains("no type resolver accepted the headers"));
}
