use serde::{Deserialize, Serialize};
use serde_json::Value;

use deltadb::envelope::{DeclaredTypeResolver, Polymorphic};
use deltadb::source::Lease;
use deltadb::{Entity, Id, Snapshot, VersionNumber};

pub use structs::*;


pub const RESERVATION_SCOPE: &str = "test";
pub const RESERVATION_LABEL: &str = "reservation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntity {
    pub id: Id,
    pub version: VersionNumber,
    pub count: u64,
    pub reservation: Option<String>,
}

impl Entity for TestEntity {
    type Delta = TestDelta;

    fn construct(entity_id: Id) -> Self {
        Self {
            id: entity_id,
            version: VersionNumber::ZERO,
            count: 0,
            reservation: None,
        }
    }

    fn entity_id(&self) -> Id {
        self.id
    }

    fn version(&self) -> VersionNumber {
        self.version
    }

    fn reduce(self, delta: &TestDelta) -> Self {
        let version = self.version.next();

        match delta {
            TestDelta::Count(count) => Self {
                version,
                count: self.count + count.number,
                ..self
            },
            TestDelta::DoNothing(_) => Self { version, ..self },
            TestDelta::Reserve(reserve) => Self {
                version,
                reservation: Some(reserve.value.clone()),
                ..self
            },
            TestDelta::Release(_) => Self {
                version,
                reservation: None,
                ..self
            },
        }
    }

    fn leases(&self) -> Vec<Lease> {
        self.reservation
            .iter()
            .map(|value| Lease::new(RESERVATION_SCOPE, RESERVATION_LABEL, value.as_str()))
            .collect()
    }
}

impl Polymorphic for TestEntity {
    fn type_name(&self) -> &'static str {
        "TestEntity"
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn declared_resolver() -> DeclaredTypeResolver<Self> {
        DeclaredTypeResolver::new().declare("TestEntity", serde_json::from_value::<TestEntity>)
    }
}

impl Snapshot for TestEntity {
    // Snapshot whenever the count moves.
    fn should_put_snapshot(previous: Option<&Self>, next: &Self) -> bool {
        previous.map_or(next.count > 0, |previous| previous.count != next.count)
    }
}

pub fn count(number: u64) -> TestDelta {
    TestDelta::Count(Count { number })
}

pub fn do_nothing() -> TestDelta {
    TestDelta::DoNothing(DoNothing {})
}

pub fn reserve(value: &str) -> TestDelta {
    TestDelta::Reserve(Reserve {
        value: value.to_string(),
    })
}

pub fn release() -> TestDelta {
    TestDelta::Release(Release {})
}

pub fn reservation(value: &str) -> Lease {
    Lease::new(RESERVATION_SCOPE, RESERVATION_LABEL, value)
}
