use std::fmt::{Display, Formatter};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque 128-bit identifier of entities, sources and messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Generates a brand new random [`Id`].
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<Id> for Uuid {
    fn from(value: Id) -> Self {
        value.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Per-entity version counter.
///
/// Real states start at version 1: [`VersionNumber::ZERO`] is reserved for entities that have only been
/// constructed and never reduced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNumber(u64);

impl VersionNumber {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The deterministic successor of this version. `MAX.next()` wraps around to the reserved zero
    /// version, which is rejected on commit.
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u64> for VersionNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<VersionNumber> for u64 {
    fn from(value: VersionNumber) -> Self {
        value.0
    }
}

impl Display for VersionNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn unix_epoch() -> Self {
        Self(DateTime::<Utc>::default())
    }

    /// Truncates (not rounds) the sub-second part down to milliseconds, which is the finest precision
    /// most storage backends keep.
    pub fn with_millisecond_precision(&self) -> Self {
        Self(self.0.trunc_subsecs(3))
    }

    pub const fn as_date_time(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::unix_epoch()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl From<TimeStamp> for DateTime<Utc> {
    fn from(value: TimeStamp) -> Self {
        value.0
    }
}

impl Display for TimeStamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Reference to an entity state. A pointer with version zero refers to whatever the latest version is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    pub id: Id,
    pub version: VersionNumber,
}

impl Pointer {
    pub const fn new(id: Id, version: VersionNumber) -> Self {
        Self { id, version }
    }

    pub const fn latest(id: Id) -> Self {
        Self {
            id,
            version: VersionNumber::ZERO,
        }
    }

    pub fn is_satisfied_by(&self, actual: &Pointer) -> bool {
        self.id == actual.id && (self.version.is_zero() || self.version == actual.version)
    }
}

impl Display for Pointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}
