use crate::envelope::Polymorphic;
use crate::source::{Lease, Tag};
use crate::types::{Id, Pointer, VersionNumber};

/// The state of an entity, reconstructed by reducing its deltas in version order.
///
/// The engine never inspects entity fields: it only constructs, reduces and reads back the version.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Every kind of state transition this entity can go through.
    type Delta: Polymorphic;

    /// The state of an entity that has never been reduced. Its version must be zero.
    fn construct(entity_id: Id) -> Self;

    fn entity_id(&self) -> Id;

    fn version(&self) -> VersionNumber;

    /// Applies one delta. The returned state must be one version ahead of `self`.
    fn reduce(self, delta: &Self::Delta) -> Self;

    /// Leases held by this state. Whenever a delta changes them, the transaction builder records the
    /// difference on the message carrying that delta.
    fn leases(&self) -> Vec<Lease> {
        vec![]
    }

    /// Tags held by this state. Diffed like [`Entity::leases`].
    fn tags(&self) -> Vec<Tag> {
        vec![]
    }

    fn pointer(&self) -> Pointer {
        Pointer::new(self.entity_id(), self.version())
    }
}

/// Snapshot strategy of an entity: when a reduced state is worth persisting as a shortcut for
/// replaying, and when a candidate snapshot should replace the stored one.
pub trait Snapshot: Entity + Polymorphic + Clone {
    /// Whether `next`, just committed, should be persisted. `previous` is the last state known to the
    /// session before the commit, if any.
    fn should_put_snapshot(previous: Option<&Self>, next: &Self) -> bool;

    /// Whether `self` should replace the `previous` snapshot. Guards against concurrent writers
    /// replacing a newer snapshot with an older one.
    fn should_replace(&self, previous: &Self) -> bool {
        self.version() > previous.version()
    }
}
