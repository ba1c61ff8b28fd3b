use std::collections::HashMap;

use crate::entity::Entity;
use crate::error::Error;
use crate::source::{Lease, Message, Source, Tag};
use crate::types::{Id, TimeStamp};

/// Accumulates the messages of a source across any number of entities of the same type.
///
/// Entities must be known to the builder before being appended to, either by creating them here or by
/// loading a state obtained elsewhere. Every append reduces the in-memory state, so the expected previous
/// version of each message always follows the one before it.
pub struct TransactionBuilder<E>
where
    E: Entity,
{
    known_entities: HashMap<Id, E>,
    messages: Vec<Message<E::Delta>>,
}

impl<E> TransactionBuilder<E>
where
    E: Entity,
{
    pub fn new() -> Self {
        Self {
            known_entities: HashMap::new(),
            messages: vec![],
        }
    }

    /// Constructs a brand new entity and records its first delta.
    ///
    /// # Errors
    ///
    /// Will return [`Error::ExistingEntity`] if the entity is already known.
    pub fn create(&mut self, entity_id: Id, delta: E::Delta) -> Result<&mut Self, Error> {
        if self.is_known(entity_id) {
            return Err(Error::ExistingEntity(entity_id));
        }

        let _ = self.known_entities.insert(entity_id, E::construct(entity_id));
        self.append(entity_id, delta)
    }

    /// Makes an existing entity known, so that deltas can be appended to it.
    ///
    /// # Errors
    ///
    /// Will return [`Error::ExistingEntity`] if the entity is already known.
    pub fn load(&mut self, entity_id: Id, entity: E) -> Result<&mut Self, Error> {
        if self.is_known(entity_id) {
            return Err(Error::ExistingEntity(entity_id));
        }

        let _ = self.known_entities.insert(entity_id, entity);
        Ok(self)
    }

    /// Reduces the known entity and records the delta, along with the leases and tags the reduction
    /// gained or lost.
    ///
    /// # Errors
    ///
    /// Will return [`Error::UnknownEntity`] if the entity has not been created or loaded.
    pub fn append(&mut self, entity_id: Id, delta: E::Delta) -> Result<&mut Self, Error> {
        let entity = self
            .known_entities
            .remove(&entity_id)
            .ok_or(Error::UnknownEntity(entity_id))?;

        let previous_version = entity.version();
        let previous_leases = entity.leases();
        let previous_tags = entity.tags();

        let entity = entity.reduce(&delta);

        let mut message = Message::new(entity_id, previous_version, delta);
        (message.delete_leases, message.add_leases) = diff(previous_leases, entity.leases());
        (message.delete_tags, message.add_tags) = diff(previous_tags, entity.tags());

        self.messages.push(message);
        let _ = self.known_entities.insert(entity_id, entity);

        Ok(self)
    }

    /// # Errors
    ///
    /// Will return [`Error::NoPendingMessage`] if no message is pending for the entity.
    pub fn add_lease(&mut self, entity_id: Id, lease: Lease) -> Result<&mut Self, Error> {
        self.last_message(entity_id)?.add_leases.push(lease);
        Ok(self)
    }

    /// # Errors
    ///
    /// Will return [`Error::NoPendingMessage`] if no message is pending for the entity.
    pub fn delete_lease(&mut self, entity_id: Id, lease: Lease) -> Result<&mut Self, Error> {
        self.last_message(entity_id)?.delete_leases.push(lease);
        Ok(self)
    }

    /// # Errors
    ///
    /// Will return [`Error::NoPendingMessage`] if no message is pending for the entity.
    pub fn add_tag(&mut self, entity_id: Id, tag: Tag) -> Result<&mut Self, Error> {
        self.last_message(entity_id)?.add_tags.push(tag);
        Ok(self)
    }

    /// # Errors
    ///
    /// Will return [`Error::NoPendingMessage`] if no message is pending for the entity.
    pub fn delete_tag(&mut self, entity_id: Id, tag: Tag) -> Result<&mut Self, Error> {
        self.last_message(entity_id)?.delete_tags.push(tag);
        Ok(self)
    }

    /// The in-memory state of the entity, including every pending delta.
    pub fn get(&self, entity_id: Id) -> Option<&E> {
        self.known_entities.get(&entity_id)
    }

    pub fn is_known(&self, entity_id: Id) -> bool {
        self.known_entities.contains_key(&entity_id)
    }

    pub fn has_pending(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Drains the pending messages into a source. Known entities stay known, so the builder can be
    /// reused for the following source.
    pub fn build<A>(&mut self, agent_signature: A, source_id: Id) -> Source<E::Delta, A> {
        Source {
            id: source_id,
            time_stamp: TimeStamp::now(),
            agent_signature,
            messages: self.take_messages(),
        }
    }

    /// Binds the builder to a single entity.
    pub fn for_single_entity(&mut self, entity_id: Id) -> SingleEntityTransactionBuilder<'_, E> {
        SingleEntityTransactionBuilder {
            builder: self,
            entity_id,
        }
    }

    pub(crate) fn take_messages(&mut self) -> Vec<Message<E::Delta>> {
        std::mem::take(&mut self.messages)
    }

    /// Puts back messages taken by a commit that did not go through, ahead of anything appended since.
    pub(crate) fn restore_messages(&mut self, mut messages: Vec<Message<E::Delta>>) {
        messages.append(&mut self.messages);
        self.messages = messages;
    }

    /// Replaces the known state of an entity, e.g. after replaying it to a newer version.
    pub(crate) fn put_known(&mut self, entity: E) {
        let _ = self.known_entities.insert(entity.entity_id(), entity);
    }

    fn last_message(&mut self, entity_id: Id) -> Result<&mut Message<E::Delta>, Error> {
        self.messages
            .iter_mut()
            .rev()
            .find(|message| message.entity_id == entity_id)
            .ok_or(Error::NoPendingMessage(entity_id))
    }
}

impl<E> Default for TransactionBuilder<E>
where
    E: Entity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for TransactionBuilder<E>
where
    E: Entity,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("known_entities", &self.known_entities.len())
            .field("messages", &self.messages.len())
            .finish()
    }
}

/// A [`TransactionBuilder`] restricted to one entity id.
pub struct SingleEntityTransactionBuilder<'a, E>
where
    E: Entity,
{
    builder: &'a mut TransactionBuilder<E>,
    entity_id: Id,
}

impl<'a, E> SingleEntityTransactionBuilder<'a, E>
where
    E: Entity,
{
    pub const fn entity_id(&self) -> Id {
        self.entity_id
    }

    pub fn is_entity_known(&self) -> bool {
        self.builder.is_known(self.entity_id)
    }

    /// # Errors
    ///
    /// Will return [`Error::UnknownEntity`] if the entity has not been created or loaded.
    pub fn get_entity(&self) -> Result<&E, Error> {
        self.builder
            .get(self.entity_id)
            .ok_or(Error::UnknownEntity(self.entity_id))
    }

    /// # Errors
    ///
    /// Will return [`Error::ExistingEntity`] if the entity is already known.
    pub fn load(&mut self, entity: E) -> Result<&mut Self, Error> {
        let _ = self.builder.load(self.entity_id, entity)?;
        Ok(self)
    }

    /// Appends to the entity, constructing it first if it is not known yet.
    pub fn append(&mut self, delta: E::Delta) -> Result<&mut Self, Error> {
        let _ = if self.is_entity_known() {
            self.builder.append(self.entity_id, delta)?
        } else {
            self.builder.create(self.entity_id, delta)?
        };

        Ok(self)
    }

    pub fn add_lease(&mut self, lease: Lease) -> Result<&mut Self, Error> {
        let _ = self.builder.add_lease(self.entity_id, lease)?;
        Ok(self)
    }

    pub fn delete_lease(&mut self, lease: Lease) -> Result<&mut Self, Error> {
        let _ = self.builder.delete_lease(self.entity_id, lease)?;
        Ok(self)
    }

    pub fn add_tag(&mut self, tag: Tag) -> Result<&mut Self, Error> {
        let _ = self.builder.add_tag(self.entity_id, tag)?;
        Ok(self)
    }

    pub fn delete_tag(&mut self, tag: Tag) -> Result<&mut Self, Error> {
        let _ = self.builder.delete_tag(self.entity_id, tag)?;
        Ok(self)
    }

    pub fn build<A>(&mut self, agent_signature: A, source_id: Id) -> Source<E::Delta, A> {
        self.builder.build(agent_signature, source_id)
    }
}

/// Splits two snapshots of a set into `(removed, added)`, keeping their original order.
fn diff<T: PartialEq>(before: Vec<T>, after: Vec<T>) -> (Vec<T>, Vec<T>) {
    let (kept, added): (Vec<T>, Vec<T>) = after.into_iter().partition(|item| before.contains(item));
    let removed = before.into_iter().filter(|item| !kept.contains(item)).collect();

    (removed, added)
}
