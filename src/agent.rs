use std::ops::Deref;

use async_trait::async_trait;

use crate::envelope::Polymorphic;
use crate::error::Error;
use crate::source::Agent;
use crate::types::TimeStamp;

/// Supplies the actor committing a source, e.g. the user of the current request.
#[async_trait]
pub trait AgentAccessor: Send + Sync {
    type Signature: Polymorphic;

    async fn agent(&self) -> Result<Agent<Self::Signature>, Error>;
}

/// Blanket implementation making an [`AgentAccessor`] every (smart) pointer to an [`AgentAccessor`],
/// e.g. `&Accessor`, `Box<Accessor>`, `Arc<Accessor>`.
#[async_trait]
impl<S, T> AgentAccessor for T
where
    S: AgentAccessor,
    T: Deref<Target = S> + Send + Sync,
{
    type Signature = S::Signature;

    async fn agent(&self) -> Result<Agent<Self::Signature>, Error> {
        self.deref().agent().await
    }
}

/// An [`AgentAccessor`] always signing with the same signature, stamped with the current time.
#[derive(Debug, Clone)]
pub struct StaticAgentAccessor<A> {
    signature: A,
}

impl<A> StaticAgentAccessor<A> {
    pub fn new(signature: A) -> Self {
        Self { signature }
    }
}

#[async_trait]
impl<A> AgentAccessor for StaticAgentAccessor<A>
where
    A: Polymorphic + Clone,
{
    type Signature = A;

    async fn agent(&self) -> Result<Agent<A>, Error> {
        Ok(Agent {
            time_stamp: TimeStamp::now(),
            signature: self.signature.clone(),
        })
    }
}
