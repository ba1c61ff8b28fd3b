use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde_json::Value;

use crate::envelope::{EnvelopeHeaders, Polymorphic};
use crate::error::Error;

/// Decodes a bare payload value into one concrete variant of `T`.
pub type Decoder<T> = fn(Value) -> Result<T, serde_json::Error>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A partial resolver mapping [`EnvelopeHeaders`] to the decoder of a concrete variant of `T`.
///
/// Returning `Ok(None)` declines the headers and lets the next resolver of the chain try. Returning an
/// `Err` is treated as a declination too, but gets logged.
pub trait TypeResolver<T>: Send + Sync {
    /// The name of the resolver. Used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn resolve(&self, headers: &EnvelopeHeaders) -> Result<Option<Decoder<T>>, BoxError>;
}

/// Resolves the variant names declared by a [`Polymorphic`] type.
pub struct DeclaredTypeResolver<T> {
    decoders: HashMap<&'static str, Decoder<T>>,
}

impl<T> DeclaredTypeResolver<T> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Declares `type_name` as decodable by `decoder`. Declaring the same name twice keeps the latest.
    pub fn declare(mut self, type_name: &'static str, decoder: Decoder<T>) -> Self {
        let _ = self.decoders.insert(type_name, decoder);
        self
    }

    pub fn declared_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }
}

impl<T> Default for DeclaredTypeResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypeResolver<T> for DeclaredTypeResolver<T> {
    fn name(&self) -> &str {
        "declared"
    }

    fn resolve(&self, headers: &EnvelopeHeaders) -> Result<Option<Decoder<T>>, BoxError> {
        Ok(headers
            .type_name()
            .and_then(|type_name| self.decoders.get(type_name))
            .copied())
    }
}

/// A named resolver backed by a closure.
pub struct FnTypeResolver<F> {
    name: String,
    function: F,
}

impl<F> FnTypeResolver<F> {
    pub fn new(name: impl Into<String>, function: F) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

impl<T, F> TypeResolver<T> for FnTypeResolver<F>
where
    F: Fn(&EnvelopeHeaders) -> Result<Option<Decoder<T>>, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, headers: &EnvelopeHeaders) -> Result<Option<Decoder<T>>, BoxError> {
        (self.function)(headers)
    }
}

/// An ordered list of partial resolvers, consulted last-registered-first.
///
/// The default chain of a [`Polymorphic`] type starts with its [`DeclaredTypeResolver`], so that every
/// resolver registered afterwards overrides it.
pub struct TypeResolverChain<T> {
    resolvers: Vec<Box<dyn TypeResolver<T>>>,
}

impl<T> TypeResolverChain<T> {
    /// An empty chain, resolving nothing.
    pub fn empty() -> Self {
        Self { resolvers: vec![] }
    }

    /// Add a resolver, taking precedence over all the ones already registered.
    pub fn register(mut self, resolver: impl TypeResolver<T> + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Add a closure resolver, taking precedence over all the ones already registered.
    pub fn register_fn<F>(self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&EnvelopeHeaders) -> Result<Option<Decoder<T>>, BoxError> + Send + Sync + 'static,
        T: 'static,
    {
        self.register(FnTypeResolver::new(name, function))
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolves the headers to a decoder, failing with [`Error::ResolutionFailed`] if every resolver
    /// declines.
    pub fn resolve(&self, headers: &EnvelopeHeaders) -> Result<Decoder<T>, Error> {
        for resolver in self.resolvers.iter().rev() {
            match resolver.resolve(headers) {
                Ok(Some(decoder)) => return Ok(decoder),
                Ok(None) => continue,
                Err(error) => {
                    tracing::error!({
                        resolver = resolver.name(),
                        headers = %headers,
                        error = ?error,
                    }, "type resolver failed");
                }
            }
        }

        tracing::error!({ headers = %headers }, "no type resolver accepted the headers");
        Err(Error::ResolutionFailed(headers.clone()))
    }

    /// Like [`TypeResolverChain::resolve`], without logging anything. Used when checking envelopes that
    /// are expected not to belong to `T`.
    pub fn try_resolve(&self, headers: &EnvelopeHeaders) -> Option<Decoder<T>> {
        self.resolvers
            .iter()
            .rev()
            .find_map(|resolver| resolver.resolve(headers).ok().flatten())
    }
}

impl<T: Polymorphic> Default for TypeResolverChain<T> {
    fn default() -> Self {
        Self::empty().register(T::declared_resolver())
    }
}

/// The resolver chains of every payload type, built once at start-up.
///
/// Types without a registered chain resolve through their default chain.
#[derive(Default)]
pub struct TypeRegistry {
    chains: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chain used to resolve `T`, replacing any previous one.
    pub fn with_chain<T: Polymorphic>(mut self, chain: TypeResolverChain<T>) -> Self {
        let _ = self.chains.insert(TypeId::of::<T>(), Box::new(chain));
        self
    }

    pub fn chain<T: Polymorphic>(&self) -> Option<&TypeResolverChain<T>> {
        self.chains
            .get(&TypeId::of::<T>())
            .and_then(|chain| chain.downcast_ref::<TypeResolverChain<T>>())
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("chains", &self.chains.len())
            .finish()
    }
}
