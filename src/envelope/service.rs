use serde::ser::Error as _;

use crate::envelope::{Decoder, Envelope, EnvelopeHeaders, Polymorphic, TypeRegistry, TypeResolverChain};
use crate::error::Error;

/// Puts payloads into [`Envelope`]s and gets them back out, resolving types through a [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct EnvelopeService {
    registry: TypeRegistry,
}

impl EnvelopeService {
    pub fn new(registry: TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Captures a payload along with its type headers.
    ///
    /// # Errors
    ///
    /// Will return an `Err` if the payload cannot be serialized, or if it serializes to `null`, which a
    /// backend could not tell apart from a missing payload.
    pub fn deconstruct<T: Polymorphic>(&self, value: &T) -> Result<Envelope, Error> {
        let type_name = value.type_name();

        let value = value
            .to_value()
            .and_then(|value| {
                if value.is_null() {
                    Err(serde_json::Error::custom("payload serialized to null"))
                } else {
                    Ok(value)
                }
            })
            .map_err(|error| {
                tracing::error!({ type_name = type_name, error = ?error }, "failed to deconstruct payload");
                Error::SerializationFailed {
                    type_name: type_name.to_string(),
                    source: error,
                }
            })?;

        Ok(Envelope {
            headers: EnvelopeHeaders::with_type_name(type_name),
            value,
        })
    }

    /// Resolves the envelope headers to a concrete variant of `T` and decodes the payload.
    pub fn reconstruct<T: Polymorphic>(&self, envelope: &Envelope) -> Result<T, Error> {
        let decoder = self.decoder::<T>(&envelope.headers)?;

        decoder(envelope.value.clone()).map_err(|error| {
            tracing::error!({
                headers = %envelope.headers,
                error = ?error,
            }, "failed to reconstruct payload");
            Error::DeserializationFailed {
                type_name: envelope.headers.type_name().unwrap_or_default().to_string(),
                source: error,
            }
        })
    }

    /// Reconstructs the envelope only if it belongs to `T`, without logging anything. Used to check
    /// heterogeneous logs, e.g. when matching payload predicates.
    pub fn try_reconstruct<T: Polymorphic>(&self, envelope: &Envelope) -> Option<T> {
        let decoder = match self.registry.chain::<T>() {
            Some(chain) => chain.try_resolve(&envelope.headers),
            None => TypeResolverChain::<T>::default().try_resolve(&envelope.headers),
        }?;

        decoder(envelope.value.clone()).ok()
    }

    /// Converts an envelope to its byte wire form.
    pub fn serialize(&self, envelope: &Envelope) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(envelope).map_err(|error| {
            tracing::error!({ headers = %envelope.headers, error = ?error }, "failed to serialize envelope");
            Error::SerializationFailed {
                type_name: envelope.headers.type_name().unwrap_or_default().to_string(),
                source: error,
            }
        })
    }

    /// Reads an envelope back from its byte wire form.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Envelope, Error> {
        serde_json::from_slice(bytes).map_err(|error| {
            tracing::error!({ error = ?error }, "failed to deserialize envelope");
            Error::DeserializationFailed {
                type_name: std::any::type_name::<Envelope>().to_string(),
                source: error,
            }
        })
    }

    pub fn deconstruct_and_serialize<T: Polymorphic>(&self, value: &T) -> Result<Vec<u8>, Error> {
        self.serialize(&self.deconstruct(value)?)
    }

    pub fn deserialize_and_reconstruct<T: Polymorphic>(&self, bytes: &[u8]) -> Result<T, Error> {
        self.reconstruct(&self.deserialize(bytes)?)
    }

    fn decoder<T: Polymorphic>(&self, headers: &EnvelopeHeaders) -> Result<Decoder<T>, Error> {
        match self.registry.chain::<T>() {
            Some(chain) => chain.resolve(headers),
            None => TypeResolverChain::<T>::default().resolve(headers),
        }
    }
}
