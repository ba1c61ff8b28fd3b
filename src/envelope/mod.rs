use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use resolver::*;
pub use service::*;

mod resolver;
mod service;

/// Header carrying the logical type name of the enveloped payload.
pub const TYPE_HEADER: &str = "Type";

/// Type headers of an [`Envelope`]: the logical type name plus any hint a resolver may need. No
/// compiler-specific identifiers are ever stored in here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeHeaders(BTreeMap<String, String>);

impl EnvelopeHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type_name(type_name: impl Into<String>) -> Self {
        Self::new().with(TYPE_HEADER, type_name)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn type_name(&self) -> Option<&str> {
        self.get(TYPE_HEADER)
    }
}

impl Display for EnvelopeHeaders {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// A type-tagged payload, ready to be written to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub headers: EnvelopeHeaders,
    pub value: Value,
}

/// A closed family of payload types (deltas, agent signatures, snapshots) that can be put in an
/// [`Envelope`] and resolved back.
///
/// Usually implemented through the [`polymorphic!`](crate::polymorphic) macro.
pub trait Polymorphic: Sized + Send + Sync + 'static {
    /// The logical name of the active variant, written in the [`TYPE_HEADER`].
    fn type_name(&self) -> &'static str;

    /// Serializes the active variant, without any discriminant.
    fn to_value(&self) -> Result<Value, serde_json::Error>;

    /// The resolver registered first in every default [`TypeResolverChain`]: it maps every declared
    /// variant name to its decoder.
    fn declared_resolver() -> DeclaredTypeResolver<Self>;
}

/// Declares an enum whose variants each wrap a serializable payload type, implementing
/// [`Polymorphic`](crate::envelope::Polymorphic) for it (variant names become the logical type names)
/// and `From<Payload>` for every variant.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct Deposited { pub amount: u64 }
///
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct Withdrawn { pub amount: u64 }
///
/// deltadb::polymorphic! {
///     #[derive(Debug)]
///     pub enum AccountDelta {
///         Deposited(Deposited),
///         Withdrawn(Withdrawn),
///     }
/// }
/// ```
#[macro_export]
macro_rules! polymorphic {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident($ty:ty)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($(#[$variant_meta])* $variant($ty)),+
        }

        impl $crate::envelope::Polymorphic for $name {
            fn type_name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => stringify!($variant)),+
                }
            }

            fn to_value(&self) -> ::std::result::Result<$crate::serde_json::Value, $crate::serde_json::Error> {
                match self {
                    $(Self::$variant(inner) => $crate::serde_json::to_value(inner)),+
                }
            }

            fn declared_resolver() -> $crate::envelope::DeclaredTypeResolver<Self> {
                $crate::envelope::DeclaredTypeResolver::<Self>::new()
                    $(.declare(stringify!($variant), |value| {
                        $crate::serde_json::from_value::<$ty>(value).map(Self::$variant)
                    }))+
            }
        }

        $(
            impl ::std::convert::From<$ty> for $name {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}
