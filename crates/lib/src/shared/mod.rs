//! Shared collaborative types.
//!
//! The three node wrappers ([`Map`], [`Array`] and [`Text`]) are typed
//! façades over addressable nodes inside a document. Wrappers start out
//! *detached* with preliminary content; assigning one to a document root or
//! inserting it into an integrated container integrates it, after which all
//! operations go through a [`Transaction`](crate::Transaction) and the same
//! underlying node always resolves to the same wrapper (see
//! [`identity`](crate::identity)).

pub mod errors;
pub(crate) mod node;

mod array;
mod map;
mod text;
mod value;

pub use array::Array;
pub use errors::SharedTypeError;
pub use map::Map;
pub use node::NodeHandle;
pub use text::Text;
pub use value::Value;

use serde::{Deserialize, Serialize};

/// The kind of a shared root type, used by snapshots and typed root access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKind {
    Map,
    Array,
    Text,
}

impl RootKind {
    /// Human-readable kind name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            RootKind::Map => "map",
            RootKind::Array => "array",
            RootKind::Text => "text",
        }
    }
}

/// Implemented by the shared wrapper types so documents can create and cast
/// roots generically, e.g. `doc.get_or_insert::<Map>("config")`.
pub trait SharedType: sealed::Sealed + Sized {
    /// Kind marker for this wrapper type.
    fn kind() -> RootKind;

    #[doc(hidden)]
    fn from_handle(handle: NodeHandle) -> Self;

    #[doc(hidden)]
    fn handle(&self) -> &NodeHandle;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Map {}
    impl Sealed for super::Array {}
    impl Sealed for super::Text {}
}
