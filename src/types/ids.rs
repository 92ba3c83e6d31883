//! Identifier newtypes.
//!
//! Every persisted entity is keyed by a UUID. Wrapping each kind in its own
//! type keeps node ids from being passed where a detail id is expected, which
//! matters most in the restore remap tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from a UUID string.
            pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Identifier of a graph node.
    NodeId
);
define_id!(
    /// Identifier of a node's detail record.
    DetailId
);
define_id!(
    /// Identifier of a table row under a node detail.
    RowId
);
define_id!(
    /// Identifier of an edge.
    EdgeId
);
define_id!(
    /// Identifier of an area.
    AreaId
);
define_id!(
    /// Identifier of a country (owned by an external directory).
    CountryId
);
define_id!(
    /// Identifier of a stored map version.
    VersionId
);
define_id!(
    /// Identifier of the acting user, supplied by the caller.
    UserId
);
define_id!(
    /// Identifier of an audit entry.
    AuditId
);
