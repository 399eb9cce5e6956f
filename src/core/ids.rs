//! Opaque 128-bit identifiers for snapshots, restorations and schedules.
//!
//! All three share one representation (a random v4 uuid) but are distinct
//! types so that a schedule id can never be looked up in the snapshot index.
//! The nil uuid is reserved as the "no id" sentinel.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::Result;
use crate::StorageError;

/// Tablet ids are defined by the catalog manager.
pub type TabletId = String;

/// Table ids are defined by the catalog manager.
pub type TableId = String;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub const SIZE: usize = 16;

            pub fn generate_random() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Decodes an id from exactly 16 bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                Uuid::from_slice(bytes).map(Self).map_err(|e| {
                    StorageError::InvalidKey(format!(
                        "{}: expected 16 bytes, got {}: {}",
                        stringify!($name),
                        bytes.len(),
                        e
                    ))
                    .into()
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(
                &self,
                f: &mut fmt::Formatter<'_>,
            ) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(
                &self,
                f: &mut fmt::Formatter<'_>,
            ) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a snapshot, whether user created, imported or produced by a schedule.
    SnapshotId
);
define_id!(
    /// Identifies one restore attempt. Retrying a failed restore mints a new one.
    RestorationId
);
define_id!(
    /// Identifies a snapshot schedule.
    ScheduleId
);
