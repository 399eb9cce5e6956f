//! Durable side of the coordinator: the record codec and the catalog store
//! seam records are persisted through.

mod adaptors;
mod catalog_store;
mod codec;

pub use adaptors::mem::*;
pub use catalog_store::*;
pub use codec::*;
