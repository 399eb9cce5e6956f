mod mem_catalog_store;

pub use mem_catalog_store::*;
