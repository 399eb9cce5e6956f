//! the test_utils folder here will share utils or test components between unit
//! tests in this crate
mod common;
pub mod mock_type_config;

pub use common::*;
pub use mock_type_config::*;
