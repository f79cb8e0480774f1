//! # ember-core
//! Foundation types and traits for the Ember block index.

pub mod block_index;
pub mod checkpoint;
pub mod constants;
pub mod error;
pub mod genesis;
pub mod merkle;
pub mod shutdown;
pub mod traits;
pub mod types;
pub mod validation;
