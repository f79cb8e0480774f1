//! Integration test suite for the Ember block index.
//!
//! Tests build real chains on disk (flat block files in a temporary
//! directory plus a transaction database) and then run the startup load
//! pipeline against them, often after corrupting a record or two.

pub mod helpers;
