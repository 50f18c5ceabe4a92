//! # Compmap Testkit
//!
//! Test utilities for compmap.
//!
//! This crate provides:
//! - Identifier and generation fixtures
//! - Property-based test generators using proptest
//! - A reference model that checks composites against a naive implementation
//! - Concurrent stress harnesses for snapshot isolation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use compmap_testkit::prelude::*;
//!
//! #[test]
//! fn resolves_chain() {
//!     let map = fixtures::chain(3, 16, 4);
//!     assert_eq!(map.depth(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures;
    pub use crate::fixtures::{rec, seg};
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::stress::*;
}

pub use fixtures::{rec, seg};
pub use generators::*;
pub use model::*;
pub use stress::*;
