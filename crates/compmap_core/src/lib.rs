//! # Compmap Core
//!
//! Forwarding index for the segment compactor.
//!
//! Every compaction pass rewrites reachable records into fresh segments and
//! records where each record went. This crate provides:
//! - [`SegmentId`] and [`RecordId`] identifiers
//! - [`PartialCompactionMap`], the forwarding table of one pass, with an
//!   exact live tier and a compact packed tier
//! - [`CompactionMap`], a newest-first persistent stack of generations with
//!   snapshot isolation for readers
//! - [`CompactionMapRoot`], the shared "current" composite
//!
//! ## Usage
//!
//! ```rust
//! use compmap_core::{CompactionMap, PartialCompactionMap, RecordId, SegmentId};
//! use std::collections::HashSet;
//!
//! let old = SegmentId::from_u128(1);
//! let new = SegmentId::from_u128(2);
//!
//! let mut pass = PartialCompactionMap::new(1);
//! pass.put(RecordId::new(old, 0), RecordId::new(new, 0))?;
//! pass.finalize()?;
//!
//! let mut map = CompactionMap::EMPTY.extend(pass);
//! assert_eq!(map.resolve(RecordId::new(old, 0)), Some(RecordId::new(new, 0)));
//!
//! map.prune(&HashSet::from([old]));
//! assert_eq!(map.depth(), 0);
//! # Ok::<(), compmap_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod composite;
mod config;
mod error;
mod id;
mod packed;
mod partial;
mod root;
mod stats;
mod varint;

pub use composite::{CompactionMap, Layers, PruneSummary};
pub use config::MapConfig;
pub use error::{CoreError, CoreResult};
pub use id::{RecordId, SegmentId};
pub use partial::PartialCompactionMap;
pub use root::CompactionMapRoot;
pub use stats::{LayerTelemetry, MapStats, MapTelemetry, StatsSnapshot};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
