//! Version types
//!
//! This module provides:
//! - `GmuVersion` - immutable per-node vector clock tagged with a view id
//! - `VersionGenerator` - merge/min/max algebra and local re-stamping
//! - `VectorVersionGenerator` - the generator used by a node

mod generator;
mod vector;

pub use generator::{VectorVersionGenerator, VersionGenerator};
pub use vector::{GmuVersion, NodeIndex, ViewId};
