//! Exact nearest-neighbour index over page embeddings
//!
//! `FlatL2Index` holds the raw vectors; `VectorIndex` pairs it with the
//! slot → page docstore and owns persistence.

mod flat;
mod persist;
mod vector_index;

pub use flat::{l2_distance_squared, FlatL2Index};
pub use persist::{Manifest, FORMAT_VERSION};
pub use vector_index::VectorIndex;
