//! Vector index: collection naming and the manager over a vector store

mod manager;
mod naming;

pub use manager::VectorIndexManager;
pub use naming::{point_id, CollectionNamer};
