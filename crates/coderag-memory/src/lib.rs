//! Namespaced vector storage: a Qdrant adapter and an in-process store with
//! identical semantics.

pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::{QdrantOps, QdrantSettings};
pub use vector_store::{
    NAMESPACE_FIELD, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
};
