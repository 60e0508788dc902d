//! Function-level code RAG pipeline.
//!
//! Source files are walked, parsed with tree-sitter into function-level code
//! units, embedded, and stored in a per-repository namespace of the vector
//! index. At query time the closest units are framed into one augmented
//! prompt for a downstream assistant.

pub mod assembler;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod languages;
pub mod namespace;
pub mod state;
pub mod store;
pub mod walker;

pub use assembler::{AssembledContext, ContextAssembler, Match, RetrievalConfig};
pub use error::{IndexError, Result};
pub use extractor::{CodeUnit, ExtractOptions, SourceFile, UnitKind, extract_file, extract_units};
pub use indexer::{CodeIndexer, FailureKind, IndexerConfig, IngestFailure, IngestReport};
pub use namespace::{Namespace, NamespacePolicy};
pub use state::IngestState;
pub use store::CodeStore;
