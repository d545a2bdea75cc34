// trancode/src/definition/mod.rs

//! Transaction-code definitions and where they are loaded from.

pub mod loader;
pub mod model;

pub use loader::{CachingLoader, DefinitionLoader, DocumentStore, DocumentStoreLoader, FileDefinitionLoader, InMemoryDocumentStore};
pub use model::{
  DataType, FunctionDef, FunctionGroupDef, InputBinding, InputSource, OutputBinding, OutputTarget, RouterDef,
  TransactionCode,
};
