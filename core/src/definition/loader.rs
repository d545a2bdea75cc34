// trancode/src/definition/loader.rs

//! Sources of transaction-code definitions: JSON files on disk, a document
//! store collection, and a memoizing decorator for either.

use crate::core::value::Value;
use crate::definition::model::TransactionCode;
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Collection holding transaction-code documents.
pub const TRANCODE_COLLECTION: &str = "Tran_Code";
/// Document field a transaction code is looked up by.
pub const TRANCODE_NAME_FIELD: &str = "trancodename";

/// Resolves a transaction-code name to its definition.
///
/// "Not found" (`EngineError::TranCodeNotFound`) must stay distinguishable from
/// a definition that exists but cannot be parsed (`Deserialization` /
/// `InvalidDefinition`).
#[async_trait]
pub trait DefinitionLoader: Send + Sync {
  async fn load(&self, name: &str) -> EngineResult<Arc<TransactionCode>>;
}

// --- Files ---

/// Reads `<dir>/<name>.json` through `tokio::fs`, so it must be driven by a
/// Tokio runtime.
#[derive(Debug, Clone)]
pub struct FileDefinitionLoader {
  dir: PathBuf,
}

impl FileDefinitionLoader {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn path_for(&self, name: &str) -> PathBuf {
    self.dir.join(format!("{}.json", name))
  }
}

#[async_trait]
impl DefinitionLoader for FileDefinitionLoader {
  #[instrument(name = "FileDefinitionLoader::load", skip(self), fields(dir = %self.dir.display()), err(Display))]
  async fn load(&self, name: &str) -> EngineResult<Arc<TransactionCode>> {
    // Names come from requests; keep them inside the definition directory.
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
      event!(Level::WARN, "Rejected transaction code name that is not a plain file stem.");
      return Err(EngineError::TranCodeNotFound { name: name.to_string() });
    }

    let path = self.path_for(name);
    let text = match tokio::fs::read_to_string(&path).await {
      Ok(text) => text,
      Err(e) if e.kind() == IoErrorKind::NotFound => {
        event!(Level::DEBUG, path = %path.display(), "Definition file does not exist.");
        return Err(EngineError::TranCodeNotFound { name: name.to_string() });
      }
      Err(e) => {
        return Err(EngineError::Internal(format!("failed to read {}: {}", path.display(), e)));
      }
    };

    let code = TransactionCode::from_json_str(&path.display().to_string(), &text)?;
    if code.name != name {
      event!(Level::WARN, file_name = %name, definition_name = %code.name, "Definition name differs from its file name.");
    }
    Ok(Arc::new(code))
  }
}

// --- Document store ---

/// Minimal query surface of a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// All documents in `collection` whose `field` equals `value`.
  async fn find(&self, collection: &str, field: &str, value: &Value) -> anyhow::Result<Vec<Value>>;
}

/// Loads definitions from the `Tran_Code` collection, preferring the document
/// flagged `isdefault` when several versions share a name.
pub struct DocumentStoreLoader<S: DocumentStore> {
  store: Arc<S>,
  collection: String,
}

impl<S: DocumentStore> DocumentStoreLoader<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      collection: TRANCODE_COLLECTION.to_string(),
    }
  }

  pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
    self.collection = collection.into();
    self
  }
}

#[async_trait]
impl<S: DocumentStore> DefinitionLoader for DocumentStoreLoader<S> {
  #[instrument(name = "DocumentStoreLoader::load", skip(self), fields(collection = %self.collection), err(Display))]
  async fn load(&self, name: &str) -> EngineResult<Arc<TransactionCode>> {
    let docs = self
      .store
      .find(&self.collection, TRANCODE_NAME_FIELD, &Value::String(name.to_string()))
      .await
      .map_err(|source| EngineError::HandlerError { source })?;

    let chosen = docs
      .iter()
      .position(|d| d.get("isdefault").and_then(Value::as_bool).unwrap_or(false))
      .or(if docs.is_empty() { None } else { Some(0) });

    let Some(idx) = chosen else {
      event!(Level::DEBUG, "No document matched.");
      return Err(EngineError::TranCodeNotFound { name: name.to_string() });
    };
    event!(Level::TRACE, matches = docs.len(), chosen = idx, "Document selected.");

    let doc = docs.into_iter().nth(idx).unwrap_or(Value::Null);
    let label = format!("{}[{}={}]", self.collection, TRANCODE_NAME_FIELD, name);
    Ok(Arc::new(TransactionCode::from_value(&label, doc)?))
  }
}

/// Process-local document store, mostly for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
  collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryDocumentStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, collection: &str, document: Value) {
    self
      .collections
      .write()
      .entry(collection.to_string())
      .or_default()
      .push(document);
  }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
  async fn find(&self, collection: &str, field: &str, value: &Value) -> anyhow::Result<Vec<Value>> {
    let guard = self.collections.read();
    Ok(
      guard
        .get(collection)
        .map(|docs| docs.iter().filter(|d| d.get(field) == Some(value)).cloned().collect())
        .unwrap_or_default(),
    )
  }
}

// --- Caching ---

/// Memoizes successful loads of an inner loader. Failures are not cached.
pub struct CachingLoader<L: DefinitionLoader> {
  inner: L,
  cache: RwLock<HashMap<String, Arc<TransactionCode>>>,
}

impl<L: DefinitionLoader> CachingLoader<L> {
  pub fn new(inner: L) -> Self {
    Self {
      inner,
      cache: RwLock::new(HashMap::new()),
    }
  }

  pub fn invalidate(&self, name: &str) {
    self.cache.write().remove(name);
  }

  pub fn clear(&self) {
    self.cache.write().clear();
  }

  pub fn len(&self) -> usize {
    self.cache.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.cache.read().is_empty()
  }
}

#[async_trait]
impl<L: DefinitionLoader> DefinitionLoader for CachingLoader<L> {
  async fn load(&self, name: &str) -> EngineResult<Arc<TransactionCode>> {
    let cached = self.cache.read().get(name).cloned();
    if let Some(hit) = cached {
      event!(Level::TRACE, trancode = %name, "Definition cache hit.");
      return Ok(hit);
    }
    let loaded = self.inner.load(name).await?;
    self.cache.write().insert(name.to_string(), loaded.clone());
    Ok(loaded)
  }
}

/// Lets an `Arc<dyn DefinitionLoader>` be wrapped by `CachingLoader`.
#[async_trait]
impl DefinitionLoader for Arc<dyn DefinitionLoader> {
  async fn load(&self, name: &str) -> EngineResult<Arc<TransactionCode>> {
    (**self).load(name).await
  }
}
