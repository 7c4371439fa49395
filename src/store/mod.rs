//! API definition persistence
//!
//! [`ApiDefinitionStore`] is the cache-aside layer over an interchangeable
//! [`DefinitionBackend`]: a Postgres backend (feature `database`) and a
//! static-file YAML backend. Documents are validated before they are
//! persisted and again as they come out of the cache; a cache key is only
//! deleted after a successful commit, so a racing reader sees either the old
//! or the new definition, never a half-replaced one.

mod cache;
mod file;
#[cfg(feature = "database")]
mod postgres;

pub use cache::{DefinitionCache, MemoryCache};
pub use file::FileBackend;
#[cfg(feature = "database")]
pub use postgres::PgBackend;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::definition::{validate_and_build, ApiDefinition, ApiDocument};
use crate::error::{EngineError, EngineResult, LookupError, StorageError};
use crate::schema::SchemaRegistry;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// One pluggable persistence backend
///
/// `persist` is full replace-by-slug and must be atomic: a crash mid-save
/// leaves the previous definition intact.
#[async_trait]
pub trait DefinitionBackend: Send + Sync {
    async fn fetch(&self, slug: &str) -> Result<Option<ApiDocument>, StorageError>;
    async fn persist(&self, doc: &ApiDocument) -> Result<(), StorageError>;
    async fn remove(&self, slug: &str) -> Result<bool, StorageError>;
    async fn slugs(&self) -> Result<Vec<String>, StorageError>;
}

/// Cache-aside store for API definitions
pub struct ApiDefinitionStore<B, C> {
    backend: B,
    cache: C,
    registry: SchemaRegistry,
    ttl: Duration,
}

impl<B: DefinitionBackend, C: DefinitionCache> ApiDefinitionStore<B, C> {
    pub fn new(backend: B, cache: C, registry: SchemaRegistry) -> Self {
        Self {
            backend,
            cache,
            registry,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Load and validate the definition for a slug
    ///
    /// A cache hit short-circuits the backend read entirely.
    pub async fn load(&self, slug: &str) -> EngineResult<ApiDefinition> {
        let key = cache_key(slug);
        let doc = match self.cache.get(&key) {
            Some(bytes) => {
                debug!(slug, "definition cache hit");
                serde_json::from_slice::<ApiDocument>(&bytes).map_err(StorageError::Json)?
            }
            None => {
                debug!(slug, "definition cache miss");
                let doc = self
                    .backend
                    .fetch(slug)
                    .await?
                    .ok_or_else(|| LookupError::SlugNotFound {
                        slug: slug.to_string(),
                    })?;
                let bytes = serde_json::to_vec(&doc).map_err(StorageError::Json)?;
                self.cache.set(&key, bytes, self.ttl);
                doc
            }
        };

        let schema = self.registry.resolve(&doc.app, &doc.model)?;
        Ok(validate_and_build(&doc, schema)?)
    }

    /// Validate and persist a definition document
    ///
    /// Validation precedes persistence: a structurally invalid document
    /// never reaches the backend. The cache key is deleted only after the
    /// backend commit; two racing saves may both delete, the loser's delete
    /// is a no-op.
    pub async fn save(&self, doc: &ApiDocument) -> EngineResult<()> {
        let schema = self.registry.resolve(&doc.app, &doc.model)?;
        validate_and_build(doc, schema)?;

        self.backend.persist(doc).await?;
        self.cache.delete(&cache_key(&doc.slug));
        info!(slug = %doc.slug, operation = %doc.operation, "definition saved");
        Ok(())
    }

    /// Remove a definition and its cache entry
    pub async fn delete(&self, slug: &str) -> EngineResult<()> {
        let removed = self.backend.remove(slug).await?;
        if !removed {
            return Err(EngineError::Lookup(LookupError::SlugNotFound {
                slug: slug.to_string(),
            }));
        }
        self.cache.delete(&cache_key(slug));
        info!(slug, "definition deleted");
        Ok(())
    }

    pub async fn slugs(&self) -> EngineResult<Vec<String>> {
        Ok(self.backend.slugs().await?)
    }
}

fn cache_key(slug: &str) -> String {
    format!("dynapi:def:{slug}")
}
