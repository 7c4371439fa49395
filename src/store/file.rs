//! Static-file definition backend
//!
//! One YAML document per slug in a flat directory. The directory is read
//! once at construction into a snapshot; `reload` rescans explicitly. The
//! instance is injected wherever it is needed — there is no process-wide
//! cache of loaded files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::DefinitionBackend;
use crate::definition::ApiDocument;
use crate::error::StorageError;

pub struct FileBackend {
    dir: PathBuf,
    snapshot: RwLock<HashMap<String, ApiDocument>>,
}

impl FileBackend {
    /// Open a directory of `<slug>.yaml` documents, loading the snapshot
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let snapshot = Self::scan(&dir)?;
        info!(dir = %dir.display(), definitions = snapshot.len(), "file backend loaded");
        Ok(Self {
            dir,
            snapshot: RwLock::new(snapshot),
        })
    }

    /// Rescan the directory, replacing the snapshot
    pub async fn reload(&self) -> Result<usize, StorageError> {
        let fresh = Self::scan(&self.dir)?;
        let count = fresh.len();
        *self.snapshot.write().await = fresh;
        info!(dir = %self.dir.display(), definitions = count, "file backend reloaded");
        Ok(count)
    }

    fn scan(dir: &Path) -> Result<HashMap<String, ApiDocument>, StorageError> {
        let mut docs = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            match serde_yaml::from_str::<ApiDocument>(&text) {
                Ok(doc) => {
                    docs.insert(doc.slug.clone(), doc);
                }
                Err(err) => {
                    // A broken file must not take down the rest of the set
                    warn!(path = %path.display(), %err, "skipping unparseable definition file");
                }
            }
        }
        Ok(docs)
    }

    fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.yaml"))
    }
}

#[async_trait]
impl DefinitionBackend for FileBackend {
    async fn fetch(&self, slug: &str) -> Result<Option<ApiDocument>, StorageError> {
        Ok(self.snapshot.read().await.get(slug).cloned())
    }

    async fn persist(&self, doc: &ApiDocument) -> Result<(), StorageError> {
        let text = serde_yaml::to_string(doc)?;
        // Write-then-rename so a crash mid-write never leaves a torn file
        let tmp = self.path_for(&doc.slug).with_extension("yaml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, self.path_for(&doc.slug))?;
        self.snapshot
            .write()
            .await
            .insert(doc.slug.clone(), doc.clone());
        Ok(())
    }

    async fn remove(&self, slug: &str) -> Result<bool, StorageError> {
        let existed = self.snapshot.write().await.remove(slug).is_some();
        if existed {
            std::fs::remove_file(self.path_for(slug))?;
        }
        Ok(existed)
    }

    async fn slugs(&self) -> Result<Vec<String>, StorageError> {
        let mut slugs: Vec<String> = self.snapshot.read().await.keys().cloned().collect();
        slugs.sort();
        Ok(slugs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(slug: &str) -> ApiDocument {
        serde_json::from_value(json!({
            "slug": slug, "app": "blog", "model": "article", "operation": "list"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn persist_fetch_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.persist(&doc("s1")).await.unwrap();
        assert!(backend.fetch("s1").await.unwrap().is_some());
        assert!(dir.path().join("s1.yaml").exists());

        assert!(backend.remove("s1").await.unwrap());
        assert!(backend.fetch("s1").await.unwrap().is_none());
        assert!(!dir.path().join("s1.yaml").exists());
        assert!(!backend.remove("s1").await.unwrap());
    }

    #[tokio::test]
    async fn open_loads_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.persist(&doc("a")).await.unwrap();
            backend.persist(&doc("b")).await.unwrap();
        }
        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.slugs().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.fetch("ext").await.unwrap().is_none());

        let text = serde_yaml::to_string(&doc("ext")).unwrap();
        std::fs::write(dir.path().join("ext.yaml"), text).unwrap();
        backend.reload().await.unwrap();
        assert!(backend.fetch("ext").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn broken_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), ":: not yaml [").unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.persist(&doc("good")).await.unwrap();
        assert_eq!(backend.slugs().await.unwrap(), vec!["good"]);
    }
}
