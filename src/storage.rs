// src/storage.rs

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::{config::Config, error::AppError};

/// Object storage for images. Returned URLs are publicly fetchable and stable
/// for a given key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key`. Without `upsert` an existing key is an error.
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<(), AppError>;

    fn public_url(&self, key: &str) -> Result<Url, AppError>;
}

/// Rejects keys that could escape the bucket root.
fn checked_key(key: &str) -> Result<&Path, AppError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if safe {
        Ok(path)
    } else {
        Err(AppError::Upload(format!("invalid object key: {key}")))
    }
}

fn join_public(base: &Url, key: &str) -> Result<Url, AppError> {
    checked_key(key)?;
    base.join(key)
        .map_err(|e| AppError::Upload(format!("cannot build public url for {key}: {e}")))
}

/// Files under a root directory, served elsewhere at `public_base`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: Url,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base: Url) -> Self {
        Self {
            root: root.into(),
            public_base,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_root.clone(), config.storage_public_url.clone())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
        upsert: bool,
    ) -> Result<(), AppError> {
        let path = self.root.join(checked_key(key)?);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Upload(e.to_string()))?;
        }

        if !upsert && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::Upload(format!("object {key} already exists")));
        }

        tokio::fs::write(&path, bytes).await.map_err(|e| {
            tracing::error!("Failed to write {}: {:?}", path.display(), e);
            AppError::Upload(e.to_string())
        })
    }

    fn public_url(&self, key: &str) -> Result<Url, AppError> {
        join_public(&self.public_base, key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process store for tests. Can be told to start failing after a number
/// of successful puts.
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    remaining_successes: Mutex<Option<usize>>,
    public_base: Url,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new(Config::for_tests().storage_public_url)
    }
}

impl MemoryObjectStore {
    pub fn new(public_base: Url) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            remaining_successes: Mutex::new(None),
            public_base,
        }
    }

    /// The next `successes` puts succeed, every later one fails.
    pub fn fail_after(&self, successes: usize) {
        *lock(&self.remaining_successes) = Some(successes);
    }

    pub fn heal(&self) {
        *lock(&self.remaining_successes) = None;
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        lock(&self.objects).get(key).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<(), AppError> {
        tokio::task::yield_now().await;
        checked_key(key)?;

        if let Some(remaining) = lock(&self.remaining_successes).as_mut() {
            if *remaining == 0 {
                return Err(AppError::Upload(format!("storage rejected {key}")));
            }
            *remaining -= 1;
        }

        let mut objects = lock(&self.objects);
        if !upsert && objects.contains_key(key) {
            return Err(AppError::Upload(format!("object {key} already exists")));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> Result<Url, AppError> {
        join_public(&self.public_base, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_cannot_escape_the_root() {
        assert!(checked_key("user/1.png").is_ok());
        assert!(checked_key("../secret").is_err());
        assert!(checked_key("/etc/passwd").is_err());
        assert!(checked_key("a/./b").is_ok());
        assert!(checked_key("").is_err());
    }

    #[tokio::test]
    async fn local_store_writes_under_root() {
        let root = std::env::temp_dir().join(format!("lastbench-{}", uuid::Uuid::new_v4()));
        let store = LocalObjectStore::new(
            root.clone(),
            Url::parse("https://cdn.example.com/pics/").unwrap(),
        );

        store.put("u1/a.png", b"png", "image/png", false).await.unwrap();
        assert_eq!(std::fs::read(root.join("u1/a.png")).unwrap(), b"png");
        assert!(store.put("u1/a.png", b"again", "image/png", false).await.is_err());
        store.put("u1/a.png", b"again", "image/png", true).await.unwrap();

        assert_eq!(
            store.public_url("u1/a.png").unwrap().as_str(),
            "https://cdn.example.com/pics/u1/a.png"
        );
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn memory_store_fails_after_budget() {
        let store = MemoryObjectStore::default();
        store.fail_after(1);
        assert!(store.put("a", b"1", "image/png", false).await.is_ok());
        assert!(matches!(
            store.put("b", b"2", "image/png", false).await,
            Err(AppError::Upload(_))
        ));
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }
}
