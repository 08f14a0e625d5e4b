use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::storage::{check_name, CacheStorage};
use crate::error::CacheError;
use crate::net::{RequestKey, Response};

type Entries = BTreeMap<RequestKey, Response>;

/// Process-local cache storage. Names and keys enumerate in sorted order.
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, Entries>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        check_name(name)?;
        self.caches.write().await.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn names(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<(), CacheError> {
        check_name(name)?;
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key, response);
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> Result<(), CacheError> {
        check_name(name)?;
        // Single write guard: readers see all of the batch or none of it
        let mut caches = self.caches.write().await;
        caches.entry(name.to_string()).or_default().extend(entries);
        Ok(())
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    fn entry(path: &str, body: &str) -> (RequestKey, Response) {
        let url = Url::parse("https://water.test/").unwrap().join(path).unwrap();
        (RequestKey::new("GET", &url), Response::new(&url, 200, body.to_string()))
    }

    #[tokio::test]
    async fn test_open_put_get_delete() {
        let storage = MemoryCacheStorage::new();
        storage.open("app-v1.0.0").await.unwrap();
        assert!(storage.has("app-v1.0.0").await.unwrap());

        let (key, response) = entry("/app/index.html", "<html>");
        storage.put("app-v1.0.0", key.clone(), response.clone()).await.unwrap();
        assert_eq!(storage.get("app-v1.0.0", &key).await.unwrap(), Some(response));
        assert_eq!(storage.get("other", &key).await.unwrap(), None);

        assert!(storage.delete("app-v1.0.0").await.unwrap());
        assert!(!storage.delete("app-v1.0.0").await.unwrap());
        assert!(storage.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let storage = MemoryCacheStorage::new();
        let (key, old) = entry("/app/app.js", "v1");
        let (_, new) = entry("/app/app.js", "v2");
        storage.put("app-v1", key.clone(), old).await.unwrap();
        storage.put("app-v1", key.clone(), new.clone()).await.unwrap();
        assert_eq!(storage.keys("app-v1").await.unwrap(), vec![key.clone()]);
        assert_eq!(storage.get("app-v1", &key).await.unwrap(), Some(new));
    }

    #[tokio::test]
    async fn test_put_all_and_keys() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all("app-v1", vec![entry("/b", "b"), entry("/a", "a")])
            .await
            .unwrap();
        let keys = storage.keys("app-v1").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].url.ends_with("/a"));
    }

    #[tokio::test]
    async fn test_rejects_bad_names() {
        let storage = MemoryCacheStorage::new();
        assert!(matches!(
            storage.open("../escape").await,
            Err(CacheError::InvalidName(_))
        ));
    }
}
