use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Mutex;
use tracing::debug;

use crate::config::ObjectStoreConnection;

/// Staging area for CSV objects. The warehouse loader reads back what the
/// publisher wrote, so the trait covers both directions.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    async fn put(&self, key: &str, body: &[u8]) -> Result<()>;

    /// Keys of all objects whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// S3-compatible object store.
///
/// Credentials are supplied per call: every operation builds a fresh bucket
/// handle from the connection record, nothing is cached or reused.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    bucket_name: String,
    connection: ObjectStoreConnection,
}

impl S3ObjectStore {
    pub fn new(bucket_name: impl Into<String>, connection: ObjectStoreConnection) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            connection,
        }
    }

    fn bucket(&self) -> Result<Box<Bucket>> {
        let credentials = Credentials::new(
            Some(&self.connection.access_key),
            Some(&self.connection.secret_key),
            None,
            None,
            None,
        )
        .context("Failed to create object store credentials")?;

        let region = if let Some(ref endpoint) = self.connection.endpoint {
            Region::Custom {
                region: self.connection.region.clone(),
                endpoint: endpoint.clone(),
            }
        } else {
            self.connection
                .region
                .parse()
                .context("Invalid object store region")?
        };

        let mut bucket = Bucket::new(&self.bucket_name, region, credentials)
            .context("Failed to create bucket handle")?;

        if self.connection.endpoint.is_some() {
            // Path-style addressing is required for MinIO-style endpoints.
            bucket = bucket.with_path_style();
        }

        Ok(bucket)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let bucket = self.bucket()?;
        let response = bucket
            .put_object(key, body)
            .await
            .with_context(|| format!("Failed to upload object '{key}'"))?;

        debug!(key, status = response.status_code(), "Uploaded object");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let bucket = self.bucket()?;
        let pages = bucket
            .list(prefix.to_string(), None)
            .await
            .with_context(|| format!("Failed to list objects under '{prefix}'"))?;

        let keys = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect();

        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let bucket = self.bucket()?;
        let response = bucket
            .get_object(key)
            .await
            .with_context(|| format!("Failed to download object '{key}'"))?;

        Ok(response.bytes().to_vec())
    }
}

/// In-memory store for tests and local development. Keys are ordered so
/// listings are deterministic.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail, for exercising the publisher's
    /// swallow-and-log path.
    pub fn failing() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            fail_writes: true,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow::anyhow!("simulated credential error"));
        }

        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("object store lock poisoned"))?;
        objects.insert(key.to_string(), body.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("object store lock poisoned"))?;
        Ok(objects.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow::anyhow!("object store lock poisoned"))?;
        objects
            .get(key)
            .cloned()
            .with_context(|| format!("No such object '{key}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_lists_by_prefix() {
        let store = MemoryObjectStore::new();
        store.put("weather_data_a.csv", b"a").await.unwrap();
        store.put("weather_data_b.csv", b"b").await.unwrap();
        store.put("unrelated.txt", b"c").await.unwrap();

        let keys = store.list("weather_data_").await.unwrap();
        assert_eq!(keys, vec!["weather_data_a.csv", "weather_data_b.csv"]);
    }

    #[tokio::test]
    async fn failing_store_rejects_writes() {
        let store = MemoryObjectStore::failing();
        assert!(store.put("k", b"v").await.is_err());
        assert!(store.is_empty());
    }
}
