use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{CacheError, Response, ResponseKind};
use crate::utils::age_display;

/// Consider a cached response stale after 1 hour.
/// Only used for display; stale entries are still served when offline.
const CACHE_STALE_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        age_display(self.cached_at)
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// Everything about a cached response except its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub url: String,
    pub status: u16,
    pub kind: ResponseKind,
    pub headers: Vec<(String, String)>,
}

impl EntryMeta {
    fn from_response(url: &str, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            url: url.to_string(),
            status: response.status.as_u16(),
            kind: response.kind,
            headers,
        }
    }

    fn into_response(self, body: Bytes) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        Response::new(status, self.url, self.kind, headers, body)
    }
}

/// Root of all named cache generations.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root).map_err(|e| CacheError::io(&root, e))?;
        Ok(Self { root })
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(sanitize_name(name))
    }

    /// Open (creating if needed) the named cache.
    pub async fn open(&self, name: &str) -> Result<NamedCache, CacheError> {
        let dir = self.cache_dir(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        Ok(NamedCache {
            name: name.to_string(),
            dir,
        })
    }

    /// The named cache if its generation exists. Never creates it.
    pub async fn existing(&self, name: &str) -> Option<NamedCache> {
        if !self.has(name).await {
            return None;
        }
        Some(NamedCache {
            name: name.to_string(),
            dir: self.cache_dir(name),
        })
    }

    /// The key `name` is stored under, as listed by `keys`.
    pub fn key_for(name: &str) -> String {
        sanitize_name(name)
    }

    pub async fn has(&self, name: &str) -> bool {
        tokio::fs::metadata(self.cache_dir(name))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Keys of every cache generation, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| CacheError::io(&self.root, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a cache generation. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let dir = self.cache_dir(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&dir, e)),
        }
    }

    /// Look `url` up in every generation, in name order.
    pub async fn match_url(&self, url: &str) -> Result<Option<Response>, CacheError> {
        for name in self.keys().await? {
            let cache = NamedCache {
                dir: self.cache_dir(&name),
                name,
            };
            if let Some(response) = cache.match_url(url).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// One cache generation: a directory of `<hash>.json` metadata files and
/// `<hash>.body` payloads keyed by the SHA-256 of the request URL.
#[derive(Debug, Clone)]
pub struct NamedCache {
    name: String,
    dir: PathBuf,
}

impl NamedCache {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn paths(&self, url: &str) -> (PathBuf, PathBuf) {
        let key = hex::encode(Sha256::digest(url.as_bytes()));
        (
            self.dir.join(format!("{}.json", key)),
            self.dir.join(format!("{}.body", key)),
        )
    }

    /// Store `response` under `url`, consuming its body.
    pub async fn put(&self, url: &str, mut response: Response) -> Result<(), CacheError> {
        let meta = CachedData::new(EntryMeta::from_response(url, &response));
        let body = response.bytes()?;
        let (meta_path, body_path) = self.paths(url);

        // Body first: an entry exists once its metadata is in place
        write_atomic(&body_path, &body).await?;
        let contents = serde_json::to_vec_pretty(&meta)?;
        write_atomic(&meta_path, &contents).await?;
        debug!(cache = %self.name, url = url, "Cached response");
        Ok(())
    }

    pub async fn entry(&self, url: &str) -> Result<Option<CachedData<EntryMeta>>, CacheError> {
        let (meta_path, _) = self.paths(url);
        let contents = match tokio::fs::read(&meta_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&meta_path, e)),
        };
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    pub async fn match_url(&self, url: &str) -> Result<Option<Response>, CacheError> {
        let Some(cached) = self.entry(url).await? else {
            return Ok(None);
        };
        let (_, body_path) = self.paths(url);
        match tokio::fs::read(&body_path).await {
            Ok(body) => Ok(Some(cached.data.into_response(Bytes::from(body)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(cache = %self.name, url = url, "Cache entry missing its body");
                Ok(None)
            }
            Err(e) => Err(CacheError::io(&body_path, e)),
        }
    }

    pub async fn delete(&self, url: &str) -> Result<bool, CacheError> {
        let (meta_path, body_path) = self.paths(url);
        let existed = match tokio::fs::remove_file(&meta_path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(CacheError::io(&meta_path, e)),
        };
        let _ = tokio::fs::remove_file(&body_path).await;
        Ok(existed)
    }

    /// Number of stored entries.
    pub async fn len(&self) -> Result<usize, CacheError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;
        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Keep cache names safe to use as directory names inside the root.
fn sanitize_name(name: &str) -> String {
    let key: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // "", "." and ".." would resolve to the root or its parent
    if key.chars().all(|c| c == '.') {
        "_".repeat(key.len().max(1))
    } else {
        key
    }
}

/// Concurrent writers of the same entry each get their own temp file;
/// the last rename wins.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{:08x}.tmp", rand::random::<u32>()));
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| CacheError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::io(path, e))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use reqwest::header;

    fn css(body: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        Response::new(
            StatusCode::OK,
            "https://app.test/static/css/main.css",
            ResponseKind::Basic,
            headers,
            body,
        )
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(1);
        assert!(!fresh.is_stale());
        assert_eq!(fresh.age_display(), "just now");

        let mut old = CachedData::new(1);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale());
    }

    #[tokio::test]
    async fn test_put_then_match_round_trips_headers_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("funshiksha-v1").await.unwrap();
        let url = "https://app.test/static/css/main.css";

        cache.put(url, css("body{}")).await.unwrap();
        let mut hit = cache.match_url(url).await.unwrap().unwrap();
        assert_eq!(hit.status, StatusCode::OK);
        assert_eq!(hit.kind, ResponseKind::Basic);
        assert_eq!(hit.headers.get(header::CONTENT_TYPE).unwrap(), "text/css");
        assert_eq!(hit.text().unwrap(), "body{}");
        assert_eq!(cache.len().await.unwrap(), 1);

        assert!(cache.match_url("https://app.test/other").await.unwrap().is_none());
        assert!(storage.match_url(url).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_rejects_consumed_body() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("v1").await.unwrap();

        let mut response = css("x");
        response.bytes().unwrap();
        let err = cache.put("https://app.test/x", response).await.unwrap_err();
        assert!(matches!(err, CacheError::BodyUsed));
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keys_and_delete_generations() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        storage.open("funshiksha-v1").await.unwrap();
        storage.open("funshiksha-v2").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["funshiksha-v1", "funshiksha-v2"]);

        assert!(storage.delete("funshiksha-v1").await.unwrap());
        assert!(!storage.delete("funshiksha-v1").await.unwrap());
        assert!(!storage.has("funshiksha-v1").await);
        assert_eq!(storage.keys().await.unwrap(), vec!["funshiksha-v2"]);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        let cache = storage.open("v1").await.unwrap();
        cache.put("https://app.test/a", css("a")).await.unwrap();

        assert!(cache.delete("https://app.test/a").await.unwrap());
        assert!(!cache.delete("https://app.test/a").await.unwrap());
        assert!(cache.match_url("https://app.test/a").await.unwrap().is_none());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("funshiksha-v1"), "funshiksha-v1");
        assert_eq!(sanitize_name("funshiksha v2"), "funshiksha_v2");
        assert_eq!(sanitize_name("../etc"), ".._etc");
        assert_eq!(sanitize_name(".."), "__");
        assert_eq!(sanitize_name("."), "_");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(CacheStorage::key_for("funshiksha v2"), "funshiksha_v2");
    }

    #[tokio::test]
    async fn test_dot_names_stay_inside_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("cache");
        let storage = CacheStorage::new(root.clone()).unwrap();
        std::fs::write(parent.path().join("keep.txt"), "x").unwrap();

        storage.open("..").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["__"]);
        assert!(storage.delete("..").await.unwrap());
        assert!(!storage.delete(".").await.unwrap());

        assert!(root.is_dir());
        assert!(parent.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_existing_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.existing("funshiksha-v1").await.is_none());
        assert!(!storage.has("funshiksha-v1").await);

        storage.open("funshiksha-v1").await.unwrap();
        let cache = storage.existing("funshiksha-v1").await.unwrap();
        assert_eq!(cache.name(), "funshiksha-v1");
    }
}
