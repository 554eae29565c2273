use crate::adapters::{async_trait, AdapterError, Answer, SourceAdapter};
use crate::paper::{FieldValues, Paper};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

const CACHE_TTL_SECS: u64 = 86400 * 7; // 7 days

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to create cache directory: {0}")]
    CreateDir(std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct Cache {
    cache_dir: PathBuf,
    enabled: bool,
}

impl Cache {
    pub fn new(enabled: bool) -> Result<Self, CacheError> {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("papermatch");
        Self::at(cache_dir, enabled)
    }

    /// Cache rooted at an explicit directory
    pub fn at(cache_dir: PathBuf, enabled: bool) -> Result<Self, CacheError> {
        if enabled {
            fs::create_dir_all(&cache_dir).map_err(CacheError::CreateDir)?;
        }

        let cache = Self { cache_dir, enabled };
        if enabled {
            let removed = cache.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "removed expired cache entries");
            }
        }
        Ok(cache)
    }

    /// Generate a cache key from the API name and query
    fn cache_key(&self, api: &str, query: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_{}.json", api, query_hash(query)))
    }

    /// Delete cache files older than the TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read cache directory: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().map_or(false, |e| e == "json") || !is_expired(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), "Failed to remove cache entry: {}", e),
            }
        }
        removed
    }

    /// Get a cached response if it exists and is not expired
    pub fn get<T: DeserializeOwned>(&self, api: &str, query: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let path = self.cache_key(api, query);
        if !path.exists() {
            return None;
        }
        if is_expired(&path) {
            let _ = fs::remove_file(&path);
            return None;
        }

        let content = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Store a response in the cache
    pub fn set<T: Serialize>(&self, api: &str, query: &str, value: &T) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        let path = self.cache_key(api, query);
        let content = serde_json::to_string(value)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Clear all cached data
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.cache_dir.exists() {
            for entry in fs::read_dir(&self.cache_dir)? {
                let entry = entry?;
                if entry.path().extension().map_or(false, |e| e == "json") {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        Ok(())
    }
}

fn is_expired(path: &Path) -> bool {
    let age = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok());
    match age {
        Some(age) => age > Duration::from_secs(CACHE_TTL_SECS),
        // Unreadable timestamps count as expired
        None => true,
    }
}

/// First 16 hex digits of the query's SHA-256, identical across builds and platforms
fn query_hash(s: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(s.as_bytes()));
    digest[..16].to_string()
}

fn file_safe(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Serves repeated lookups from the cache. Only complete matches are cached,
/// so a paper a provider did not know yet is asked about again next time, and
/// so is one whose follow-up request failed.
pub struct CachedAdapter<A> {
    inner: A,
    cache: std::sync::Arc<Cache>,
    api: String,
}

impl<A: SourceAdapter> CachedAdapter<A> {
    pub fn new(inner: A, cache: std::sync::Arc<Cache>) -> Self {
        let mut api = file_safe(inner.name());
        let scope = inner.cache_scope();
        if !scope.is_empty() {
            api.push_str("__");
            api.push_str(&file_safe(&scope));
        }
        Self { inner, cache, api }
    }

    fn query_key(paper: &Paper) -> String {
        format!("{}|{}", paper.id, paper.normalized_title())
    }
}

#[async_trait]
impl<A: SourceAdapter> SourceAdapter for CachedAdapter<A> {
    async fn query(&self, paper: &Paper) -> Result<Option<FieldValues>, AdapterError> {
        Ok(self.lookup(paper).await?.map(|answer| answer.values))
    }

    async fn lookup(&self, paper: &Paper) -> Result<Option<Answer>, AdapterError> {
        let key = Self::query_key(paper);
        if let Some(cached) = self.cache.get::<FieldValues>(&self.api, &key) {
            tracing::debug!(paper = %paper.id, provider = self.inner.name(), "cache hit");
            return Ok(Some(Answer::complete(cached)));
        }

        let result = self.inner.lookup(paper).await?;
        match &result {
            Some(answer) if answer.complete => {
                if let Err(e) = self.cache.set(&self.api, &key, &answer.values) {
                    tracing::warn!("Failed to cache {} response: {}", self.inner.name(), e);
                }
            }
            Some(_) => {
                tracing::debug!(paper = %paper.id, provider = self.inner.name(), "incomplete answer not cached");
            }
            None => {}
        }
        Ok(result)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn cache_scope(&self) -> String {
        self.inner.cache_scope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Script, ScriptedAdapter};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn venue(v: &str) -> FieldValues {
        FieldValues {
            venue: Some(v.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path().to_path_buf(), true).unwrap();

        let data = FieldValues {
            venue: Some("ICML 2021".to_string()),
            ..Default::default()
        };

        cache.set("test_api", "query", &data).unwrap();
        let retrieved: Option<FieldValues> = cache.get("test_api", "query");

        assert_eq!(retrieved, Some(data));

        cache.clear().unwrap();
        assert!(cache.get::<FieldValues>("test_api", "query").is_none());
    }

    #[tokio::test]
    async fn test_cached_adapter_serves_second_lookup() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(Cache::at(dir.path().to_path_buf(), true).unwrap());
        let inner = ScriptedAdapter::venue("Papers with Code", "ICLR 2020");
        let calls = inner.calls();
        let adapter = CachedAdapter::new(inner, cache);

        let paper = Paper::new("Arxiv-1", "A Paper");
        let first = adapter.query(&paper).await.unwrap();
        let second = adapter.query(&paper).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_adapter_does_not_cache_misses() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(Cache::at(dir.path().to_path_buf(), true).unwrap());
        let inner = ScriptedAdapter::no_match("DBLP");
        let calls = inner.calls();
        let adapter = CachedAdapter::new(inner, cache);

        let paper = Paper::new("Arxiv-1", "A Paper");
        assert!(adapter.query(&paper).await.unwrap().is_none());
        assert!(adapter.query(&paper).await.unwrap().is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_incomplete_answers_are_not_cached() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(Cache::at(dir.path().to_path_buf(), true).unwrap());
        let inner = ScriptedAdapter::new("DBLP", Script::Partial(venue("NeurIPS 2020")));
        let calls = inner.calls();
        let adapter = CachedAdapter::new(inner, cache);

        let paper = Paper::new("Arxiv-1", "A Paper");
        let first = adapter.lookup(&paper).await.unwrap().unwrap();
        assert!(!first.complete);
        assert_eq!(first.values, venue("NeurIPS 2020"));
        assert!(adapter.query(&paper).await.unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_adapters_with_different_scopes_do_not_share_entries() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(Cache::at(dir.path().to_path_buf(), true).unwrap());
        let official = CachedAdapter::new(
            ScriptedAdapter::venue("Papers with Code", "ICLR 2020").scoped("official"),
            Arc::clone(&cache),
        );
        let pytorch_inner =
            ScriptedAdapter::venue("Papers with Code", "ICML 2020").scoped("pytorch");
        let pytorch_calls = pytorch_inner.calls();
        let pytorch = CachedAdapter::new(pytorch_inner, Arc::clone(&cache));

        let paper = Paper::new("Arxiv-1", "A Paper");
        official.query(&paper).await.unwrap();
        let answer = pytorch.query(&paper).await.unwrap();

        assert_eq!(answer, Some(venue("ICML 2020")));
        assert_eq!(pytorch_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_file_names_are_stable() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path().to_path_buf(), true).unwrap();
        let expected = format!("{:x}", Sha256::digest(b"Arxiv-1|a paper"));
        assert_eq!(
            cache.cache_key("dblp", "Arxiv-1|a paper"),
            dir.path().join(format!("dblp_{}.json", &expected[..16]))
        );
        assert_eq!(query_hash("same"), query_hash("same"));
        assert_ne!(query_hash("one"), query_hash("two"));
    }

    #[test]
    fn test_expired_entries_are_swept_on_open() {
        let dir = tempdir().unwrap();
        let cache = Cache::at(dir.path().to_path_buf(), true).unwrap();
        cache.set("dblp", "old", &venue("ICML 2019")).unwrap();
        cache.set("dblp", "fresh", &venue("ICML 2021")).unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let old = cache.cache_key("dblp", "old");
        let stale = SystemTime::now() - Duration::from_secs(CACHE_TTL_SECS + 3600);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(stale)
            .unwrap();

        let reopened = Cache::at(dir.path().to_path_buf(), true).unwrap();
        assert!(!old.exists());
        assert_eq!(reopened.get::<FieldValues>("dblp", "fresh"), Some(venue("ICML 2021")));
        assert!(dir.path().join("notes.txt").exists());
    }
}
