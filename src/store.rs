use crate::paper::Paper;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Keys starting with this prefix hold library metadata, not papers
const RESERVED_PREFIX: &str = "__";

pub type PaperMap = BTreeMap<String, Paper>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed library file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Malformed paper '{id}': {source}")]
    Paper {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable map from paper id to paper record.
///
/// Callers read the whole map, change one entry and write the whole map back;
/// writes are not versioned, so concurrent writers must be serialized by the caller.
#[async_trait]
pub trait PaperStore: Send + Sync {
    async fn get_all(&self) -> Result<PaperMap, StoreError>;

    async fn put_all(&self, papers: &PaperMap) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Paper>, StoreError> {
        Ok(self.get_all().await?.remove(id))
    }
}

/// Library kept as one JSON object on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/papermatch/papers.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("papermatch")
            .join("papers.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_raw(&self) -> Result<serde_json::Map<String, Value>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Default::default()),
            Err(e) => return Err(self.io_error(e)),
        };
        if content.trim().is_empty() {
            return Ok(Default::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Format {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl PaperStore for JsonFileStore {
    /// Records that do not parse as papers are skipped with a warning.
    /// They stay in the file untouched.
    async fn get_all(&self) -> Result<PaperMap, StoreError> {
        let raw = self.read_raw().await?;
        let mut papers = PaperMap::new();
        for (id, value) in raw {
            if id.starts_with(RESERVED_PREFIX) {
                continue;
            }
            match serde_json::from_value::<Paper>(value) {
                Ok(paper) => {
                    papers.insert(id, paper);
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), paper = %id, "skipping malformed paper: {}", e);
                }
            }
        }
        Ok(papers)
    }

    async fn put_all(&self, papers: &PaperMap) -> Result<(), StoreError> {
        // Carry over reserved keys such as __dataVersion, and records we could not read
        let mut out: serde_json::Map<String, Value> = self
            .read_raw()
            .await?
            .into_iter()
            .filter(|(k, v)| {
                !papers.contains_key(k)
                    && (k.starts_with(RESERVED_PREFIX)
                        || serde_json::from_value::<Paper>(v.clone()).is_err())
            })
            .collect();
        for (id, paper) in papers {
            let value = serde_json::to_value(paper).map_err(|source| StoreError::Paper {
                id: id.clone(),
                source,
            })?;
            out.insert(id.clone(), value);
        }

        let content = serde_json::to_string_pretty(&out).map_err(|source| StoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), papers = papers.len(), "library written");
        Ok(())
    }
}

/// In-memory library
#[derive(Default)]
pub struct MemoryStore {
    papers: Mutex<PaperMap>,
    writes: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
    pub fn new(papers: impl IntoIterator<Item = Paper>) -> Self {
        Self {
            papers: Mutex::new(papers.into_iter().map(|p| (p.id.clone(), p)).collect()),
            writes: Default::default(),
        }
    }

    /// Number of completed `put_all` calls
    pub fn writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn get_all(&self) -> Result<PaperMap, StoreError> {
        Ok(self.papers.lock().await.clone())
    }

    async fn put_all(&self, papers: &PaperMap) -> Result<(), StoreError> {
        *self.papers.lock().await = papers.clone();
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
