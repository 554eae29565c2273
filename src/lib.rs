pub mod adapters;
pub mod batch;
pub mod bibtex;
pub mod cache;
pub mod export;
pub mod gate;
pub mod import;
pub mod matcher;
pub mod merge;
pub mod paper;
pub mod progress;
pub mod report;
pub mod resolver;
pub mod sources;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

use adapters::{
    crossref::CrossRefAdapter, dblp::DblpAdapter, pwc::PapersWithCodeAdapter, pwc::PwcPrefs,
    AdapterError, SourceAdapter,
};
use cache::{Cache, CachedAdapter};
use paper::{Field, FieldValues, Paper, PendingUpdate};
use sources::KnownSource;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Configuration for the reconciliation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub use_pwc: bool,
    pub use_dblp: bool,
    pub use_crossref: bool,
    pub cache_enabled: bool,
    pub pwc: PwcPrefs,
    /// Sources whose pages bulk import treats as unrecognized
    pub ignored_sources: BTreeSet<KnownSource>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_pwc: true,
            use_dblp: true,
            use_crossref: true,
            cache_enabled: true,
            pwc: PwcPrefs::default(),
            ignored_sources: BTreeSet::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Cache(#[from] cache::CacheError),
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] AdapterError),
}

/// Where a paper's cascade currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    NotStarted,
    Querying(usize),
    Merging,
    Done,
}

/// Everything one cascade produced for one paper
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Values gathered from providers, before comparison with the paper
    pub staged: FieldValues,
    /// Providers asked, in order
    pub consulted: Vec<&'static str>,
    /// Providers that failed, with the error text
    pub failures: Vec<(&'static str, String)>,
    /// Proposed changes, absent when nothing would change
    pub update: Option<PendingUpdate>,
}

/// Drives the provider cascade for one paper at a time
pub struct Reconciler {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl Reconciler {
    /// Build the standard cascade: Papers with Code, then DBLP, then CrossRef
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let cache = Arc::new(Cache::new(config.cache_enabled)?);
        let client = adapters::http_client()?;

        let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
        if config.use_pwc {
            let pwc = PapersWithCodeAdapter::new(client.clone(), config.pwc.clone());
            adapters.push(Box::new(CachedAdapter::new(pwc, Arc::clone(&cache))));
        }
        if config.use_dblp {
            let dblp = DblpAdapter::new(client.clone());
            adapters.push(Box::new(CachedAdapter::new(dblp, Arc::clone(&cache))));
        }
        if config.use_crossref {
            let crossref = CrossRefAdapter::new(client);
            adapters.push(Box::new(CachedAdapter::new(crossref, cache)));
        }
        Ok(Self::with_adapters(adapters))
    }

    /// Use the given providers, highest priority first
    pub fn with_adapters(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Run the cascade for one paper.
    ///
    /// Providers are asked one after another and the cascade stops as soon as
    /// a venue is known. A failing provider counts as having no match.
    pub async fn reconcile(&self, paper: &Paper) -> Reconciliation {
        let mut result = Reconciliation::default();
        let mut state = CascadeState::NotStarted;
        tracing::debug!(paper = %paper.id, ?state, "reconciling");

        for (index, adapter) in self.adapters.iter().enumerate() {
            state = CascadeState::Querying(index);
            tracing::debug!(paper = %paper.id, provider = adapter.name(), ?state, "querying");
            result.consulted.push(adapter.name());

            let venue_found = match adapter.query(paper).await {
                Ok(Some(found)) => {
                    merge::stage(paper, &mut result.staged, &found);
                    found.get(Field::Venue).is_some_and(|v| !v.trim().is_empty())
                }
                Ok(None) => {
                    tracing::debug!(paper = %paper.id, provider = adapter.name(), "no match");
                    false
                }
                Err(e) => {
                    tracing::warn!(paper = %paper.id, provider = adapter.name(), "provider failed: {}", e);
                    result.failures.push((adapter.name(), e.to_string()));
                    false
                }
            };

            if venue_found {
                break;
            }
        }

        state = CascadeState::Merging;
        tracing::debug!(paper = %paper.id, ?state, "merging");
        result.update = merge::pending_update(paper, &result.staged);

        state = CascadeState::Done;
        tracing::debug!(
            paper = %paper.id,
            ?state,
            changed = result.update.is_some(),
            "reconciled"
        );
        result
    }
}
