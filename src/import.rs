use crate::batch::{run_batch, StepResult};
use crate::merge;
use crate::paper::Paper;
use crate::progress::{ItemOutcome, ProgressSink};
use crate::report::BatchReport;
use crate::resolver::{PaperResolver, ResolveError};
use crate::sources::{self, KnownSource};
use crate::store::{PaperStore, StoreError};
use crate::Reconciler;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Import file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Import file must contain a JSON array of papers")]
    NotAList,
    /// `index` is zero-based; the message counts entries from 1
    #[error("Invalid entry {}: {}", .index + 1, .reason)]
    Invalid { index: usize, reason: String },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One paper to import: a page URL plus optional overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDescriptor {
    pub url: String,
    /// Used only when the resolved record has no title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_link: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ImportDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            code_link: None,
            tags: Vec::new(),
        }
    }
}

/// Parse an import file: a JSON array of URL strings or `{url, title?, codeLink?, tags?}` objects
pub fn parse_descriptors(json: &str) -> Result<Vec<ImportDescriptor>, ImportError> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Array(entries) = value else {
        return Err(ImportError::NotAList);
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_entry(index, entry))
        .collect()
}

fn parse_entry(index: usize, entry: Value) -> Result<ImportDescriptor, ImportError> {
    let invalid = |reason: &str| ImportError::Invalid {
        index,
        reason: reason.to_string(),
    };

    let mut object = match entry {
        Value::String(url) => return Ok(ImportDescriptor::new(url)),
        Value::Object(object) => object,
        _ => return Err(invalid("expected a URL string or an object")),
    };

    let url = match object.remove("url") {
        Some(Value::String(url)) => url,
        Some(_) => return Err(invalid("\"url\" must be a string")),
        None => return Err(invalid("missing \"url\"")),
    };

    // Informational; a title of any other type is ignored
    let title = match object.remove("title") {
        Some(Value::String(title)) if !title.trim().is_empty() => Some(title),
        _ => None,
    };

    let code_link = match object.remove("codeLink") {
        None | Some(Value::Null) => None,
        Some(Value::String(link)) => Some(link),
        Some(_) => return Err(invalid("\"codeLink\" must be a string")),
    };

    let tags = match object.remove("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(tags)) => tags
            .into_iter()
            .filter_map(|t| match t {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        Some(_) => return Err(invalid("\"tags\" must be a list")),
    };

    Ok(ImportDescriptor {
        url,
        title,
        code_link,
        tags,
    })
}

fn parse_web_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("'{}' is not a valid URL: {}", raw, e))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(format!("'{}' is not an http(s) URL", raw));
    }
    Ok(url)
}

/// Check every descriptor before anything is fetched.
///
/// The first bad entry fails the whole import.
pub fn validate(descriptors: &[ImportDescriptor]) -> Result<Vec<Url>, ImportError> {
    descriptors
        .iter()
        .enumerate()
        .map(|(index, d)| {
            let url = parse_web_url(&d.url).map_err(|reason| ImportError::Invalid { index, reason })?;
            if let Some(link) = &d.code_link {
                parse_web_url(link).map_err(|reason| ImportError::Invalid {
                    index,
                    reason: format!("codeLink: {}", reason),
                })?;
            }
            Ok(url)
        })
        .collect()
}

/// Bulk import of papers from page URLs.
///
/// Unlike library matching, imported papers are written immediately.
pub struct Importer<'a> {
    store: &'a dyn PaperStore,
    resolver: &'a dyn PaperResolver,
    reconciler: &'a Reconciler,
    ignored: BTreeSet<KnownSource>,
}

impl<'a> Importer<'a> {
    pub fn new(
        store: &'a dyn PaperStore,
        resolver: &'a dyn PaperResolver,
        reconciler: &'a Reconciler,
    ) -> Self {
        Self {
            store,
            resolver,
            reconciler,
            ignored: BTreeSet::new(),
        }
    }

    /// Treat pages from these sources as unrecognized
    pub fn ignoring(mut self, sources: impl IntoIterator<Item = KnownSource>) -> Self {
        self.ignored.extend(sources);
        self
    }

    /// Parse, validate and import the contents of an import file
    pub async fn run_json(
        &self,
        json: &str,
        sink: &mut dyn ProgressSink,
    ) -> Result<BatchReport, ImportError> {
        let descriptors = parse_descriptors(json)?;
        self.run(descriptors, sink).await
    }

    /// Validate every descriptor, then import them one at a time
    pub async fn run(
        &self,
        descriptors: Vec<ImportDescriptor>,
        sink: &mut dyn ProgressSink,
    ) -> Result<BatchReport, ImportError> {
        let urls = validate(&descriptors)?;
        tracing::info!(entries = descriptors.len(), "importing papers");

        let items: Vec<(ImportDescriptor, Url)> = descriptors.into_iter().zip(urls).collect();
        let (report, _) = run_batch(
            items,
            |(d, _)| d.url.clone(),
            sink,
            move |(descriptor, url)| self.import_one(descriptor, url),
        )
        .await;
        Ok(report)
    }

    async fn import_one(
        &self,
        descriptor: ImportDescriptor,
        url: Url,
    ) -> Result<StepResult<()>, ImportError> {
        let Some(source) = sources::classify(&url) else {
            return Ok(StepResult::new(
                ItemOutcome::SkippedUnrecognized,
                "not a known paper page",
            ));
        };
        if self.ignored.contains(&source.source) {
            return Ok(StepResult::new(
                ItemOutcome::SkippedUnrecognized,
                format!("{} pages are disabled", source.source),
            ));
        }
        if !self.resolver.supports(source.source) {
            return Ok(StepResult::new(
                ItemOutcome::SkippedUnrecognized,
                format!("no resolver for {} pages", source.source),
            ));
        }

        if self.store.get(&source.paper_id).await?.is_some() {
            return Ok(duplicate(&source.paper_id));
        }

        let mut paper = self.resolver.resolve(&source).await?;
        let result = self.reconciler.reconcile(&paper).await;
        if let Some(update) = &result.update {
            merge::apply(&mut paper, &update.changes);
        }
        apply_overrides(&mut paper, &descriptor);
        paper.add_date = Some(Utc::now());

        // Read-modify-write; another writer may have added the paper meanwhile
        let mut papers = self.store.get_all().await?;
        if papers.contains_key(&paper.id) {
            return Ok(duplicate(&paper.id));
        }
        let detail = match &paper.venue {
            Some(venue) => format!("{} ({})", paper.id, venue),
            None => format!("{} (no venue found)", paper.id),
        };
        tracing::debug!(paper = %paper.id, "imported");
        papers.insert(paper.id.clone(), paper);
        self.store.put_all(&papers).await?;

        Ok(StepResult::new(ItemOutcome::Success, detail))
    }
}

fn duplicate(paper_id: &str) -> StepResult<()> {
    StepResult::new(
        ItemOutcome::Duplicate,
        format!("{} already in library, ignored", paper_id),
    )
}

/// Values given in the import file take precedence over provider results
fn apply_overrides(paper: &mut Paper, descriptor: &ImportDescriptor) {
    if paper.title.trim().is_empty() {
        if let Some(title) = &descriptor.title {
            paper.title = title.trim().to_string();
        }
    }
    if let Some(link) = &descriptor.code_link {
        paper.code_link = Some(link.trim().to_string());
    }
    if !descriptor.tags.is_empty() {
        paper.tags = descriptor.tags.iter().cloned().collect();
    }
}
