use crate::bibtex;
use crate::import::ImportDescriptor;
use crate::paper::Paper;
use crate::store::PaperMap;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// All bibtex entries in one `.bib` file
    Bib,
    /// JSON object from paper id to bibtex
    BibJson,
    /// Import descriptors with code links and tags
    Json,
    /// Import descriptors as bare URLs
    JsonUrls,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bib" => Ok(ExportFormat::Bib),
            "bib-json" => Ok(ExportFormat::BibJson),
            "json" => Ok(ExportFormat::Json),
            "json-urls" => Ok(ExportFormat::JsonUrls),
            other => Err(format!(
                "unknown format '{}' (expected bib, bib-json, json or json-urls)",
                other
            )),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Bib => write!(f, "bib"),
            ExportFormat::BibJson => write!(f, "bib-json"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::JsonUrls => write!(f, "json-urls"),
        }
    }
}

/// How requested tags select papers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMatch {
    /// Paper carries every requested tag
    #[default]
    All,
    /// Paper carries at least one requested tag
    Any,
}

/// Papers carrying the requested tags, ordered by id. No tags selects everything.
pub fn select<'a>(papers: &'a PaperMap, tags: &[String], mode: TagMatch) -> Vec<&'a Paper> {
    papers
        .values()
        .filter(|p| {
            if tags.is_empty() {
                return true;
            }
            match mode {
                TagMatch::All => tags.iter().all(|t| p.tags.contains(t)),
                TagMatch::Any => tags.iter().any(|t| p.tags.contains(t)),
            }
        })
        .collect()
}

/// Concatenate the bibtex of the given papers.
///
/// Entries whose citation key was already used are left out.
pub fn bib_bundle(papers: &[&Paper]) -> String {
    let mut keys = HashSet::new();
    let mut entries: Vec<&str> = Vec::new();
    for paper in papers {
        let Some(bib) = paper.bibtex.as_deref().map(str::trim).filter(|b| !b.is_empty()) else {
            continue;
        };
        if let Some(key) = bibtex::citation_key(bib) {
            if !keys.insert(key.clone()) {
                tracing::warn!(paper = %paper.id, key = %key, "duplicate citation key skipped");
                continue;
            }
        }
        entries.push(bib);
    }
    let mut out = entries.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

pub fn bib_map(papers: &[&Paper]) -> BTreeMap<String, String> {
    papers
        .iter()
        .filter_map(|p| {
            p.bibtex
                .as_deref()
                .filter(|b| !b.trim().is_empty())
                .map(|b| (p.id.clone(), b.to_string()))
        })
        .collect()
}

/// Import descriptors that re-create the given papers. Papers without a link are left out.
pub fn descriptors(papers: &[&Paper]) -> Vec<ImportDescriptor> {
    papers
        .iter()
        .filter(|p| !p.pdf_link.trim().is_empty())
        .map(|p| ImportDescriptor {
            url: p.pdf_link.clone(),
            title: Some(p.title.clone()).filter(|t| !t.trim().is_empty()),
            code_link: p.code_link.clone().filter(|c| !c.trim().is_empty()),
            tags: p.tags.iter().cloned().collect(),
        })
        .collect()
}

/// Render the selected papers in `format`
pub fn render(papers: &[&Paper], format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Bib => Ok(bib_bundle(papers)),
        ExportFormat::BibJson => serde_json::to_string_pretty(&bib_map(papers)),
        ExportFormat::Json => serde_json::to_string_pretty(&descriptors(papers)),
        ExportFormat::JsonUrls => {
            let urls: Vec<String> = descriptors(papers).into_iter().map(|d| d.url).collect();
            serde_json::to_string_pretty(&urls)
        }
    }
}
