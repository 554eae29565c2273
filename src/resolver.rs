use crate::bibtex;
use crate::sources::{KnownSource, SourceMatch};
use crate::paper::Paper;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use thiserror::Error;

const ARXIV_API_BASE: &str = "http://export.arxiv.org/api/query";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No metadata resolver for {0} pages")]
    Unsupported(KnownSource),
    #[error("Paper {0} not found")]
    NotFound(String),
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Builds a fresh paper record for a recognized paper page
#[async_trait]
pub trait PaperResolver: Send + Sync {
    async fn resolve(&self, source: &SourceMatch) -> Result<Paper, ResolveError>;

    /// Whether pages from `source` can be resolved at all
    fn supports(&self, _source: KnownSource) -> bool {
        true
    }
}

/// Resolves arXiv pages through the arXiv export API
pub struct ArxivResolver {
    client: Client,
    base_url: String,
}

impl ArxivResolver {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, ARXIV_API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl PaperResolver for ArxivResolver {
    async fn resolve(&self, source: &SourceMatch) -> Result<Paper, ResolveError> {
        if !self.supports(source.source) {
            return Err(ResolveError::Unsupported(source.source));
        }

        let url = format!("{}?id_list={}", self.base_url, source.source_id);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let text = response.text().await?;

        let feed = parse_arxiv_atom(&text)?;
        let entry = feed
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(source.paper_id.clone()))?;

        let mut paper = Paper::new(source.paper_id.clone(), entry.title.clone());
        paper.source = KnownSource::Arxiv.key().to_string();
        paper.author = entry.authors.join(" and ");
        paper.year = entry.year.clone();
        paper.pdf_link = format!("https://arxiv.org/pdf/{}", source.source_id);
        paper.bibtex = Some(bibtex::arxiv_misc(
            &source.source_id,
            &entry.title,
            &entry.authors,
            entry.year.as_deref(),
        ));
        Ok(paper)
    }

    fn supports(&self, source: KnownSource) -> bool {
        source == KnownSource::Arxiv
    }
}

#[derive(Debug, Default)]
struct AtomEntry {
    title: String,
    authors: Vec<String>,
    year: Option<String>,
}

/// Parse ArXiv Atom XML response
fn parse_arxiv_atom(xml: &str) -> Result<Vec<AtomEntry>, ResolveError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current_entry: Option<AtomEntry> = None;
    let mut current_tag = String::new();
    let mut in_author = false;
    let mut current_author = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                current_tag = name.clone();

                if name == "entry" {
                    current_entry = Some(AtomEntry::default());
                } else if name == "author" {
                    in_author = true;
                    current_author.clear();
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                if name == "entry" {
                    // The API answers unknown ids with an entry titled "Error"
                    if let Some(entry) = current_entry.take() {
                        if !entry.title.is_empty() && entry.title != "Error" {
                            entries.push(entry);
                        }
                    }
                } else if name == "author" {
                    in_author = false;
                    if let Some(ref mut entry) = current_entry {
                        if !current_author.is_empty() {
                            entry.authors.push(current_author.clone());
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Text(ref e)) => {
                if let Some(ref mut entry) = current_entry {
                    let text = e.unescape().unwrap_or_default().to_string();

                    match current_tag.as_str() {
                        "title" if !in_author => {
                            entry.title = text.split_whitespace().collect::<Vec<_>>().join(" ");
                        }
                        "published" => {
                            // 2023-01-15T00:00:00Z
                            entry.year = text.split('-').next().map(str::to_string);
                        }
                        "name" if in_author => {
                            current_author = text;
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ResolveError::ParseError(format!(
                    "Error parsing ArXiv XML: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use url::Url;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2301.12345v1</id>
    <title>A Great Paper
      About Machine Learning</title>
    <published>2023-01-15T00:00:00Z</published>
    <author>
      <name>John Smith</name>
    </author>
    <author>
      <name>Jane Doe</name>
    </author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_arxiv_atom() {
        let entries = parse_arxiv_atom(FEED).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "A Great Paper About Machine Learning");
        assert_eq!(entries[0].year.as_deref(), Some("2023"));
        assert_eq!(entries[0].authors, vec!["John Smith", "Jane Doe"]);
    }

    #[tokio::test]
    async fn test_resolve_arxiv_paper() {
        let mut server = Server::new_async().await;
        let _feed = server
            .mock("GET", Matcher::Regex("^/api/query".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(FEED)
            .create_async()
            .await;

        let resolver =
            ArxivResolver::with_base_url(Client::new(), &format!("{}/api/query", server.url()));
        let url = Url::parse("https://arxiv.org/abs/2301.12345v1").unwrap();
        let source = crate::sources::classify(&url).unwrap();

        let paper = resolver.resolve(&source).await.unwrap();
        assert_eq!(paper.id, "Arxiv-2301.12345");
        assert_eq!(paper.author, "John Smith and Jane Doe");
        assert_eq!(paper.pdf_link, "https://arxiv.org/pdf/2301.12345");
        assert!(paper.bibtex.unwrap().contains("eprint = {2301.12345}"));
        assert!(paper.venue.is_none());
    }

    #[tokio::test]
    async fn test_other_sources_are_unsupported() {
        let resolver = ArxivResolver::new(Client::new());
        let url = Url::parse("https://openreview.net/forum?id=abc").unwrap();
        let source = crate::sources::classify(&url).unwrap();

        assert!(matches!(
            resolver.resolve(&source).await,
            Err(ResolveError::Unsupported(KnownSource::OpenReview))
        ));
    }
}
