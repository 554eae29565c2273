use super::{
    accepted_note, async_trait, check_status, trim_base, venue_with_year, AdapterError, Answer,
    SourceAdapter,
};
use crate::bibtex;
use crate::matcher::find_best_match;
use crate::paper::{FieldValues, Paper};
use reqwest::Client;
use serde::Deserialize;

const DBLP_BASE: &str = "https://dblp.org";

/// Venue DBLP uses for arXiv preprints
const PREPRINT_VENUE: &str = "CoRR";

pub struct DblpAdapter {
    client: Client,
    base_url: String,
}

impl DblpAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DBLP_BASE)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }

    async fn search(&self, title: &str) -> Result<Vec<DblpInfo>, AdapterError> {
        let url = format!(
            "{}/search/publ/api?q={}&format=json&h=10",
            self.base_url,
            urlencoding::encode(title)
        );

        let Some(response) = check_status(self.client.get(&url).send().await?)? else {
            return Ok(Vec::new());
        };

        let response: DblpResponse = response.json().await.map_err(|e| {
            AdapterError::ParseError(format!("Failed to parse DBLP response: {}", e))
        })?;

        Ok(response
            .result
            .hits
            .and_then(|h| h.hit)
            .map(|hits| hits.into_iter().map(|h| h.info).collect())
            .unwrap_or_default())
    }

    async fn fetch_bibtex(&self, key: &str) -> Result<Option<String>, AdapterError> {
        let url = format!("{}/rec/{}.bib", self.base_url, key);
        let Some(response) = check_status(self.client.get(&url).send().await?)? else {
            return Ok(None);
        };
        let text = response.text().await?;
        Ok(bibtex::normalize(&text))
    }
}

#[derive(Debug, Deserialize)]
struct DblpResponse {
    result: DblpResult,
}

#[derive(Debug, Deserialize)]
struct DblpResult {
    hits: Option<DblpHits>,
}

#[derive(Debug, Deserialize)]
struct DblpHits {
    hit: Option<Vec<DblpHit>>,
}

#[derive(Debug, Deserialize)]
struct DblpHit {
    info: DblpInfo,
}

#[derive(Debug, Deserialize)]
struct DblpInfo {
    title: Option<String>,
    venue: Option<OneOrMany>,
    year: Option<String>,
    key: Option<String>,
}

/// DBLP emits a bare string for one value and a list for several
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn first(&self) -> Option<&str> {
        match self {
            OneOrMany::One(s) => Some(s),
            OneOrMany::Many(list) => list.first().map(String::as_str),
        }
    }
}

impl DblpInfo {
    fn venue(&self) -> Option<&str> {
        self.venue.as_ref().and_then(OneOrMany::first)
    }

    fn is_preprint(&self) -> bool {
        self.venue().map_or(true, |v| v == PREPRINT_VENUE)
    }
}

#[async_trait]
impl SourceAdapter for DblpAdapter {
    async fn query(&self, paper: &Paper) -> Result<Option<FieldValues>, AdapterError> {
        Ok(self.lookup(paper).await?.map(|answer| answer.values))
    }

    async fn lookup(&self, paper: &Paper) -> Result<Option<Answer>, AdapterError> {
        let hits: Vec<DblpInfo> = self
            .search(&paper.title)
            .await?
            .into_iter()
            .filter(|info| !info.is_preprint())
            .collect();

        let Some((info, similarity)) = find_best_match(&paper.title, &hits, |h| {
            h.title.as_deref().map(|t| t.trim_end_matches('.'))
        }) else {
            return Ok(None);
        };
        tracing::debug!(paper = %paper.id, similarity, "DBLP match");

        let year = info.year.as_ref().and_then(|y| y.parse().ok());
        let venue = info.venue().map(|v| venue_with_year(v, year));

        let mut complete = true;
        let bibtex = match &info.key {
            Some(key) => match self.fetch_bibtex(key).await {
                Ok(bibtex) => bibtex,
                Err(e) => {
                    tracing::warn!(paper = %paper.id, "DBLP bibtex download failed: {}", e);
                    complete = false;
                    None
                }
            },
            None => None,
        };

        Ok(Some(Answer {
            values: FieldValues {
                note: venue.as_deref().map(accepted_note),
                venue,
                bibtex,
                code_link: None,
            },
            complete,
        }))
    }

    fn name(&self) -> &'static str {
        "DBLP"
    }
}
