use super::{
    accepted_note, async_trait, check_status, trim_base, venue_with_year, AdapterError, Answer,
    SourceAdapter,
};
use crate::bibtex;
use crate::matcher::find_best_match;
use crate::paper::{FieldValues, Paper};
use reqwest::Client;
use serde::Deserialize;

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// CrossRef work type used for preprints
const PREPRINT_TYPE: &str = "posted-content";

pub struct CrossRefAdapter {
    client: Client,
    base_url: String,
}

impl CrossRefAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, CROSSREF_API_BASE)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<CrossRefWork>, AdapterError> {
        let url = format!(
            "{}/works?query.title={}&rows=5",
            self.base_url,
            urlencoding::encode(title)
        );

        let Some(response) = check_status(self.client.get(&url).send().await?)? else {
            return Ok(Vec::new());
        };

        let response: CrossRefResponse = response.json().await.map_err(|e| {
            AdapterError::ParseError(format!("Failed to parse CrossRef response: {}", e))
        })?;

        if response.status != "ok" {
            return Ok(Vec::new());
        }
        Ok(response.message.items)
    }

    async fn fetch_bibtex(&self, doi: &str) -> Result<Option<String>, AdapterError> {
        let url = format!(
            "{}/works/{}/transform/application/x-bibtex",
            self.base_url, doi
        );
        let Some(response) = check_status(self.client.get(&url).send().await?)? else {
            return Ok(None);
        };
        let text = response.text().await?;
        Ok(bibtex::normalize(&text))
    }
}

#[derive(Debug, Deserialize)]
struct CrossRefResponse {
    status: String,
    message: CrossRefSearchResult,
}

#[derive(Debug, Deserialize)]
struct CrossRefSearchResult {
    #[serde(default)]
    items: Vec<CrossRefWork>,
}

#[derive(Debug, Deserialize)]
struct CrossRefWork {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    published: Option<CrossRefDate>,
    #[serde(rename = "published-print")]
    published_print: Option<CrossRefDate>,
    issued: Option<CrossRefDate>,
    #[serde(rename = "type")]
    work_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossRefDate {
    #[serde(rename = "date-parts")]
    date_parts: Option<Vec<Vec<Option<i32>>>>,
}

impl CrossRefDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.as_ref()?.first()?.first().copied().flatten()
    }
}

impl CrossRefWork {
    fn title(&self) -> Option<&str> {
        self.title.as_ref().and_then(|t| t.first()).map(String::as_str)
    }

    fn container(&self) -> Option<&str> {
        self.container_title
            .as_ref()
            .and_then(|t| t.first())
            .map(String::as_str)
            .filter(|c| !c.trim().is_empty())
    }

    fn year(&self) -> Option<i32> {
        [&self.published, &self.published_print, &self.issued]
            .into_iter()
            .flatten()
            .find_map(CrossRefDate::year)
    }

    fn is_publication(&self) -> bool {
        self.work_type.as_deref() != Some(PREPRINT_TYPE) && self.container().is_some()
    }
}

#[async_trait]
impl SourceAdapter for CrossRefAdapter {
    async fn query(&self, paper: &Paper) -> Result<Option<FieldValues>, AdapterError> {
        Ok(self.lookup(paper).await?.map(|answer| answer.values))
    }

    async fn lookup(&self, paper: &Paper) -> Result<Option<Answer>, AdapterError> {
        let works: Vec<CrossRefWork> = self
            .search_by_title(&paper.title)
            .await?
            .into_iter()
            .filter(CrossRefWork::is_publication)
            .collect();

        let Some((work, similarity)) = find_best_match(&paper.title, &works, |w| w.title()) else {
            return Ok(None);
        };
        tracing::debug!(paper = %paper.id, similarity, "CrossRef match");

        let venue = work.container().map(|c| venue_with_year(c, work.year()));

        let mut complete = true;
        let bibtex = match &work.doi {
            Some(doi) => match self.fetch_bibtex(doi).await {
                Ok(bibtex) => bibtex,
                Err(e) => {
                    tracing::warn!(paper = %paper.id, "CrossRef bibtex download failed: {}", e);
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
        "CrossRef"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_crossref_match_with_bibtex() {
        let mut server = Server::new_async().await;

        let _search = server
            .mock("GET", Matcher::Regex("^/works$|^/works\\?".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{
                "status": "ok",
                "message": {
                    "items": [
                        {
                            "DOI": "10.1101/2020.01.01.000001",
                            "title": ["Protein Folding With Transformers"],
                            "type": "posted-content",
                            "container-title": []
                        },
                        {
                            "DOI": "10.1038/s41586-021-03819-2",
                            "title": ["Protein folding with transformers"],
                            "type": "journal-article",
                            "container-title": ["Nature"],
                            "published-print": {"date-parts": [[2021, 8, 26]]}
                        }
                    ]
                }
            }"#)
            .create_async()
            .await;
        let _bib = server
            .mock("GET", "/works/10.1038/s41586-021-03819-2/transform/application/x-bibtex")
            .with_status(200)
            .with_body(" @article{Jumper_2021, title={Protein folding with transformers}, journal={Nature}, year={2021}}")
            .create_async()
            .await;

        let adapter = CrossRefAdapter::with_base_url(Client::new(), &server.url());
        let paper = Paper::new("Arxiv-1", "Protein Folding with Transformers");
        let found = adapter.query(&paper).await.unwrap().unwrap();

        assert_eq!(found.venue.as_deref(), Some("Nature 2021"));
        assert!(found.bibtex.unwrap().starts_with("@article{Jumper_2021"));
    }

    #[tokio::test]
    async fn test_crossref_server_error_is_an_error() {
        let mut server = Server::new_async().await;
        let _search = server
            .mock("GET", Matcher::Regex("^/works".to_string()))
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let adapter = CrossRefAdapter::with_base_url(Client::new(), &server.url());
        let paper = Paper::new("Arxiv-1", "Anything");
        assert!(matches!(
            adapter.query(&paper).await,
            Err(AdapterError::Status(_))
        ));
    }
}
