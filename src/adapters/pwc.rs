use super::{
    accepted_note, async_trait, check_status, trim_base, AdapterError, Answer, SourceAdapter,
};
use crate::matcher::find_best_match;
use crate::paper::{FieldValues, Paper};
use crate::sources::arxiv_id_of;
use reqwest::Client;
use serde::Deserialize;

const PWC_API_BASE: &str = "https://paperswithcode.com/api/v1";

/// Conference slugs with a conventional spelling
const VENUE_NAMES: &[(&str, &str)] = &[
    ("neurips", "NeurIPS"),
    ("nips", "NeurIPS"),
    ("iclr", "ICLR"),
    ("icml", "ICML"),
    ("cvpr", "CVPR"),
    ("iccv", "ICCV"),
    ("eccv", "ECCV"),
    ("acl", "ACL"),
    ("emnlp", "EMNLP"),
    ("naacl", "NAACL"),
    ("aaai", "AAAI"),
    ("ijcai", "IJCAI"),
    ("aistats", "AISTATS"),
    ("corl", "CoRL"),
    ("uai", "UAI"),
    ("wacv", "WACV"),
];

/// Which code repository to prefer when a paper has several
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PwcPrefs {
    /// Ignore repositories not released by the authors
    pub official_only: bool,
    /// Preferred framework, e.g. `pytorch`
    pub framework: Option<String>,
}

pub struct PapersWithCodeAdapter {
    client: Client,
    base_url: String,
    prefs: PwcPrefs,
}

impl PapersWithCodeAdapter {
    pub fn new(client: Client, prefs: PwcPrefs) -> Self {
        Self::with_base_url(client, PWC_API_BASE, prefs)
    }

    pub fn with_base_url(client: Client, base_url: &str, prefs: PwcPrefs) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
            prefs,
        }
    }

    async fn search(&self, title: &str) -> Result<Vec<SearchHit>, AdapterError> {
        let url = format!("{}/search/?q={}", self.base_url, urlencoding::encode(title));

        let Some(response) = check_status(self.client.get(&url).send().await?)? else {
            return Ok(Vec::new());
        };
        let response: Page<SearchHit> = response.json().await.map_err(|e| {
            AdapterError::ParseError(format!("Failed to parse Papers with Code response: {}", e))
        })?;
        Ok(response.results)
    }

    async fn repositories(&self, paper_id: &str) -> Result<Vec<Repository>, AdapterError> {
        let url = format!("{}/papers/{}/repositories/", self.base_url, paper_id);

        let Some(response) = check_status(self.client.get(&url).send().await?)? else {
            return Ok(Vec::new());
        };
        let response: Page<Repository> = response.json().await.map_err(|e| {
            AdapterError::ParseError(format!("Failed to parse Papers with Code repositories: {}", e))
        })?;
        Ok(response.results)
    }

    /// Pick a repository according to the user's preferences
    fn choose<'a>(&self, repos: &'a [Repository]) -> Option<&'a Repository> {
        let wanted = self.prefs.framework.as_deref().map(str::to_lowercase);
        repos
            .iter()
            .filter(|r| !self.prefs.official_only || r.is_official)
            .max_by_key(|r| {
                let framework_match = match (&wanted, &r.framework) {
                    (Some(w), Some(f)) => f.to_lowercase() == *w,
                    _ => false,
                };
                (framework_match, r.is_official, r.stars.unwrap_or(0))
            })
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    paper: PwcPaper,
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct PwcPaper {
    id: String,
    arxiv_id: Option<String>,
    title: Option<String>,
    proceeding: Option<String>,
    conference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Repository {
    url: String,
    #[serde(default)]
    is_official: bool,
    framework: Option<String>,
    stars: Option<u64>,
}

/// Turn a proceeding slug such as `neurips-2021-12` into `NeurIPS 2021`
fn venue_from_slug(slug: &str) -> Option<String> {
    let mut parts = slug.split('-').filter(|p| !p.is_empty());
    let name = parts.next()?;
    let name = VENUE_NAMES
        .iter()
        .find(|(key, _)| *key == name.to_lowercase())
        .map(|(_, pretty)| pretty.to_string())
        .unwrap_or_else(|| name.to_uppercase());
    let year = parts.find(|p| p.len() == 4 && p.chars().all(|c| c.is_ascii_digit()));
    Some(match year {
        Some(year) => format!("{} {}", name, year),
        None => name,
    })
}

#[async_trait]
impl SourceAdapter for PapersWithCodeAdapter {
    async fn query(&self, paper: &Paper) -> Result<Option<FieldValues>, AdapterError> {
        Ok(self.lookup(paper).await?.map(|answer| answer.values))
    }

    async fn lookup(&self, paper: &Paper) -> Result<Option<Answer>, AdapterError> {
        let hits = self.search(&paper.title).await?;

        let arxiv_id = arxiv_id_of(paper);
        let by_id = arxiv_id.as_deref().and_then(|id| {
            hits.iter()
                .find(|h| h.paper.arxiv_id.as_deref().map(strip_version) == Some(strip_version(id)))
        });
        let hit = match by_id {
            Some(hit) => hit,
            None => match find_best_match(&paper.title, &hits, |h| h.paper.title.as_deref()) {
                Some((hit, _)) => hit,
                None => return Ok(None),
            },
        };
        tracing::debug!(paper = %paper.id, pwc = %hit.paper.id, "Papers with Code match");

        let venue = hit
            .paper
            .proceeding
            .as_deref()
            .or(hit.paper.conference.as_deref())
            .and_then(venue_from_slug);

        let mut complete = true;
        let repos = match self.repositories(&hit.paper.id).await {
            Ok(repos) => repos,
            Err(e) => {
                tracing::warn!(paper = %paper.id, "Papers with Code repositories failed: {}", e);
                complete = false;
                hit.repository.iter().cloned().collect()
            }
        };
        let code_link = self.choose(&repos).map(|r| r.url.clone());

        if venue.is_none() && code_link.is_none() {
            return Ok(None);
        }

        Ok(Some(Answer {
            values: FieldValues {
                note: venue.as_deref().map(accepted_note),
                venue,
                bibtex: None,
                code_link,
            },
            complete,
        }))
    }

    fn name(&self) -> &'static str {
        "Papers with Code"
    }

    fn cache_scope(&self) -> String {
        let mut scope = Vec::new();
        if self.prefs.official_only {
            scope.push("official".to_string());
        }
        if let Some(framework) = &self.prefs.framework {
            scope.push(framework.trim().to_lowercase());
        }
        scope.join("_")
    }
}

fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos) if pos > 0 && pos + 1 < id.len() && id[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
            &id[..pos]
        }
        _ => id,
    }
}
