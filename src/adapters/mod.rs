pub use async_trait::async_trait;

pub mod crossref;
pub mod dblp;
pub mod pwc;

use crate::paper::{FieldValues, Paper};
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;

pub const USER_AGENT: &str = "papermatch/0.1.0";

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Unexpected HTTP status {0}")]
    Status(StatusCode),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Rate limited, try again later")]
    RateLimited,
}

/// A provider's answer together with whether every request behind it succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub values: FieldValues,
    /// False when a follow-up request (bibtex, repositories) failed
    pub complete: bool,
}

impl Answer {
    pub fn complete(values: FieldValues) -> Self {
        Self {
            values,
            complete: true,
        }
    }
}

/// One external metadata provider.
///
/// `Ok(None)` means the provider has nothing for this paper. Errors are
/// reserved for transport and parsing faults.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Look the paper up and report whatever fields the provider knows
    async fn query(&self, paper: &Paper) -> Result<Option<FieldValues>, AdapterError>;

    /// Same lookup as `query`, also telling whether the answer is complete
    async fn lookup(&self, paper: &Paper) -> Result<Option<Answer>, AdapterError> {
        Ok(self.query(paper).await?.map(Answer::complete))
    }

    /// Get the name of this provider
    fn name(&self) -> &'static str;

    /// Settings that change this provider's answers, part of the cache identity
    fn cache_scope(&self) -> String {
        String::new()
    }
}

/// Build the HTTP client shared by all adapters
pub fn http_client() -> Result<Client, AdapterError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Map the statuses every provider treats the same way.
///
/// Returns `Ok(None)` for 404 so callers can report "no match".
pub(crate) fn check_status(response: Response) -> Result<Option<Response>, AdapterError> {
    match response.status() {
        StatusCode::NOT_FOUND => Ok(None),
        StatusCode::TOO_MANY_REQUESTS => Err(AdapterError::RateLimited),
        status if !status.is_success() => Err(AdapterError::Status(status)),
        _ => Ok(Some(response)),
    }
}

/// Note attached alongside a discovered venue
pub(crate) fn accepted_note(venue: &str) -> String {
    format!("Accepted @ {}", venue)
}

/// "Venue Year", or just the venue when the year is unknown or already present
pub(crate) fn venue_with_year(venue: &str, year: Option<i32>) -> String {
    let venue = venue.trim();
    match year {
        Some(year) if !venue.contains(&year.to_string()) => format!("{} {}", venue, year),
        _ => venue.to_string(),
    }
}

pub(crate) fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
