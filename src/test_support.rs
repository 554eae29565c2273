//! Scripted collaborators for unit tests.

use crate::adapters::{async_trait, AdapterError, Answer, SourceAdapter};
use crate::paper::{FieldValues, Paper};
use crate::resolver::{PaperResolver, ResolveError};
use crate::sources::SourceMatch;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum Script {
    Found(FieldValues),
    /// Found, but a follow-up request behind the answer failed
    Partial(FieldValues),
    NoMatch,
    Fail,
}

pub struct ScriptedAdapter {
    name: &'static str,
    default: Script,
    per_paper: HashMap<String, Script>,
    scope: String,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(name: &'static str, default: Script) -> Self {
        Self {
            name,
            default,
            per_paper: HashMap::new(),
            scope: String::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn found(name: &'static str, values: FieldValues) -> Self {
        Self::new(name, Script::Found(values))
    }

    pub fn venue(name: &'static str, venue: &str) -> Self {
        Self::found(
            name,
            FieldValues {
                venue: Some(venue.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn no_match(name: &'static str) -> Self {
        Self::new(name, Script::NoMatch)
    }

    pub fn failing(name: &'static str) -> Self {
        Self::new(name, Script::Fail)
    }

    pub fn for_paper(mut self, paper_id: &str, script: Script) -> Self {
        self.per_paper.insert(paper_id.to_string(), script);
        self
    }

    pub fn scoped(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Paper ids this adapter was asked about, in order
    pub fn seen(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn query(&self, paper: &Paper) -> Result<Option<FieldValues>, AdapterError> {
        Ok(self.lookup(paper).await?.map(|answer| answer.values))
    }

    async fn lookup(&self, paper: &Paper) -> Result<Option<Answer>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(paper.id.clone());
        match self.per_paper.get(&paper.id).unwrap_or(&self.default) {
            Script::Found(values) => Ok(Some(Answer::complete(values.clone()))),
            Script::Partial(values) => Ok(Some(Answer {
                values: values.clone(),
                complete: false,
            })),
            Script::NoMatch => Ok(None),
            Script::Fail => Err(AdapterError::ParseError("scripted failure".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn cache_scope(&self) -> String {
        self.scope.clone()
    }
}

/// Resolves any recognized URL into a bare paper
#[derive(Default)]
pub struct FakeResolver {
    calls: Arc<AtomicUsize>,
    failing: Vec<String>,
    title: Option<String>,
}

impl FakeResolver {
    pub fn failing_for(paper_id: &str) -> Self {
        Self {
            failing: vec![paper_id.to_string()],
            ..Default::default()
        }
    }

    /// Give every resolved paper this title
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PaperResolver for FakeResolver {
    async fn resolve(&self, source: &SourceMatch) -> Result<Paper, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&source.paper_id) {
            return Err(ResolveError::NotFound(source.paper_id.clone()));
        }
        let title = self
            .title
            .clone()
            .unwrap_or_else(|| format!("Paper {}", source.source_id));
        let mut paper = Paper::new(source.paper_id.clone(), title);
        paper.source = source.source.key().to_string();
        paper.pdf_link = source.url.to_string();
        Ok(paper)
    }
}
