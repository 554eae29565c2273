use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;

/// How one batch item ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Duplicate,
    SkippedUnrecognized,
    Error,
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOutcome::Success => write!(f, "success"),
            ItemOutcome::Duplicate => write!(f, "duplicate"),
            ItemOutcome::SkippedUnrecognized => write!(f, "skipped-unrecognized"),
            ItemOutcome::Error => write!(f, "error"),
        }
    }
}

/// Events a batch reports to whoever is watching
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        index: usize,
        total: usize,
        label: String,
    },
    Finished {
        index: usize,
        outcome: ItemOutcome,
        detail: String,
    },
    Done {
        total: usize,
    },
}

/// Fraction of the batch completed once item `index` is done
pub fn fraction(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (index + 1) as f64 / total as f64
}

pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

/// Discards every event
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&mut self, _event: ProgressEvent) {}
}

/// Keeps every event, in order
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<ProgressEvent>,
}

impl CollectingSink {
    pub fn finished(&self) -> Vec<(usize, ItemOutcome)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Finished { index, outcome, .. } => Some((*index, *outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.events.last(), Some(ProgressEvent::Done { .. }))
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }
}

/// Terminal progress bar
pub struct BarSink {
    bar: Option<ProgressBar>,
}

impl BarSink {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn emit(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { index, total, label } => {
                let bar = self.bar.get_or_insert_with(|| {
                    let pb = ProgressBar::new(total as u64);
                    if let Ok(style) = ProgressStyle::default_bar().template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                    ) {
                        pb.set_style(style.progress_chars("#>-"));
                    }
                    pb
                });
                bar.set_position(index as u64);
                bar.set_message(label);
            }
            ProgressEvent::Finished {
                index,
                outcome,
                detail,
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(index as u64 + 1);
                    if outcome != ItemOutcome::Success {
                        bar.println(format!("[{}] {}: {}", index + 1, outcome, detail));
                    }
                }
            }
            ProgressEvent::Done { .. } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_with_message("Done!");
                }
            }
        }
    }
}
