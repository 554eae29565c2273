use crate::gate::ConfirmationGate;
use crate::paper::{Paper, PendingUpdate};
use crate::progress::{fraction, ItemOutcome, ProgressEvent, ProgressSink};
use crate::report::{BatchReport, ItemReport};
use crate::store::{PaperStore, StoreError};
use crate::Reconciler;
use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// What one step of a batch produced
#[derive(Debug, Clone)]
pub struct StepResult<R> {
    pub outcome: ItemOutcome,
    pub detail: String,
    pub value: Option<R>,
}

impl<R> StepResult<R> {
    pub fn new(outcome: ItemOutcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: R) -> Self {
        self.value = Some(value);
        self
    }
}

/// Run `step` over `items` one at a time, in order.
///
/// A step that fails or panics is recorded as an `Error` outcome for its item
/// and the batch moves on. `Done` is always emitted last. Values produced by
/// successful steps are returned alongside the report, in item order.
pub async fn run_batch<T, R, E, F, Fut>(
    items: Vec<T>,
    label: impl Fn(&T) -> String,
    sink: &mut dyn ProgressSink,
    mut step: F,
) -> (BatchReport, Vec<R>)
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<StepResult<R>, E>>,
    E: Display,
{
    let total = items.len();
    let mut report = BatchReport::new();
    let mut values = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        let label = label(&item);
        sink.emit(ProgressEvent::Started {
            index,
            total,
            label: label.clone(),
        });

        let (outcome, detail) = match AssertUnwindSafe(step(item)).catch_unwind().await {
            Ok(Ok(result)) => {
                if let Some(value) = result.value {
                    values.push(value);
                }
                (result.outcome, result.detail)
            }
            Ok(Err(e)) => {
                tracing::warn!(index, item = %label, "batch item failed: {}", e);
                (ItemOutcome::Error, e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(index, item = %label, "batch item panicked: {}", message);
                (ItemOutcome::Error, format!("internal error: {}", message))
            }
        };

        tracing::debug!(index, total, progress = fraction(index, total), %outcome, "item finished");
        sink.emit(ProgressEvent::Finished {
            index,
            outcome,
            detail: detail.clone(),
        });
        report.add(ItemReport {
            index,
            label,
            outcome,
            detail,
        });
    }

    sink.emit(ProgressEvent::Done { total });
    (report, values)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Reconcile every library paper that lacks a venue and stage the proposed
/// updates in `gate`. Nothing is written to the store.
pub async fn match_library(
    store: &dyn PaperStore,
    reconciler: &Reconciler,
    gate: &mut ConfirmationGate,
    sink: &mut dyn ProgressSink,
) -> Result<BatchReport, StoreError> {
    // BTreeMap order, so papers are visited by id
    let papers: Vec<Paper> = store
        .get_all()
        .await?
        .into_values()
        .filter(Paper::lacks_venue)
        .collect();
    tracing::info!(papers = papers.len(), "matching papers without a venue");

    let (report, updates) = run_batch(
        papers,
        |p| p.title.clone(),
        sink,
        move |paper| match_one(reconciler, paper),
    )
    .await;

    for update in updates {
        gate.stage(update);
    }
    Ok(report)
}

async fn match_one(
    reconciler: &Reconciler,
    paper: Paper,
) -> Result<StepResult<PendingUpdate>, String> {
    let result = reconciler.reconcile(&paper).await;

    match result.update {
        Some(update) => {
            let fields: Vec<String> = update.changes.iter().map(|(f, _)| f.to_string()).collect();
            let detail = match &update.changes.venue {
                Some(venue) => format!("{} ({})", venue, fields.join(", ")),
                None => format!("no venue ({})", fields.join(", ")),
            };
            Ok(StepResult::new(ItemOutcome::Success, detail).with_value(update))
        }
        None if !result.failures.is_empty() && result.failures.len() == result.consulted.len() => {
            let reasons: Vec<String> = result
                .failures
                .iter()
                .map(|(provider, e)| format!("{}: {}", provider, e))
                .collect();
            Err(format!("all providers failed ({})", reasons.join("; ")))
        }
        None => Ok(StepResult::new(ItemOutcome::Success, "no new metadata")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SourceAdapter;
    use crate::progress::{CollectingSink, NullSink};
    use crate::store::MemoryStore;
    use crate::test_support::{Script, ScriptedAdapter};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_errors_and_panics_are_isolated() {
        let mut sink = CollectingSink::default();
        let (report, values) = run_batch(
            vec![1, 2, 3, 4],
            |n| format!("item {}", n),
            &mut sink,
            |n| async move {
                match n {
                    2 => Err("boom".to_string()),
                    3 => panic!("step exploded"),
                    _ => Ok(StepResult::new(ItemOutcome::Success, "ok").with_value(n * 10)),
                }
            },
        )
        .await;

        assert_eq!(
            report.outcomes(),
            vec![
                ItemOutcome::Success,
                ItemOutcome::Error,
                ItemOutcome::Error,
                ItemOutcome::Success
            ]
        );
        assert_eq!(report.items[1].detail, "boom");
        assert!(report.items[2].detail.contains("step exploded"));
        assert_eq!(values, vec![10, 40]);
        assert!(sink.is_done());
    }

    #[tokio::test]
    async fn test_events_are_ordered() {
        let mut sink = CollectingSink::default();
        run_batch(
            vec!["a", "b"],
            |s| s.to_string(),
            &mut sink,
            |_| async { Ok::<_, String>(StepResult::<()>::new(ItemOutcome::Success, "")) },
        )
        .await;

        let kinds: Vec<&str> = sink
            .events
            .iter()
            .map(|e| match e {
                ProgressEvent::Started { .. } => "start",
                ProgressEvent::Finished { .. } => "finish",
                ProgressEvent::Done { .. } => "done",
            })
            .collect();
        assert_eq!(kinds, vec!["start", "finish", "start", "finish", "done"]);
        assert_eq!(
            sink.events[2],
            ProgressEvent::Started {
                index: 1,
                total: 2,
                label: "b".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_batch_still_reports_done() {
        let mut sink = CollectingSink::default();
        let (report, values) = run_batch(
            Vec::<u8>::new(),
            |_| String::new(),
            &mut sink,
            |_| async { Ok::<_, String>(StepResult::<()>::new(ItemOutcome::Success, "")) },
        )
        .await;

        assert!(report.is_empty());
        assert!(values.is_empty());
        assert_eq!(sink.events, vec![ProgressEvent::Done { total: 0 }]);
    }

    #[tokio::test]
    async fn test_failing_paper_does_not_affect_others() {
        let mut known = Paper::new("Arxiv-0000.00000", "Already placed");
        known.venue = Some("ICML 2020".to_string());
        let store = Arc::new(MemoryStore::new(vec![
            Paper::new("Arxiv-2101.00001", "One"),
            Paper::new("Arxiv-2101.00002", "Two"),
            Paper::new("Arxiv-2101.00003", "Three"),
            known,
        ]));

        let p1 = ScriptedAdapter::venue("p1", "NeurIPS 2021")
            .for_paper("Arxiv-2101.00002", Script::Fail);
        let p2 = ScriptedAdapter::venue("p2", "ICLR 2022")
            .for_paper("Arxiv-2101.00002", Script::Fail);
        let seen = p1.seen();
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(p1), Box::new(p2)];
        let reconciler = Reconciler::with_adapters(adapters);

        let mut gate = ConfirmationGate::new(store.clone());
        let mut sink = CollectingSink::default();
        let report = match_library(store.as_ref(), &reconciler, &mut gate, &mut sink)
            .await
            .unwrap();

        assert_eq!(
            sink.finished(),
            vec![
                (0, ItemOutcome::Success),
                (1, ItemOutcome::Error),
                (2, ItemOutcome::Success)
            ]
        );
        assert!(sink.is_done());
        assert_eq!(report.count_errors(), 1);

        let staged: Vec<&str> = gate.pending().map(|u| u.paper_id.as_str()).collect();
        assert_eq!(staged, vec!["Arxiv-2101.00001", "Arxiv-2101.00003"]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Arxiv-2101.00001", "Arxiv-2101.00002", "Arxiv-2101.00003"]
        );
        // Matching only stages
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_partial_provider_failure_still_succeeds() {
        let store = Arc::new(MemoryStore::new(vec![Paper::new("Arxiv-2101.00001", "One")]));
        let p1 = ScriptedAdapter::failing("p1");
        let p2 = ScriptedAdapter::no_match("p2");
        let calls = p2.calls();
        let reconciler = Reconciler::with_adapters(vec![Box::new(p1), Box::new(p2)]);

        let mut gate = ConfirmationGate::new(store.clone());
        let report = match_library(store.as_ref(), &reconciler, &mut gate, &mut NullSink)
            .await
            .unwrap();

        assert_eq!(report.outcomes(), vec![ItemOutcome::Success]);
        assert_eq!(report.items[0].detail, "no new metadata");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(gate.is_empty());
    }
}
