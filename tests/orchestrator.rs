use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use gauge_harness::outcome::{OutcomeError, OutcomeSink, RunOutcome, SavedOutput};
use gauge_harness::run::RunStatus;
use gauge_harness::task::EvaluationTask;
use gauge_harness::{ChatGateway, GatewayError, Message, Orchestrator};
use tokio::sync::Notify;

const GOOD: &str = "good/model";
const BAD: &str = "bad/model";
const SLOW: &str = "slow/model";

/// Gateway that routes by backend id: GOOD answers immediately, BAD
/// always errors, SLOW parks until released.
struct RoutedGateway {
    calls: AtomicUsize,
    release_slow: Notify,
}

impl RoutedGateway {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            release_slow: Notify::new(),
        }
    }
}

#[async_trait]
impl ChatGateway for RoutedGateway {
    async fn generate(&self, model: &str, _messages: &[Message]) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match model {
            BAD => Err(GatewayError::Backend {
                status: 500,
                message: "always broken".to_string(),
            }),
            SLOW => {
                self.release_slow.notified().await;
                Ok("slow answer".to_string())
            }
            _ => Ok("quick answer".to_string()),
        }
    }
}

/// Sink that records everything in memory.
#[derive(Default)]
struct RecordingSink {
    outcomes: Mutex<Vec<RunOutcome>>,
}

#[async_trait]
impl OutcomeSink for RecordingSink {
    async fn record_outcome(&self, outcome: RunOutcome) -> Result<(), OutcomeError> {
        self.outcomes.lock().unwrap().push(outcome);
        Ok(())
    }

    async fn record_saved(&self, _saved: SavedOutput) -> Result<(), OutcomeError> {
        Ok(())
    }
}

fn task() -> EvaluationTask {
    EvaluationTask::new(vec![Message::user("write the thing")], None)
}

#[tokio::test]
async fn failing_backend_does_not_contaminate_its_sibling() {
    let gateway = Arc::new(RoutedGateway::new());
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(gateway, Arc::clone(&sink) as Arc<dyn OutcomeSink>);

    orchestrator.select(BAD).await;
    orchestrator.select(GOOD).await;
    orchestrator.run_all_and_wait(&task()).await;

    let bad = orchestrator.board().get(BAD).await.unwrap();
    assert_eq!(bad.status, RunStatus::Failed);
    assert_eq!(bad.attempts, 0);
    assert!(bad.error_detail.as_deref().unwrap().contains("500"));

    let good = orchestrator.board().get(GOOD).await.unwrap();
    assert_eq!(good.status, RunStatus::Succeeded);
    assert_eq!(good.attempts, 1);
    assert_eq!(good.output, "quick answer");

    // Both terminal states were recorded, each with its own status.
    let outcomes = sink.outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    let by_backend =
        |b: &str| outcomes.iter().find(|o| o.backend == b).unwrap().status;
    assert_eq!(by_backend(BAD), "failed");
    assert_eq!(by_backend(GOOD), "succeeded");
}

#[tokio::test]
async fn rerun_clears_prior_batch_state_before_dispatch() {
    let gateway = Arc::new(RoutedGateway::new());
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(gateway, sink);

    orchestrator.select(GOOD).await;
    orchestrator.select(BAD).await;
    orchestrator.run_all_and_wait(&task()).await;

    // Narrow the selection, then run again: the stale BAD entry must
    // not survive into the new batch.
    orchestrator.deselect(BAD).await;
    orchestrator.run_all_and_wait(&task()).await;

    assert!(orchestrator.board().get(BAD).await.is_none());
    let good = orchestrator.board().get(GOOD).await.unwrap();
    assert_eq!(good.status, RunStatus::Succeeded);
    assert_eq!(good.attempts, 1);

    let snapshot = orchestrator.board().snapshot().await;
    assert_eq!(snapshot.len(), 1);
}

#[tokio::test]
async fn deselected_backend_result_is_discarded_on_completion() {
    let gateway = Arc::new(RoutedGateway::new());
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(Arc::clone(&gateway) as Arc<dyn ChatGateway>, Arc::clone(&sink) as Arc<dyn OutcomeSink>);

    orchestrator.select(SLOW).await;
    orchestrator.select(GOOD).await;
    let handles = orchestrator.run_all(&task()).await;

    // Wait until the slow run is actually in flight.
    while gateway.calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    // Deselect while in flight, then let the run finish.
    orchestrator.deselect(SLOW).await;
    gateway.release_slow.notify_one();
    for handle in handles {
        handle.await.unwrap();
    }

    // The slow run completed but found no slot: nothing stored,
    // nothing persisted.
    assert!(orchestrator.board().get(SLOW).await.is_none());
    let outcomes = sink.outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].backend, GOOD);

    let good = orchestrator.board().get(GOOD).await.unwrap();
    assert_eq!(good.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn board_shows_running_state_while_batch_is_in_flight() {
    let gateway = Arc::new(RoutedGateway::new());
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = Orchestrator::new(Arc::clone(&gateway) as Arc<dyn ChatGateway>, sink);

    orchestrator.select(SLOW).await;
    let handles = orchestrator.run_all(&task()).await;

    while gateway.calls.load(Ordering::SeqCst) < 1 {
        tokio::task::yield_now().await;
    }
    let state = orchestrator.board().get(SLOW).await.unwrap();
    assert_eq!(state.status, RunStatus::Running);

    gateway.release_slow.notify_one();
    for handle in handles {
        handle.await.unwrap();
    }
    let state = orchestrator.board().get(SLOW).await.unwrap();
    assert_eq!(state.status, RunStatus::Succeeded);
}
