use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use gauge_harness::run::{drive_run, NoopObserver, RunStatus, MAX_ATTEMPTS};
use gauge_harness::task::EvaluationTask;
use gauge_harness::{ChatGateway, GatewayError, Message};

/// Gateway that replays a fixed script of results and records the
/// message history it was called with.
struct ScriptedGateway {
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    histories: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGateway {
    fn new(script: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            histories: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    fn history(&self, call: usize) -> Vec<Message> {
        self.histories.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn generate(&self, _model: &str, messages: &[Message]) -> Result<String, GatewayError> {
        self.histories.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted")
    }
}

fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

fn task(target: Option<u32>) -> EvaluationTask {
    EvaluationTask::new(vec![Message::user("write the thing")], target)
}

#[tokio::test]
async fn accepts_first_attempt_without_target() {
    let gateway = ScriptedGateway::new(vec![Ok("anything goes".to_string())]);

    let state = drive_run(&gateway, &task(None), "m/a", &NoopObserver).await;

    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(state.attempts, 1);
    assert_eq!(state.output, "anything goes");
    assert_eq!(state.word_count, 2);
    assert!(state.error_detail.is_none());
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn accepts_within_tolerance_on_first_attempt() {
    let gateway = ScriptedGateway::new(vec![Ok(words(960))]);

    let state = drive_run(&gateway, &task(Some(1000)), "m/a", &NoopObserver).await;

    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(state.attempts, 1);
    assert_eq!(state.word_count, 960);
}

#[tokio::test]
async fn always_rejected_run_exhausts_budget_and_still_succeeds() {
    // 100 words against a 1000-word target misses every time.
    let gateway = ScriptedGateway::new(vec![
        Ok(words(100)),
        Ok(words(110)),
        Ok(words(120)),
    ]);

    let state = drive_run(&gateway, &task(Some(1000)), "m/a", &NoopObserver).await;

    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(state.attempts, MAX_ATTEMPTS);
    assert_eq!(gateway.calls(), MAX_ATTEMPTS as usize);
    // Best effort: the last attempt's text is surfaced.
    assert_eq!(state.word_count, 120);
}

#[tokio::test]
async fn rejection_appends_assistant_turn_and_corrective_instruction() {
    let gateway = ScriptedGateway::new(vec![Ok(words(500)), Ok(words(950))]);

    let state = drive_run(&gateway, &task(Some(1000)), "m/a", &NoopObserver).await;

    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(state.attempts, 2);

    // First call sees the original single message.
    assert_eq!(gateway.history(0).len(), 1);

    // Second call sees original + rejected assistant turn + correction.
    let second = gateway.history(1);
    assert_eq!(second.len(), 3);
    assert_eq!(second[1], Message::assistant(words(500)));
    let instruction = &second[2];
    assert_eq!(instruction.role, gauge_harness::Role::User);
    assert!(instruction.content.contains("under by 500 words"));
}

#[tokio::test]
async fn backend_error_fails_run_immediately_without_retry() {
    let gateway = ScriptedGateway::new(vec![Err(GatewayError::Backend {
        status: 502,
        message: "bad gateway".to_string(),
    })]);

    let state = drive_run(&gateway, &task(Some(300)), "m/a", &NoopObserver).await;

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.attempts, 0);
    assert!(state.output.is_empty());
    let detail = state.error_detail.expect("error detail");
    assert!(detail.contains("502"));
    assert!(detail.contains("bad gateway"));
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn error_on_second_attempt_fails_with_attempts_recorded() {
    let gateway = ScriptedGateway::new(vec![
        Ok(words(10)),
        Err(GatewayError::Auth),
    ]);

    let state = drive_run(&gateway, &task(Some(1000)), "m/a", &NoopObserver).await;

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.attempts, 1);
    assert_eq!(
        state.error_detail.as_deref(),
        Some("API key is missing")
    );
}
