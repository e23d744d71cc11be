//! Integration tests for debugger interception and the stepper.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blockflow::{
    AbortHandle, Block, BlockRegistry, Context, DebugEvent, Debugger, Evaluate, ParsedScript,
    Runtime, ScriptError, ScriptOutcome, StaticSite, Stepper, StepperHandle, StopEvent,
    StopReason, Value,
};
use serde_json::json;
use tokio_test::assert_ok;

/// Records every interception and the final notification.
#[derive(Default)]
struct Recorder {
    stops: Mutex<Vec<(String, StopReason)>>,
    finished: Mutex<Option<Option<String>>>,
    reject_finish: bool,
}

#[async_trait]
impl Debugger for Recorder {
    async fn intercept(
        &self,
        block: &Block,
        _context: &Context,
        reason: StopReason,
    ) -> Result<(), ScriptError> {
        self.stops
            .lock()
            .unwrap()
            .push((block.label().to_string(), reason));
        if self.reject_finish && reason == StopReason::Finish {
            return Err(ScriptError::Debugger("finish rejected".to_string()));
        }
        Ok(())
    }

    fn script_finished(&self, error: Option<&ScriptError>) {
        *self.finished.lock().unwrap() = Some(error.map(ToString::to_string));
    }
}

impl Recorder {
    fn stops(&self) -> Vec<(String, StopReason)> {
        self.stops.lock().unwrap().clone()
    }
}

/// `a -> b -> c`, three text statements.
fn three_statements() -> String {
    json!({
        "type": "text", "id": "a", "fields": { "TEXT": "A" },
        "next": { "block": {
            "type": "text", "id": "b", "fields": { "TEXT": "B" },
            "next": { "block": { "type": "text", "id": "c", "fields": { "TEXT": "C" } } }
        } }
    })
    .to_string()
}

fn with_stepper() -> (ParsedScript, StepperHandle) {
    let (stepper, handle) = Stepper::new();
    let script = BlockRegistry::standard()
        .builder()
        .debugger(Arc::new(stepper))
        .parse(&three_statements())
        .unwrap();
    (script, handle)
}

fn stop(id: &str, reason: StopReason) -> DebugEvent {
    DebugEvent::Stopped(StopEvent {
        block_id: Some(id.to_string()),
        kind: "text".to_string(),
        reason,
        depth: 1,
    })
}

#[tokio::test]
async fn test_enter_leave_finish_sequence() {
    let recorder = Arc::new(Recorder::default());
    let script = assert_ok!(BlockRegistry::standard()
        .builder()
        .debugger(recorder.clone())
        .parse(&three_statements()));

    let run = script.run(Arc::new(StaticSite::new())).await;
    assert_eq!(run.outcome(), ScriptOutcome::Success);
    assert_eq!(run.value, Some(Value::from("C")));

    let expected: Vec<(String, StopReason)> = [
        ("a", StopReason::Enter),
        ("a", StopReason::Leave),
        ("b", StopReason::Enter),
        ("b", StopReason::Leave),
        ("c", StopReason::Enter),
        ("c", StopReason::Leave),
        ("a", StopReason::Finish),
    ]
    .into_iter()
    .map(|(id, reason)| (id.to_string(), reason))
    .collect();
    assert_eq!(recorder.stops(), expected);
    assert_eq!(*recorder.finished.lock().unwrap(), Some(None));
}

#[tokio::test]
async fn test_nested_inputs_are_intercepted_inside_parent() {
    let recorder = Arc::new(Recorder::default());
    let doc = json!({
        "type": "logic_negate", "id": "not",
        "inputs": { "BOOL": { "block": {
            "type": "logic_boolean", "id": "flag", "fields": { "BOOL": "TRUE" }
        } } }
    });
    let script = assert_ok!(BlockRegistry::standard()
        .builder()
        .debugger(recorder.clone())
        .parse(&doc.to_string()));

    let run = script.run(Arc::new(StaticSite::new())).await;
    assert_eq!(run.value, Some(Value::Bool(false)));

    let order: Vec<String> = recorder
        .stops()
        .into_iter()
        .map(|(id, reason)| format!("{reason}:{id}"))
        .collect();
    assert_eq!(
        order,
        ["Enter:not", "Enter:flag", "Leave:flag", "Leave:not", "Finish:not"]
    );
}

#[tokio::test]
async fn test_script_finished_receives_error() {
    let recorder = Arc::new(Recorder::default());
    let doc = json!({ "type": "variables_set", "id": "s", "fields": { "VAR": "x" } });
    let script = assert_ok!(BlockRegistry::standard()
        .builder()
        .debugger(recorder.clone())
        .parse(&doc.to_string()));

    let run = script.run(Arc::new(StaticSite::new())).await;
    assert_eq!(run.outcome(), ScriptOutcome::Error);

    let finished = recorder.finished.lock().unwrap().clone();
    let message = finished.flatten().expect("error reported to debugger");
    assert!(message.contains("VALUE"));
    // Finish is still delivered after a failure.
    assert_eq!(
        recorder.stops().last(),
        Some(&("s".to_string(), StopReason::Finish))
    );
}

#[tokio::test]
async fn test_finish_error_fails_successful_run() {
    let recorder = Arc::new(Recorder {
        reject_finish: true,
        ..Recorder::default()
    });
    let script = assert_ok!(BlockRegistry::standard()
        .builder()
        .debugger(recorder.clone())
        .parse(r#"{ "type": "logic_null" }"#));

    let run = script.run(Arc::new(StaticSite::new())).await;
    assert_eq!(run.outcome(), ScriptOutcome::Error);
    assert!(matches!(run.error, Some(ScriptError::Debugger(_))));
}

#[tokio::test]
async fn test_stepper_steps_through_every_stop() {
    let (script, mut handle) = with_stepper();
    let task = tokio::spawn(async move { script.run(Arc::new(StaticSite::new())).await });

    for id in ["a", "b", "c"] {
        assert_eq!(handle.next_event().await, Some(stop(id, StopReason::Enter)));
        handle.step();
        assert_eq!(handle.next_event().await, Some(stop(id, StopReason::Leave)));
        handle.step();
    }
    assert_eq!(handle.next_event().await, Some(stop("a", StopReason::Finish)));
    assert_eq!(
        handle.next_event().await,
        Some(DebugEvent::Finished { error: None })
    );

    let run = task.await.unwrap();
    assert_eq!(run.outcome(), ScriptOutcome::Success);
}

#[tokio::test]
async fn test_stepper_resume_runs_to_end() {
    let (script, mut handle) = with_stepper();
    let task = tokio::spawn(async move { script.run(Arc::new(StaticSite::new())).await });

    assert_eq!(handle.next_event().await, Some(stop("a", StopReason::Enter)));
    handle.resume();

    assert_eq!(handle.next_event().await, Some(stop("a", StopReason::Finish)));
    assert_eq!(
        handle.next_event().await,
        Some(DebugEvent::Finished { error: None })
    );
    let run = task.await.unwrap();
    assert_eq!(run.value, Some(Value::from("C")));
}

#[tokio::test]
async fn test_stepper_abort_ends_run_aborted() {
    let (script, mut handle) = with_stepper();
    let task = tokio::spawn(async move { script.run(Arc::new(StaticSite::new())).await });

    assert_eq!(handle.next_event().await, Some(stop("a", StopReason::Enter)));
    handle.step();
    assert_eq!(handle.next_event().await, Some(stop("a", StopReason::Leave)));
    handle.step();
    assert_eq!(handle.next_event().await, Some(stop("b", StopReason::Enter)));
    handle.abort();

    assert_eq!(handle.next_event().await, Some(stop("a", StopReason::Finish)));
    match handle.next_event().await {
        Some(DebugEvent::Finished { error: Some(_) }) => {}
        other => panic!("unexpected event: {other:?}"),
    }

    let run = task.await.unwrap();
    assert_eq!(run.outcome(), ScriptOutcome::Aborted);
    assert_eq!(run.log.details(), "aborted");
}

#[tokio::test]
async fn test_abort_handle_releases_paused_stepper() {
    let (script, mut handle) = with_stepper();
    let abort = AbortHandle::new();
    let signal = abort.clone();
    let task = tokio::spawn(async move {
        script
            .run_with_abort(Arc::new(StaticSite::new()), &signal)
            .await
    });

    assert_eq!(handle.next_event().await, Some(stop("a", StopReason::Enter)));
    // No command is sent; the pending interception is abandoned.
    abort.abort();

    let run = task.await.unwrap();
    assert_eq!(run.outcome(), ScriptOutcome::Aborted);
}

#[tokio::test]
async fn test_dropped_controller_lets_script_finish() {
    let (script, handle) = with_stepper();
    drop(handle);

    let run = script.run(Arc::new(StaticSite::new())).await;
    assert_eq!(run.outcome(), ScriptOutcome::Success);
    assert_eq!(run.value, Some(Value::from("C")));
}

/// Sleeps far longer than any test timeout.
#[derive(Default)]
struct Stall;

#[async_trait]
impl Evaluate for Stall {
    async fn evaluate(&self, _block: &Block, _runtime: &mut Runtime) -> Result<Value, ScriptError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn test_timeout_inside_scope_finishes_at_root_depth() {
    let mut registry = BlockRegistry::standard();
    registry.register_kind::<Stall>("stall");
    let (stepper, mut handle) = Stepper::new();
    let doc = json!({
        "type": "controls_scope", "id": "outer",
        "inputs": { "DO": { "block": { "type": "stall", "id": "wait" } } }
    });
    let script = assert_ok!(registry
        .builder()
        .debugger(Arc::new(stepper))
        .timeout(Duration::from_millis(50))
        .parse(&doc.to_string()));
    let task = tokio::spawn(async move { script.run(Arc::new(StaticSite::new())).await });

    match handle.next_event().await {
        Some(DebugEvent::Stopped(event)) => assert_eq!(event.reason, StopReason::Enter),
        other => panic!("unexpected event: {other:?}"),
    }
    handle.resume();

    match handle.next_event().await {
        Some(DebugEvent::Stopped(event)) => {
            assert_eq!(event.reason, StopReason::Finish);
            assert_eq!(event.block_id.as_deref(), Some("outer"));
            assert_eq!(event.depth, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let run = task.await.unwrap();
    assert_eq!(run.outcome(), ScriptOutcome::Error);
    assert!(matches!(run.error, Some(ScriptError::Timeout(_))));
}
