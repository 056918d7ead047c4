//! Scheduling behavior of the continuous authentication runner

use async_trait::async_trait;
use behavioral_auth_agent::collector::{CaptureConfig, InputCapture, InputEvent, MonotonicClock};
use behavioral_auth_agent::core::{
    AuthEvent, AuthRunner, AuthState, ContinuousAuthController, ControllerConfig,
    ControllerHandle, DeviceInfo, DeviceOverrides,
};
use behavioral_auth_agent::transparency::create_shared_log;
use behavioral_auth_agent::verdict::{
    AuthCycleResult, Verdict, VerdictError, VerdictRequest, VerdictService,
};
use behavioral_auth_agent::InputSink;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const INTERVAL: Duration = Duration::from_secs(1);

/// Fails a fixed number of times, then answers with a fixed verdict after an
/// optional delay. Records every request it sees.
struct ScriptedService {
    calls: AtomicUsize,
    failures: usize,
    delay: Duration,
    verdict: Verdict,
    requests: Mutex<Vec<VerdictRequest>>,
}

impl ScriptedService {
    fn new(failures: usize, delay: Duration, verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures,
            delay,
            verdict,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerdictService for ScriptedService {
    async fn authenticate(
        &self,
        request: &VerdictRequest,
    ) -> Result<AuthCycleResult, VerdictError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if call < self.failures {
            return Err(VerdictError::Network("connection refused".to_string()));
        }
        tokio::time::sleep(self.delay).await;
        Ok(AuthCycleResult {
            verdict: self.verdict,
            confidence: 0.9,
            risk_level: "medium".to_string(),
            requires_step_up: false,
        })
    }
}

fn spawn_runner(
    service: Arc<ScriptedService>,
) -> (ControllerHandle, InputSink, mpsc::UnboundedReceiver<AuthEvent>) {
    let stats = create_shared_log();
    let capture = InputCapture::new(CaptureConfig::default(), MonotonicClock::shared(), stats.clone());
    let config = ControllerConfig {
        interval: INTERVAL,
        ..ControllerConfig::default()
    };
    let device = DeviceInfo::detect(&DeviceOverrides::default());
    let controller = ContinuousAuthController::new(config, capture, device, stats);
    let sink = controller.input_sink();

    let (runner, handle, events) = AuthRunner::new(controller, service, Duration::from_millis(50));
    tokio::spawn(runner.run());
    (handle, sink, events)
}

fn drain(events: &mut mpsc::UnboundedReceiver<AuthEvent>) -> Vec<AuthEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

#[tokio::test(start_paused = true)]
async fn test_cycles_keep_firing_after_failures() {
    let service = ScriptedService::new(10, Duration::ZERO, Verdict::Genuine);
    let (handle, _sink, mut events) = spawn_runner(service.clone());

    assert!(handle.start("alice").await.unwrap());
    tokio::time::sleep(INTERVAL * 11 + Duration::from_millis(500)).await;

    assert_eq!(service.calls(), 11);

    let received = drain(&mut events);
    let failures = received
        .iter()
        .filter(|e| matches!(e, AuthEvent::SubmissionFailed { .. }))
        .count();
    assert_eq!(failures, 10);
    assert!(matches!(
        received.last(),
        Some(AuthEvent::Verdict { cycle: 11, .. })
    ));

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, AuthState::Active);
    assert_eq!(status.cycles, 11);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_submission_ignores_late_verdict() {
    let service = ScriptedService::new(0, Duration::from_secs(5), Verdict::Impostor);
    let (handle, _sink, mut events) = spawn_runner(service.clone());

    handle.start("alice").await.unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(500)).await;
    assert_eq!(service.calls(), 1);

    handle.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(service.calls(), 1);
    assert!(drain(&mut events).is_empty());
    assert_eq!(handle.status().await.unwrap().state, AuthState::Idle);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_impostor_verdict_then_step_up() {
    let service = ScriptedService::new(0, Duration::ZERO, Verdict::Impostor);
    let (handle, _sink, mut events) = spawn_runner(service.clone());

    handle.start("alice").await.unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(500)).await;

    assert!(matches!(
        events.recv().await,
        Some(AuthEvent::StepUpRequired { cycle: 1, .. })
    ));
    assert_eq!(handle.status().await.unwrap().state, AuthState::AwaitingStepUp);

    // Capture and submissions continue while awaiting.
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(service.calls(), 2);

    assert!(handle.verify_step_up("12345").await.unwrap().is_err());
    assert!(handle.verify_step_up("424242").await.unwrap().is_ok());
    assert_eq!(handle.status().await.unwrap().state, AuthState::Active);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_back_to_back() {
    let service = ScriptedService::new(0, Duration::ZERO, Verdict::Genuine);
    let (handle, sink, _events) = spawn_runner(service.clone());

    handle.start("alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let now = sink.now_ms().floor();
    sink.send(InputEvent::key_down(now, "KeyA")).unwrap();
    sink.send(InputEvent::key_up(now + 80.0, "KeyA")).unwrap();
    sink.send(InputEvent::key_down(now + 200.0, "KeyB")).unwrap();
    sink.send(InputEvent::key_up(now + 260.0, "KeyB")).unwrap();

    tokio::time::sleep(INTERVAL * 2).await;

    let requests = service.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].features["key_count"], 2.0);
    assert_eq!(requests[0].features["dwell_mean"], 70.0);
    assert_eq!(requests[0].features["flight_mean"], 180.0);
    assert_eq!(requests[1].features["key_count"], 0.0);
    assert_eq!(requests[0].session_id, requests[1].session_id);
    assert_eq!(requests[0].features.len(), 13);

    handle.shutdown();
}
