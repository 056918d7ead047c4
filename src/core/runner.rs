//! Async driver for [`ContinuousAuthController`].
//!
//! A single task owns the controller. It drains queued input, fires the
//! authentication cycle on a fixed period and dispatches submissions without
//! blocking the next cycle. Callers talk to it through a [`ControllerHandle`]
//! and receive [`AuthEvent`]s on a channel.

use crate::core::controller::{
    AuthEvent, ContinuousAuthController, ControllerStatus, PendingSubmission, StepUpError,
};
use crate::verdict::{AuthCycleResult, VerdictError, VerdictService};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Errors returned by [`ControllerHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// The runner has shut down
    Closed,
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerError::Closed => write!(f, "Controller is no longer running"),
        }
    }
}

impl std::error::Error for ControllerError {}

enum Command {
    Start {
        user_id: String,
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    VerifyStepUp {
        code: String,
        reply: oneshot::Sender<Result<(), StepUpError>>,
    },
    Logout {
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
    Shutdown,
}

/// Cloneable handle to a running [`AuthRunner`].
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Start continuous authentication for a user. Returns `false` if the
    /// controller was already running.
    pub async fn start(&self, user_id: impl Into<String>) -> Result<bool, ControllerError> {
        let user_id = user_id.into();
        self.request(|reply| Command::Start { user_id, reply }).await
    }

    pub async fn stop(&self) -> Result<(), ControllerError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn verify_step_up(
        &self,
        code: impl Into<String>,
    ) -> Result<Result<(), StepUpError>, ControllerError> {
        let code = code.into();
        self.request(|reply| Command::VerifyStepUp { code, reply })
            .await
    }

    /// Log the current user out. Returns `false` if nobody was logged in.
    pub async fn logout(&self) -> Result<bool, ControllerError> {
        self.request(|reply| Command::Logout { reply }).await
    }

    pub async fn status(&self) -> Result<ControllerStatus, ControllerError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Ask the runner to stop and exit. Safe to call from any thread.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ControllerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| ControllerError::Closed)?;
        response.await.map_err(|_| ControllerError::Closed)
    }
}

struct Completed {
    generation: u64,
    cycle: u64,
    outcome: Result<AuthCycleResult, VerdictError>,
}

/// Owns the controller and drives it from a tokio task.
pub struct AuthRunner {
    controller: ContinuousAuthController,
    service: Arc<dyn VerdictService>,
    drain_interval: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<AuthEvent>,
}

impl AuthRunner {
    pub fn new(
        controller: ContinuousAuthController,
        service: Arc<dyn VerdictService>,
        drain_interval: Duration,
    ) -> (Self, ControllerHandle, mpsc::UnboundedReceiver<AuthEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let runner = Self {
            controller,
            service,
            drain_interval,
            commands: command_rx,
            events: event_tx,
        };
        (runner, ControllerHandle { commands: command_tx }, event_rx)
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        let mut ticker: Option<Interval> = None;
        let mut drain = tokio::time::interval(self.drain_interval.max(Duration::from_millis(1)));
        drain.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Completed>> =
            FuturesUnordered::new();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command, &mut ticker),
                },
                _ = next_tick(&mut ticker) => {
                    if let Some(submission) = self.controller.tick() {
                        in_flight.push(self.dispatch(submission));
                    }
                }
                _ = drain.tick() => {
                    self.controller.pump_input();
                }
                Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                    self.complete(done);
                }
            }
        }

        self.controller.stop();
        info!("auth runner exited");
    }

    fn handle_command(&mut self, command: Command, ticker: &mut Option<Interval>) {
        match command {
            Command::Start { user_id, reply } => {
                let started = self.controller.start(user_id);
                if started {
                    *ticker = Some(cycle_interval(self.controller.interval()));
                }
                let _ = reply.send(started);
            }
            Command::Stop { reply } => {
                self.controller.stop();
                *ticker = None;
                let _ = reply.send(());
            }
            Command::VerifyStepUp { code, reply } => {
                let result = self.controller.verify_step_up(&code);
                if result.is_ok() {
                    self.emit(AuthEvent::StepUpResolved);
                }
                let _ = reply.send(result);
            }
            Command::Logout { reply } => {
                let event = self.controller.logout();
                *ticker = None;
                let logged_out = event.is_some();
                if let Some(event) = event {
                    self.emit(event);
                }
                let _ = reply.send(logged_out);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.controller.status());
            }
            Command::Shutdown => {}
        }
    }

    fn dispatch(&self, submission: PendingSubmission) -> BoxFuture<'static, Completed> {
        let service = self.service.clone();
        debug!(cycle = submission.cycle, "dispatching verdict submission");
        Box::pin(async move {
            let outcome = service.authenticate(&submission.request).await;
            Completed {
                generation: submission.generation,
                cycle: submission.cycle,
                outcome,
            }
        })
    }

    fn complete(&mut self, done: Completed) {
        let event = match done.outcome {
            Ok(result) => self.controller.apply_verdict(done.generation, done.cycle, result),
            Err(error) => self
                .controller
                .submission_failed(done.generation, done.cycle, &error),
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn emit(&self, event: AuthEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

/// First tick lands one full period after start.
fn cycle_interval(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
