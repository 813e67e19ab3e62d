//! Lifecycle of the singleton remote detection task.
//!
//! The backend runs at most one detection task. Its liveness is never
//! inferred from the client's own commands; the client derives a display
//! state from exactly two facts: whether a command is in flight, and what
//! the last successful status poll reported. The ambiguous Starting and
//! Stopping windows have no timeout; any successful status observation
//! resolves them to the polled truth.
//!
//! Gating is advisory. UIs disable their start/stop affordances from
//! [`RunControl::can_start`]/[`RunControl::can_stop`], but the backend must
//! itself arbitrate racing commands from independent clients.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use platewatch_core::types::{Ack, StreamStatus};
use platewatch_core::{ApiError, DetectionApi, StartRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Stopped => "stopped",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Stop,
}

/// Derived run state. Holds no remote truth of its own.
#[derive(Debug, Default)]
pub struct RunControl {
    in_flight: Option<CommandKind>,
    /// Command acknowledged by the backend but not yet confirmed by a poll.
    awaiting_poll: Option<CommandKind>,
    last_task_running: Option<bool>,
}

impl RunControl {
    pub fn state(&self) -> RunState {
        match self.in_flight.or(self.awaiting_poll) {
            Some(CommandKind::Start) => RunState::Starting,
            Some(CommandKind::Stop) => RunState::Stopping,
            None if self.last_task_running.unwrap_or(false) => RunState::Running,
            None => RunState::Stopped,
        }
    }

    /// False while a command is in flight or the task is already running.
    pub fn can_start(&self) -> bool {
        self.in_flight.is_none() && !self.last_task_running.unwrap_or(false)
    }

    /// False while a command is in flight or no task is running.
    pub fn can_stop(&self) -> bool {
        self.in_flight.is_none() && self.last_task_running.unwrap_or(false)
    }

    pub fn command_sent(&mut self, kind: CommandKind) {
        self.in_flight = Some(kind);
    }

    /// A failed command leaves the derived state on the polled truth; a
    /// successful one keeps the ambiguous window open until the next poll.
    pub fn command_finished(&mut self, acknowledged: bool) {
        self.awaiting_poll = if acknowledged { self.in_flight } else { None };
        self.in_flight = None;
    }

    pub fn status_observed(&mut self, status: &StreamStatus) {
        self.last_task_running = Some(status.is_task_running);
        self.awaiting_poll = None;
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("another command is already in flight")]
    Busy,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Busy => "another command is already in flight".into(),
            CommandError::Api(e) => e.user_message(),
        }
    }
}

/// Acknowledgment plus the status re-fetched right after the command.
/// `status` is None when that refresh itself failed; the next poll re-syncs.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub ack: Ack,
    pub status: Option<StreamStatus>,
}

/// Sends start/stop commands and keeps the derived state current.
///
/// Every command, acknowledged or failed, is followed by one status
/// refresh so the display re-syncs to ground truth instead of assuming the
/// command took effect. Neither command awaits task termination or spin-up;
/// only the acknowledgment.
pub struct Commander {
    api: Arc<dyn DetectionApi>,
    control: Mutex<RunControl>,
}

impl Commander {
    pub fn new(api: Arc<dyn DetectionApi>) -> Self {
        Commander {
            api,
            control: Mutex::new(RunControl::default()),
        }
    }

    pub async fn state(&self) -> RunState {
        self.control.lock().await.state()
    }

    pub async fn can_start(&self) -> bool {
        self.control.lock().await.can_start()
    }

    pub async fn can_stop(&self) -> bool {
        self.control.lock().await.can_stop()
    }

    /// Feed a status observed elsewhere (a poller round) into the state.
    pub async fn observe_status(&self, status: &StreamStatus) {
        self.control.lock().await.status_observed(status);
    }

    pub async fn start(&self, req: StartRequest) -> Result<CommandOutcome, CommandError> {
        self.command(CommandKind::Start, move |api| async move {
            api.start_livestream(&req).await
        })
        .await
    }

    pub async fn stop(&self) -> Result<CommandOutcome, CommandError> {
        self.command(CommandKind::Stop, |api| async move {
            api.stop_livestream().await
        })
        .await
    }

    async fn command<F, Fut>(&self, kind: CommandKind, send: F) -> Result<CommandOutcome, CommandError>
    where
        F: FnOnce(Arc<dyn DetectionApi>) -> Fut,
        Fut: std::future::Future<Output = Result<Ack, ApiError>>,
    {
        {
            let mut control = self.control.lock().await;
            if control.in_flight.is_some() {
                return Err(CommandError::Busy);
            }
            control.command_sent(kind);
        }

        let sent = send(self.api.clone()).await;
        // Refresh regardless of the command's fate.
        let refreshed = self.api.livestream_status().await.ok();

        let mut control = self.control.lock().await;
        control.command_finished(sent.is_ok());
        if let Some(status) = &refreshed {
            control.status_observed(status);
        }
        drop(control);

        match sent {
            Ok(ack) => Ok(CommandOutcome {
                ack,
                status: refreshed,
            }),
            Err(e) => {
                tracing::warn!("{:?} command failed: {}", kind, e.user_message());
                Err(CommandError::Api(e))
            }
        }
    }
}
