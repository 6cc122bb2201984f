//! The dispatch loop.
//!
//! Lines arrive on a channel from the tail; each runs through
//! extract → parse → resolve → govern → spawn to completion before the next
//! is looked at. Any stage may drop a line, and a dropped line has no effect
//! beyond a trace event.
//!
//! Process exits come back to the loop on a second channel, so the governor
//! is only ever touched from the loop's own task.

use crate::env_policy::EnvPolicy;
use crate::error::Rejection;
use crate::extract::extract_path;
use crate::governor::{Governor, GovernorConfig};
use crate::limits::ParseLimits;
use crate::parse::parse_command;
use crate::registry::CommandRegistry;
use crate::request::ExecutionRequest;
use crate::spawner::{Completion, OutputMode, Spawner};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Everything a dispatcher needs besides its registry.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub parse: ParseLimits,
    pub governor: GovernorConfig,
    pub env: EnvPolicy,
    pub output: OutputMode,
}

/// Lifecycle of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Stopped,
    Watching,
}

/// Why watching ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The line source closed (tail ended or sender dropped).
    SourceClosed,
    /// A stop was requested through the handle.
    Requested,
    /// The loop task panicked or was aborted.
    Aborted,
}

/// Turns log lines into governed process executions.
#[derive(Debug)]
pub struct Dispatcher {
    registry: CommandRegistry,
    limits: ParseLimits,
    governor: Governor,
    spawner: Spawner,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry, config: DispatchConfig) -> Self {
        let spawner = Spawner::new(&config.env, config.governor.limits, config.output);
        Self {
            registry,
            limits: config.parse,
            governor: Governor::new(config.governor),
            spawner,
        }
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Run a line through extraction, parsing and resolution.
    ///
    /// Pure: no governor state changes and nothing is spawned.
    pub fn prepare_line(&self, line: &str) -> Result<ExecutionRequest, Rejection> {
        let path = extract_path(line, &self.limits)?;
        let parsed = parse_command(&path, &self.limits)?;
        self.registry.resolve(&parsed)
    }

    /// Start consuming `lines`. The dispatcher is Watching once this returns.
    ///
    /// Must be called within a tokio runtime.
    pub fn watch(self, lines: mpsc::Receiver<String>) -> DispatchHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(DispatchState::Watching);

        tracing::info!(commands = ?self.registry.names(), "watching");
        let task = tokio::spawn(self.run(lines, stop_rx, state_tx));

        DispatchHandle {
            stopper: StopHandle { tx: stop_tx },
            state: state_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut lines: mpsc::Receiver<String>,
        mut stop: mpsc::Receiver<()>,
        state: watch::Sender<DispatchState>,
    ) -> StopReason {
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<()>();

        let reason = loop {
            tokio::select! {
                biased;
                Some(()) = stop.recv() => break StopReason::Requested,
                Some(()) = exit_rx.recv() => self.governor.release(),
                line = lines.recv() => match line {
                    Some(line) => self.handle_line(&line, &exit_tx),
                    None => break StopReason::SourceClosed,
                },
            }
        };

        // Detach from the source; running children are left alone.
        drop(lines);
        state.send_replace(DispatchState::Stopped);
        tracing::info!(reason = ?reason, "watching stopped");
        reason
    }

    fn handle_line(&mut self, line: &str, exits: &mpsc::UnboundedSender<()>) {
        let request = match self.prepare_line(line) {
            Ok(request) => request,
            Err(rejection) => {
                tracing::trace!(stage = rejection.stage(), "line dropped");
                return;
            }
        };

        if let Err(rejection) = self.governor.try_admit(Instant::now()) {
            tracing::trace!(stage = rejection.stage(), "line dropped");
            return;
        }

        let process = match self.spawner.spawn(&request) {
            Ok(process) => process,
            Err(err) => {
                self.governor.release();
                tracing::error!(command = %request.command(), error = %err, "spawn failed");
                return;
            }
        };

        tracing::debug!(
            command = %request.command(),
            pid = ?process.id(),
            args = request.args().len(),
            "started"
        );

        let exits = exits.clone();
        tokio::spawn(async move {
            let pid = process.id();
            let command = process.command().to_string();
            let mut out = tokio::io::stdout();
            let mut err = tokio::io::stderr();

            match process.supervise(&mut out, &mut err).await {
                Ok(Completion::Exited(status)) => {
                    tracing::debug!(%command, ?pid, code = ?status.code(), "exited");
                }
                Ok(Completion::TimedOut { limit }) => {
                    tracing::warn!(%command, ?pid, ?limit, "killed after timeout");
                }
                Ok(Completion::OutputCapped { limit }) => {
                    tracing::warn!(%command, ?pid, limit, "killed after output cap");
                }
                Err(err) => {
                    tracing::error!(%command, ?pid, error = %err, "supervision failed");
                }
            }

            // The loop may already be gone after a stop
            let _ = exits.send(());
        });
    }
}

/// Cloneable way to ask a running dispatcher to stop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<()>,
}

impl StopHandle {
    /// Ask the loop to stop. Idempotent; a no-op once it has stopped.
    pub fn request_stop(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Handle to a watching dispatcher.
#[derive(Debug)]
pub struct DispatchHandle {
    stopper: StopHandle,
    state: watch::Receiver<DispatchState>,
    task: JoinHandle<StopReason>,
}

impl DispatchHandle {
    pub fn state(&self) -> DispatchState {
        *self.state.borrow()
    }

    pub fn stopper(&self) -> StopHandle {
        self.stopper.clone()
    }

    /// Stop watching and wait for the loop to exit.
    ///
    /// Processes already spawned keep running.
    pub async fn stop(self) -> StopReason {
        self.stopper.request_stop();
        self.wait().await
    }

    /// Wait for the loop to exit on its own (or via a [`StopHandle`]).
    pub async fn wait(self) -> StopReason {
        self.task.await.unwrap_or(StopReason::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SEARCH: &str = "/usr/bin:/bin";

    fn dispatcher() -> Dispatcher {
        let registry = CommandRegistry::builder()
            .search_path(SEARCH)
            .allow("echo")
            .build()
            .unwrap();
        Dispatcher::new(
            registry,
            DispatchConfig {
                env: EnvPolicy::SearchPathOnly(SEARCH.to_string()),
                output: OutputMode::Discard,
                ..DispatchConfig::default()
            },
        )
    }

    #[test]
    fn test_prepare_allowlisted_line() {
        let request = dispatcher()
            .prepare_line("127.0.0.1 - - \"GET /echo/hello HTTP/1.1\" 200 12")
            .unwrap();
        assert_eq!(request.command(), "echo");
        assert_eq!(request.args(), ["hello".to_string()]);
    }

    #[test]
    fn test_prepare_unknown_command() {
        assert_eq!(
            dispatcher().prepare_line("GET /missing/x HTTP/1.1"),
            Err(Rejection::NotAllowed)
        );
    }

    #[test]
    fn test_prepare_decodes_arguments() {
        let request = dispatcher()
            .prepare_line("GET /echo/staging%2Fweb/a%20b?ignored=1 HTTP/1.1")
            .unwrap();
        assert_eq!(request.args(), ["staging/web".to_string(), "a b".to_string()]);
    }

    #[test]
    fn test_prepare_leaves_governor_untouched() {
        let d = dispatcher();
        d.prepare_line("GET /echo/hi HTTP/1.1").unwrap();
        assert_eq!(d.governor().state().window_count, 0);
        assert_eq!(d.governor().state().in_flight, 0);
    }

    #[tokio::test]
    async fn test_source_close_stops() {
        let (tx, rx) = mpsc::channel(8);
        let handle = dispatcher().watch(rx);
        assert_eq!(handle.state(), DispatchState::Watching);

        tx.send("not a request".to_string()).await.unwrap();
        drop(tx);

        let reason = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(reason, StopReason::SourceClosed);
    }

    #[tokio::test]
    async fn test_stop_request() {
        let (tx, rx) = mpsc::channel(8);
        let handle = dispatcher().watch(rx);
        let mut state = handle.state.clone();

        let reason = tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .unwrap();
        assert_eq!(reason, StopReason::Requested);
        assert_eq!(*state.borrow_and_update(), DispatchState::Stopped);

        // Source is detached
        assert!(tx.send("GET /echo/x HTTP/1.1".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_stopper_from_another_task() {
        let (_tx, rx) = mpsc::channel::<String>(8);
        let handle = dispatcher().watch(rx);
        let stopper = handle.stopper();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.request_stop();
        });

        let reason = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(reason, StopReason::Requested);
    }
}
