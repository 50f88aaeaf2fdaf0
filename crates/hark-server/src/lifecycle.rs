use std::sync::{Arc, Mutex, PoisonError};

use asr::EngineSession;
use tokio_util::sync::CancellationToken;

/// Server lifecycle states
///
/// Transitions only move forward; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No engine session yet
    Uninitialized,
    /// Engine session created, not yet accepting connections
    Initialized,
    /// Accepting connections
    Listening,
    /// Shut down, engine session released
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Listening => "listening",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub(crate) struct Lifecycle {
    state: Mutex<LifecycleState>,
    session: Mutex<Option<EngineSession>>,
    stop_token: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
            session: Mutex::new(None),
            stop_token: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stop_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }

    /// Take ownership of the engine session
    pub(crate) fn initialize(&self, session: EngineSession) -> anyhow::Result<()> {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Initialized)?;
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    pub(crate) fn begin_listening(&self) -> anyhow::Result<()> {
        self.transition(LifecycleState::Initialized, LifecycleState::Listening)
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if *state != from {
            anyhow::bail!("cannot move server from {} to {to}", *state);
        }

        tracing::debug!(from = %*state, %to, "server lifecycle transition");
        *state = to;
        Ok(())
    }

    /// Stop the server
    ///
    /// Returns `false` when the server was already stopped. A listening
    /// server keeps its engine session until in-flight requests have drained
    /// and [`Lifecycle::finish`] runs; otherwise the session is released now.
    pub(crate) fn stop(&self) -> bool {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == LifecycleState::Stopped {
                return false;
            }
            std::mem::replace(&mut *state, LifecycleState::Stopped)
        };

        self.stop_token.cancel();

        if previous == LifecycleState::Listening {
            tracing::info!("server stopping, draining in-flight requests");
        } else {
            self.release_session();
        }

        true
    }

    /// Stop if needed and release the engine session once serving has ended
    pub(crate) fn finish(&self) {
        self.stop();
        self.release_session();
    }

    fn release_session(&self) {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner).take();

        if let Some(session) = session {
            session.release();
            tracing::info!("server stopped");
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Handle for observing and stopping a server from elsewhere
#[derive(Clone)]
pub struct ServerHandle {
    lifecycle: Arc<Lifecycle>,
}

impl ServerHandle {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Stop the server; calling it again has no effect
    ///
    /// The listener stops accepting connections at once. Requests already in
    /// flight still reach the engine, which is released after they finish.
    pub fn stop(&self) -> bool {
        self.lifecycle.stop()
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle").field("state", &self.state()).finish()
    }
}
