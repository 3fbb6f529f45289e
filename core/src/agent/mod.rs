//! Background workers that drive the store from their own threads.

mod enrich;
mod sync;

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

pub use enrich::{DEFAULT_POLL_INTERVAL, EnrichmentAgent, EnrichmentReport};
pub use sync::{SyncAgent, SyncCommand, SyncReport};

const JOIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("shared surface is no longer available")]
    InvalidSurface,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} agent panicked")]
    Panicked(&'static str),
}

/// Terminal status of an agent run, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    RequestFailed,
    InvalidParams,
    InvalidSurface,
    Generic,
}

impl AgentStatus {
    pub fn of<T>(result: &Result<T, AgentError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(AgentError::RequestFailed(_)) => Self::RequestFailed,
            Err(AgentError::InvalidParams(_)) => Self::InvalidParams,
            Err(AgentError::InvalidSurface) => Self::InvalidSurface,
            Err(AgentError::Store(_) | AgentError::Spawn { .. } | AgentError::Panicked(_)) => {
                Self::Generic
            }
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::RequestFailed => "request failed",
            Self::InvalidParams => "invalid parameters",
            Self::InvalidSurface => "invalid surface",
            Self::Generic => "failed",
        })
    }
}

/// A running agent. Dropping the handle detaches the thread.
#[derive(Debug)]
pub struct AgentHandle<T> {
    name: &'static str,
    thread: JoinHandle<Result<T, AgentError>>,
}

impl<T: Send + 'static> AgentHandle<T> {
    pub(crate) fn spawn(
        name: &'static str,
        work: impl FnOnce() -> Result<T, AgentError> + Send + 'static,
    ) -> Result<Self, AgentError> {
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(work)
            .map_err(|source| AgentError::Spawn { name, source })?;
        Ok(Self { name, thread })
    }
}

impl<T> AgentHandle<T> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the agent exits.
    pub fn join(self) -> Result<T, AgentError> {
        let name = self.name;
        self.thread
            .join()
            .unwrap_or(Err(AgentError::Panicked(name)))
    }

    /// Block for at most `timeout`. Hands the handle back if the agent is
    /// still running.
    pub fn join_timeout(self, timeout: Duration) -> Result<Result<T, AgentError>, Self> {
        let deadline = Instant::now() + timeout;
        while !self.thread.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                return Err(self);
            }
            thread::sleep(JOIN_POLL.min(deadline - now));
        }
        Ok(self.join())
    }
}
