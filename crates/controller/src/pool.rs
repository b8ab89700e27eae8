//! Concurrent sessions.

use crate::engine::{IterationController, SessionOutcome};
use crate::error::ControllerError;
use geneforge_core::{CircuitSpec, SessionId};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

/// Runs independent sessions concurrently over one controller.
///
/// Sessions share only the adapters and the log; each keeps its own state.
pub struct SessionPool {
    controller: Arc<IterationController>,
    permits: Arc<Semaphore>,
}

impl SessionPool {
    /// Create a pool running at most `max_concurrent` sessions at once.
    pub fn new(controller: Arc<IterationController>, max_concurrent: usize) -> Self {
        Self {
            controller,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Pool sized from the controller configuration.
    pub fn from_config(controller: Arc<IterationController>) -> Self {
        let max = controller.config().max_concurrent_sessions;
        Self::new(controller, max)
    }

    /// The shared controller.
    pub fn controller(&self) -> &Arc<IterationController> {
        &self.controller
    }

    /// Run every spec to completion. Results come back in input order.
    pub async fn run_all(&self, specs: Vec<CircuitSpec>) -> Vec<Result<SessionOutcome, ControllerError>> {
        let count = specs.len();
        info!("Running {} sessions, {} at a time", count, self.permits.available_permits());

        let mut tasks = JoinSet::new();
        for (index, spec) in specs.into_iter().enumerate() {
            let controller = self.controller.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => controller.run_session(SessionId::new(), spec).await,
                    Err(e) => Err(ControllerError::Join(e.to_string())),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<SessionOutcome, ControllerError>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => {
                    // Slot stays empty and is reported below
                    tracing::error!("Session task failed: {}", e);
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(ControllerError::Join("session task panicked or was cancelled".into()))))
            .collect()
    }
}
