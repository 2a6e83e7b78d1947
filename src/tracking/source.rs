use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::{ReplaySource, SimulatedSource};
use crate::model::Fix;

/// How hard the provider should try for a precise fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    #[default]
    Best,
    Balanced,
    Coarse,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FixError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location provider disabled")]
    ProviderDisabled,
    #[error("timed out waiting for a fix")]
    Timeout,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Something that can produce a single position fix on request
pub trait PositionSource: Send + Sync + 'static {
    /// Request one fix. Implementations should give up after `timeout`, the
    /// sampler enforces it regardless.
    fn get_fix(
        &self,
        accuracy: Accuracy,
        timeout: Duration,
    ) -> impl Future<Output = Result<Fix, FixError>> + Send;
}

/// Source picked at startup from the command line
pub enum Source {
    Simulated(SimulatedSource),
    Replay(ReplaySource),
}

impl PositionSource for Source {
    async fn get_fix(&self, accuracy: Accuracy, timeout: Duration) -> Result<Fix, FixError> {
        match self {
            Self::Simulated(sim) => sim.get_fix(accuracy, timeout).await,
            Self::Replay(replay) => replay.get_fix(accuracy, timeout).await,
        }
    }
}
