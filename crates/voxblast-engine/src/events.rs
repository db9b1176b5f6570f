//! Engine-emitted events and the predicate-wait primitive used at every
//! "wait for the next event that also satisfies P" site.

use std::time::Duration;

use tokio::sync::broadcast;

use voxblast_core::BlockPos;

/// Why a charge was considered destroyed ahead of the authoritative removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastKillReason {
    AreaEffect,
    AudioCue,
}

/// Notifications the engine exposes to the host/caller.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Authoritative removals of confirmed charges, batched per host event.
    ChargesDestroyed(Vec<BlockPos>),
    /// A confirmed charge was inferred destroyed from a secondary signal.
    FastDestroyed {
        reason: FastKillReason,
        position: BlockPos,
    },
}

/// Wait up to `timeout` for the next broadcast value matching `pred`.
///
/// Lagged receivers skip ahead rather than fail; a closed channel or an
/// elapsed timeout both yield `None`.
pub async fn wait_for<T, F>(
    rx: &mut broadcast::Receiver<T>,
    timeout: Duration,
    mut pred: F,
) -> Option<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let recv = tokio::time::timeout_at(deadline, rx.recv());
        match recv.await {
            Ok(Ok(value)) if pred(&value) => return Some(value),
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
        }
    }
}
