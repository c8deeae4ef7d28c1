//! Cancellable watcher over RAPID execution.
//!
//! While a motion command occupies an arm socket, the only way a
//! controller-side stop (collision, motion supervision) becomes visible is
//! the task list going quiet. The coordinator runs this watcher next to
//! every motion and reacts to whichever finishes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::Result;
use crate::rws::RwsClient;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supervision {
    /// The cancel signal was set; the motion finished on its own.
    Cancelled,
    /// RAPID tasks stopped running before the cancel signal.
    ProgramStopped,
}

/// Polls `all_tasks_running` until the tasks stop or `cancel` is set.
/// RWS query failures propagate as errors.
pub async fn block_while_running(rws: RwsClient, cancel: Arc<AtomicBool>) -> Result<Supervision> {
    while rws.all_tasks_running().await? && !cancel.load(Ordering::Relaxed) {
        sleep(POLL_INTERVAL).await;
    }

    if cancel.load(Ordering::Relaxed) {
        Ok(Supervision::Cancelled)
    } else {
        Ok(Supervision::ProgramStopped)
    }
}
