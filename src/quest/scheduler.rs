//! Deferred task completion for timer tasks.
//!
//! Each scheduled timer sleeps on its own tokio task and, unless its handle
//! is cancelled first, sends a `DeferredCompletion` to the engine worker.
//! The engine re-checks the player's state before acting on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::hooks::PlayerId;

/// A timer that ran out and wants its task completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredCompletion {
    pub timer_id: u64,
    pub player: PlayerId,
    pub quest_name: String,
    pub task: usize,
}

/// Cancellable handle to one scheduled completion
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owned by the engine; created on start and shut down with it
#[derive(Debug)]
pub struct DeferredTaskScheduler {
    next_id: AtomicU64,
    shutdown: CancellationToken,
    fired: mpsc::UnboundedSender<DeferredCompletion>,
}

impl DeferredTaskScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeferredCompletion>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            fired,
        };
        (scheduler, rx)
    }

    /// Uniform delay in `[min_secs, max_secs)`, or exactly `min_secs` when
    /// the range is empty
    pub fn random_delay(min_secs: u32, max_secs: u32) -> Duration {
        if max_secs <= min_secs {
            return Duration::from_secs(u64::from(min_secs));
        }
        let secs = rand::thread_rng().gen_range(f64::from(min_secs)..f64::from(max_secs));
        Duration::from_secs_f64(secs)
    }

    /// Schedule exactly one completion of `task` after `delay`
    pub fn schedule(
        &self,
        player: PlayerId,
        quest_name: &str,
        task: usize,
        delay: Duration,
    ) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        let handle = TimerHandle {
            id,
            token: token.clone(),
        };

        let fired = self.fired.clone();
        let completion = DeferredCompletion {
            timer_id: id,
            player,
            quest_name: quest_name.to_string(),
            task,
        };

        debug!(
            "Scheduled timer {} for {} quest '{}' task {} in {:?}",
            id, player, quest_name, task, delay
        );

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!("Timer {} cancelled", completion.timer_id);
                }
                _ = tokio::time::sleep(delay) => {
                    if fired.send(completion).is_err() {
                        debug!("Timer {} fired after the engine stopped", id);
                    }
                }
            }
        });

        handle
    }

    /// Cancel every outstanding timer. Later schedules are cancelled at once.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
