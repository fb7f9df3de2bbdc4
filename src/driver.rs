//! # Tokio Event Loop
//!
//! Serializes fixes, source errors, timer ticks and user commands into one
//! queue and applies them to a [`RouteTracker`] in order. [`TokioTimer`]
//! turns repeating timers into `Tick` events on that same queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::{SystemClock, TimerHandle, TimerService};
use crate::source::{SourceError, SubscriptionHandle};
use crate::tracker::RouteTracker;
use crate::{AnnotationKind, PositionFix};

/// A user action.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCommand {
    Start,
    TogglePause,
    Stop,
    Annotate(AnnotationKind, String),
}

/// Anything the tracker reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Fix(SubscriptionHandle, PositionFix),
    SourceError(SubscriptionHandle, SourceError),
    Tick(TimerHandle),
    Command(TrackerCommand),
}

/// Apply events to `tracker` until every sender is dropped, then hand the
/// tracker back.
///
/// Save prompts run inline: events queued while the user decides are
/// processed afterwards, against the post-stop state.
pub async fn run(mut tracker: RouteTracker, mut events: UnboundedReceiver<TrackerEvent>) -> RouteTracker {
    info!("[Driver] Event loop started");

    while let Some(event) = events.recv().await {
        match event {
            TrackerEvent::Fix(handle, fix) => {
                tracker.on_fix(handle, fix);
            }
            TrackerEvent::SourceError(handle, error) => {
                if let Some(outcome) = tracker.on_source_error(handle, error).await {
                    info!("[Driver] Tracking ended by source error: {:?}", outcome);
                }
            }
            TrackerEvent::Tick(handle) => {
                tracker.on_timer(handle);
            }
            TrackerEvent::Command(command) => apply_command(&mut tracker, command).await,
        }
    }

    info!("[Driver] Event loop finished");
    tracker
}

async fn apply_command(tracker: &mut RouteTracker, command: TrackerCommand) {
    debug!("[Driver] Command {:?}", command);
    match command {
        TrackerCommand::Start => {
            // An unsaved route gets one more save round before a new one starts
            if tracker.has_unsaved_route() {
                match tracker.prompt_save().await {
                    Ok(outcome) => info!("[Driver] Unsaved route resolved: {:?}", outcome),
                    Err(e) => warn!("[Driver] Failed to resolve unsaved route: {}", e),
                }
            }
            if let Err(e) = tracker.start() {
                warn!("[Driver] Failed to start tracking: {}", e);
            }
        }
        TrackerCommand::TogglePause => {
            if let Err(e) = tracker.toggle_pause() {
                warn!("[Driver] Failed to toggle pause: {}", e);
            }
        }
        TrackerCommand::Stop => {
            if let Some(outcome) = tracker.stop().await {
                info!("[Driver] Stopped: {:?}", outcome);
            }
        }
        TrackerCommand::Annotate(kind, content) => {
            if let Err(e) = tracker.add_annotation(kind, content) {
                warn!("[Driver] Annotation dropped: {}", e);
            }
        }
    }
}

// ============================================================================
// Timer service
// ============================================================================

/// Timer service backed by tokio tasks.
///
/// Each repeating timer is a spawned task that sends `Tick(handle)` into the
/// event queue. The timer holds the queue weakly, so it never keeps the
/// event loop alive on its own.
pub struct TokioTimer {
    events: WeakUnboundedSender<TrackerEvent>,
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TimerHandle, JoinHandle<()>>>,
}

impl TokioTimer {
    pub fn new(events: &UnboundedSender<TrackerEvent>, runtime: Handle) -> Self {
        Self {
            events: events.downgrade(),
            runtime,
            next_id: AtomicU64::new(0),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of timers not yet cancelled.
    pub fn active_count(&self) -> usize {
        self.tasks().len()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TimerHandle, JoinHandle<()>>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TimerService for TokioTimer {
    fn now_ms(&self) -> i64 {
        SystemClock::now_ms()
    }

    fn schedule_repeating(&self, period_ms: u64) -> TimerHandle {
        let handle = TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let period = Duration::from_millis(period_ms.max(1));
        let events = self.events.clone();

        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(sender) = events.upgrade() else { break };
                if sender.send(TrackerEvent::Tick(handle)).is_err() {
                    break;
                }
            }
            debug!("[TokioTimer] {} finished", handle);
        });

        self.tasks().insert(handle, task);
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(task) = self.tasks().remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks().drain() {
            task.abort();
        }
    }
}
