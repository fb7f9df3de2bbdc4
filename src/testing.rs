//! In-memory collaborators for tests and simulations.
//!
//! Every type here records what the tracker asked of it so a test can
//! assert on the interaction afterwards. Shared state sits behind a mutex,
//! so handles can be cloned into the tracker and kept by the test.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::clock::{TimerHandle, TimerService};
use crate::map::MapRenderer;
use crate::prompt::{DecisionSurface, Notice};
use crate::source::{PositionSource, SourceOptions, SubscriptionHandle};
use crate::{GpsPoint, Result, TrackerError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Clock
// ============================================================================

#[derive(Debug)]
struct ManualTimer {
    handle: TimerHandle,
    period_ms: u64,
    next_fire_ms: i64,
}

#[derive(Debug)]
struct ClockState {
    now_ms: i64,
    next_id: u64,
    timers: Vec<ManualTimer>,
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ClockState>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            state: Mutex::new(ClockState {
                now_ms,
                next_id: 1,
                timers: Vec::new(),
            }),
        }
    }

    /// Move time forward and return the ticks that became due, in firing order.
    pub fn advance(&self, ms: i64) -> Vec<TimerHandle> {
        let mut state = lock(&self.state);
        let target = state.now_ms + ms.max(0);

        let mut fired: Vec<(i64, u64, TimerHandle)> = Vec::new();
        for timer in &mut state.timers {
            while timer.next_fire_ms <= target {
                fired.push((timer.next_fire_ms, timer.handle.0, timer.handle));
                timer.next_fire_ms += timer.period_ms as i64;
            }
        }
        state.now_ms = target;

        fired.sort_by_key(|(at, id, _)| (*at, *id));
        fired.into_iter().map(|(_, _, handle)| handle).collect()
    }

    pub fn active_timers(&self) -> Vec<TimerHandle> {
        lock(&self.state).timers.iter().map(|t| t.handle).collect()
    }

    pub fn period_of(&self, handle: TimerHandle) -> Option<u64> {
        lock(&self.state)
            .timers
            .iter()
            .find(|t| t.handle == handle)
            .map(|t| t.period_ms)
    }
}

impl TimerService for ManualClock {
    fn now_ms(&self) -> i64 {
        lock(&self.state).now_ms
    }

    fn schedule_repeating(&self, period_ms: u64) -> TimerHandle {
        let mut state = lock(&self.state);
        let handle = TimerHandle(state.next_id);
        state.next_id += 1;
        let next_fire_ms = state.now_ms + period_ms.max(1) as i64;
        state.timers.push(ManualTimer {
            handle,
            period_ms: period_ms.max(1),
            next_fire_ms,
        });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        lock(&self.state).timers.retain(|t| t.handle != handle);
    }
}

// ============================================================================
// Position source
// ============================================================================

#[derive(Debug, Default)]
struct SourceState {
    unavailable: bool,
    refuse_subscribe: bool,
    next_id: u64,
    active: Vec<SubscriptionHandle>,
    subscribe_options: Vec<SourceOptions>,
}

/// Position source whose fixes are pushed by the test.
#[derive(Debug, Default)]
pub struct MockPositionSource {
    state: Mutex<SourceState>,
}

impl MockPositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device without any position source.
    pub fn unavailable() -> Self {
        let source = Self::default();
        lock(&source.state).unavailable = true;
        source
    }

    /// Make subsequent subscriptions fail with `PermissionDenied`.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        lock(&self.state).refuse_subscribe = refuse;
    }

    /// The live subscription, if exactly one is open.
    pub fn active(&self) -> Option<SubscriptionHandle> {
        let state = lock(&self.state);
        match state.active.as_slice() {
            [handle] => Some(*handle),
            _ => None,
        }
    }

    pub fn active_count(&self) -> usize {
        lock(&self.state).active.len()
    }

    /// Options of every subscribe call so far.
    pub fn subscribe_options(&self) -> Vec<SourceOptions> {
        lock(&self.state).subscribe_options.clone()
    }
}

impl PositionSource for MockPositionSource {
    fn is_available(&self) -> bool {
        !lock(&self.state).unavailable
    }

    fn subscribe(&self, options: &SourceOptions) -> Result<SubscriptionHandle> {
        let mut state = lock(&self.state);
        if state.refuse_subscribe {
            return Err(TrackerError::Source(
                crate::SourceError::PermissionDenied,
            ));
        }
        state.next_id += 1;
        let handle = SubscriptionHandle(state.next_id);
        state.active.push(handle);
        state.subscribe_options.push(*options);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        lock(&self.state).active.retain(|h| *h != handle);
    }
}

// ============================================================================
// Map
// ============================================================================

/// A call made on the map renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapCall {
    Segment(GpsPoint, GpsPoint),
    Marker(GpsPoint),
    Clear,
}

/// Map renderer that records every call.
#[derive(Debug, Default)]
pub struct RecordingMap {
    calls: Mutex<Vec<MapCall>>,
}

impl RecordingMap {
    pub fn calls(&self) -> Vec<MapCall> {
        lock(&self.calls).clone()
    }

    pub fn segments(&self) -> Vec<(GpsPoint, GpsPoint)> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                MapCall::Segment(from, to) => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }
}

impl MapRenderer for RecordingMap {
    fn add_route_segment(&self, from: GpsPoint, to: GpsPoint) {
        lock(&self.calls).push(MapCall::Segment(from, to));
    }

    fn update_marker_position(&self, at: GpsPoint) {
        lock(&self.calls).push(MapCall::Marker(at));
    }

    fn clear_route(&self) {
        lock(&self.calls).push(MapCall::Clear);
    }
}

// ============================================================================
// Decision surface
// ============================================================================

/// A prompt the surface was asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Confirm(String),
    Text { message: String, default_value: String },
}

#[derive(Debug, Default)]
struct SurfaceState {
    confirms: VecDeque<bool>,
    texts: VecDeque<Option<String>>,
    prompts: Vec<Prompt>,
    notices: Vec<Notice>,
}

/// Decision surface answering from scripted queues.
///
/// When a queue runs dry, `confirm` answers `false` and `prompt_text`
/// answers `None` (cancel).
#[derive(Debug, Default, Clone)]
pub struct ScriptedSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_confirms(&self, answers: &[bool]) -> &Self {
        lock(&self.state).confirms.extend(answers.iter().copied());
        self
    }

    pub fn answer_text(&self, answer: Option<&str>) -> &Self {
        lock(&self.state).texts.push_back(answer.map(str::to_string));
        self
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        lock(&self.state).prompts.clone()
    }

    pub fn confirm_count(&self) -> usize {
        lock(&self.state)
            .prompts
            .iter()
            .filter(|p| matches!(p, Prompt::Confirm(_)))
            .count()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.state).notices.clone()
    }
}

#[async_trait]
impl DecisionSurface for ScriptedSurface {
    async fn confirm(&self, message: &str) -> bool {
        let mut state = lock(&self.state);
        state.prompts.push(Prompt::Confirm(message.to_string()));
        state.confirms.pop_front().unwrap_or(false)
    }

    async fn prompt_text(&self, message: &str, default_value: &str) -> Option<String> {
        let mut state = lock(&self.state);
        state.prompts.push(Prompt::Text {
            message: message.to_string(),
            default_value: default_value.to_string(),
        });
        state.texts.pop_front().flatten()
    }

    fn notify(&self, notice: Notice) {
        lock(&self.state).notices.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_fires_in_order() {
        let clock = ManualClock::new(0);
        let fast = clock.schedule_repeating(1_000);
        let slow = clock.schedule_repeating(2_500);

        let fired = clock.advance(3_000);
        assert_eq!(fired, vec![fast, fast, slow, fast]);
        assert_eq!(clock.now_ms(), 3_000);

        clock.cancel(fast);
        assert_eq!(clock.advance(2_000), vec![slow]);
        assert_eq!(clock.period_of(slow), Some(2_500));
    }

    #[test]
    fn test_mock_source_tracks_subscriptions() {
        let source = MockPositionSource::new();
        let a = source.subscribe(&SourceOptions::default()).unwrap();
        assert_eq!(source.active(), Some(a));
        source.unsubscribe(a);
        assert_eq!(source.active(), None);

        source.refuse_subscriptions(true);
        assert!(source.subscribe(&SourceOptions::default()).is_err());
    }
}
