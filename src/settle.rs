//! Capture readiness state machine
//!
//! [`SettleTracker`] turns page lifecycle and network events into a single
//! decision: *when* to capture. It owns the set of in-flight requests and two
//! deadlines:
//!
//! - the **settle deadline**, scheduled `quiet_period` after the in-flight set
//!   empties and cancelled by any new request;
//! - the **max-wait deadline**, `max_wait` after navigation start, which bounds
//!   the wait for pages that never go idle.
//!
//! The tracker never sleeps or spawns anything. Callers feed it events with the
//! instant they were observed and ask [`SettleTracker::poll`] whether a deadline
//! has passed; [`SettleTracker::next_deadline`] says when to ask again.

use crate::{CaptureError, SettlePolicy, WaitStrategy};
use serde::Serialize;
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Lifecycle of a single capture
///
/// `Idle -> Loading -> NavigationFailed` or
/// `Idle -> Loading -> WatchingRequests -> Settled`. With
/// [`WaitStrategy::LoadFinished`] the tracker goes from `Loading` straight to
/// `Settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Loading,
    NavigationFailed,
    WatchingRequests,
    Settled(CaptureTrigger),
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::NavigationFailed | CaptureState::Settled(_)
        )
    }

    fn can_transition_to(&self, next: &CaptureState) -> bool {
        matches!(
            (self, next),
            (CaptureState::Idle, CaptureState::Loading)
                | (CaptureState::Loading, CaptureState::NavigationFailed)
                | (CaptureState::Loading, CaptureState::WatchingRequests)
                | (
                    CaptureState::Loading,
                    CaptureState::Settled(CaptureTrigger::LoadFinished)
                )
                | (CaptureState::WatchingRequests, CaptureState::Settled(_))
        )
    }
}

/// What made the page count as ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTrigger {
    /// No request was in flight for the whole quiet period
    NetworkSettled,
    /// The max wait elapsed with the network still busy
    MaxWaitElapsed,
    /// Load completed and the policy does not track requests
    LoadFinished,
}

impl CaptureTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureTrigger::NetworkSettled => "network_settled",
            CaptureTrigger::MaxWaitElapsed => "max_wait_elapsed",
            CaptureTrigger::LoadFinished => "load_finished",
        }
    }
}

/// Counters describing the network activity seen during one capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettleStats {
    pub requests_observed: usize,
    pub responses_observed: usize,
    /// Completions for requests that were never seen starting, or already finished
    pub unmatched_completions: usize,
    pub peak_in_flight: usize,
    /// Requests still in flight when the capture fired
    pub in_flight_at_capture: usize,
}

#[derive(Debug)]
pub struct SettleTracker {
    policy: SettlePolicy,
    state: CaptureState,
    in_flight: HashSet<String>,
    settle_deadline: Option<Instant>,
    max_deadline: Option<Instant>,
    stats: SettleStats,
}

impl SettleTracker {
    pub fn new(policy: SettlePolicy) -> Self {
        Self {
            policy,
            state: CaptureState::Idle,
            in_flight: HashSet::new(),
            settle_deadline: None,
            max_deadline: None,
            stats: SettleStats::default(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == CaptureState::Loading
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> SettleStats {
        SettleStats {
            in_flight_at_capture: self.in_flight.len(),
            ..self.stats.clone()
        }
    }

    pub fn settle_deadline(&self) -> Option<Instant> {
        self.settle_deadline
    }

    pub fn max_deadline(&self) -> Option<Instant> {
        self.max_deadline
    }

    /// The trigger, once the tracker has settled.
    pub fn trigger(&self) -> Option<CaptureTrigger> {
        match self.state {
            CaptureState::Settled(trigger) => Some(trigger),
            _ => None,
        }
    }

    fn transition(&mut self, next: CaptureState, event: &'static str) -> Result<(), CaptureError> {
        if !self.state.can_transition_to(&next) {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                event,
            });
        }
        debug!("Capture state {:?} -> {:?} on {}", self.state, next, event);
        self.state = next;
        Ok(())
    }

    /// Navigation has been issued. Starts the max-wait clock.
    pub fn start_navigation(&mut self, now: Instant) -> Result<(), CaptureError> {
        self.transition(CaptureState::Loading, "navigation start")?;
        self.max_deadline = Some(now + self.policy.max_wait());
        Ok(())
    }

    /// The navigation completed successfully.
    ///
    /// An empty in-flight set schedules the settle deadline from `now`, so an
    /// idle page is captured one quiet period after its load completes.
    pub fn navigation_succeeded(&mut self, now: Instant) -> Result<(), CaptureError> {
        if self.policy.strategy == WaitStrategy::LoadFinished {
            self.transition(
                CaptureState::Settled(CaptureTrigger::LoadFinished),
                "navigation success",
            )?;
            self.clear_deadlines();
            return Ok(());
        }

        self.transition(CaptureState::WatchingRequests, "navigation success")?;
        if self.in_flight.is_empty() {
            self.settle_deadline = Some(now + self.policy.quiet_period());
        }
        Ok(())
    }

    pub fn navigation_failed(&mut self) -> Result<(), CaptureError> {
        self.transition(CaptureState::NavigationFailed, "navigation failure")?;
        self.clear_deadlines();
        Ok(())
    }

    /// A request left the page. Cancels any pending settle deadline.
    pub fn request_started(&mut self, request_id: &str) {
        if !self.accepts_network_events() {
            trace!("Ignoring request {} in state {:?}", request_id, self.state);
            return;
        }

        // Redirect hops reuse the request id; they count once but still reset the timer.
        if self.in_flight.insert(request_id.to_string()) {
            self.stats.requests_observed += 1;
            self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight.len());
        }

        if self.settle_deadline.take().is_some() {
            trace!("Settle deadline cancelled by request {}", request_id);
        }
    }

    /// A request finished, successfully or not.
    pub fn request_finished(&mut self, request_id: &str, now: Instant) {
        if !self.accepts_network_events() {
            trace!("Ignoring completion {} in state {:?}", request_id, self.state);
            return;
        }

        if !self.in_flight.remove(request_id) {
            self.stats.unmatched_completions += 1;
            trace!("Completion for unknown request {}", request_id);
            return;
        }

        self.stats.responses_observed += 1;
        if self.in_flight.is_empty() {
            self.settle_deadline = Some(now + self.policy.quiet_period());
            trace!("Network idle, settle deadline scheduled");
        }
    }

    /// Earliest deadline that can currently fire.
    ///
    /// Deadlines are inert while the navigation outcome is unknown.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.state != CaptureState::WatchingRequests {
            return None;
        }
        match (self.settle_deadline, self.max_deadline) {
            (Some(settle), Some(max)) => Some(settle.min(max)),
            (settle, max) => settle.or(max),
        }
    }

    /// Fire whichever deadline has passed at `now`, returning the trigger once settled.
    pub fn poll(&mut self, now: Instant) -> Option<CaptureTrigger> {
        if self.state == CaptureState::WatchingRequests {
            let settle_due = self.settle_deadline.filter(|deadline| *deadline <= now);
            let max_due = self.max_deadline.filter(|deadline| *deadline <= now);

            let trigger = match (settle_due, max_due) {
                (Some(settle), Some(max)) if settle <= max => Some(CaptureTrigger::NetworkSettled),
                (Some(_), None) => Some(CaptureTrigger::NetworkSettled),
                (_, Some(_)) => Some(CaptureTrigger::MaxWaitElapsed),
                (None, None) => None,
            };

            if let Some(trigger) = trigger {
                // WatchingRequests -> Settled is always legal.
                self.state = CaptureState::Settled(trigger);
                debug!(
                    "Capture state WatchingRequests -> Settled({}) with {} request(s) in flight",
                    trigger.as_str(),
                    self.in_flight.len()
                );
                self.clear_deadlines();
            }
        }

        self.trigger()
    }

    fn accepts_network_events(&self) -> bool {
        matches!(
            self.state,
            CaptureState::Loading | CaptureState::WatchingRequests
        )
    }

    fn clear_deadlines(&mut self) {
        self.settle_deadline = None;
        self.max_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn loaded_tracker(start: Instant, loaded_after: u64) -> SettleTracker {
        let mut tracker = SettleTracker::new(SettlePolicy::default());
        tracker.start_navigation(start).unwrap();
        tracker.navigation_succeeded(start + ms(loaded_after)).unwrap();
        tracker
    }

    #[test]
    fn test_idle_page_settles_after_quiet_period() {
        let start = Instant::now();
        let mut tracker = loaded_tracker(start, 100);

        assert_eq!(tracker.next_deadline(), Some(start + ms(500)));
        assert_eq!(tracker.poll(start + ms(499)), None);
        assert_eq!(
            tracker.poll(start + ms(500)),
            Some(CaptureTrigger::NetworkSettled)
        );
        assert!(tracker.state().is_terminal());
        assert_eq!(tracker.next_deadline(), None);
    }

    #[test]
    fn test_busy_page_hits_max_wait() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(SettlePolicy::default());
        tracker.start_navigation(start).unwrap();
        tracker.request_started("poll-1");
        tracker.navigation_succeeded(start + ms(50)).unwrap();

        assert_eq!(tracker.next_deadline(), Some(start + ms(800)));
        assert_eq!(tracker.poll(start + ms(799)), None);
        assert_eq!(
            tracker.poll(start + ms(800)),
            Some(CaptureTrigger::MaxWaitElapsed)
        );
        assert_eq!(tracker.stats().in_flight_at_capture, 1);
    }

    #[test]
    fn test_settle_measured_from_last_response() {
        let start = Instant::now();
        let mut tracker = loaded_tracker(start, 10);
        tracker.request_started("a");
        tracker.request_started("b");
        tracker.request_started("c");
        tracker.request_finished("a", start + ms(100));
        tracker.request_finished("b", start + ms(150));
        assert_eq!(tracker.settle_deadline(), None);
        tracker.request_finished("c", start + ms(200));

        assert_eq!(tracker.settle_deadline(), Some(start + ms(600)));
        assert_eq!(
            tracker.poll(start + ms(600)),
            Some(CaptureTrigger::NetworkSettled)
        );
        let stats = tracker.stats();
        assert_eq!(stats.requests_observed, 3);
        assert_eq!(stats.responses_observed, 3);
        assert_eq!(stats.peak_in_flight, 3);
    }

    #[test]
    fn test_new_request_cancels_settle_deadline() {
        let start = Instant::now();
        let mut tracker = loaded_tracker(start, 50);
        assert_eq!(tracker.settle_deadline(), Some(start + ms(450)));

        tracker.request_started("late");
        assert_eq!(tracker.settle_deadline(), None);
        assert_eq!(tracker.next_deadline(), Some(start + ms(800)));
        assert_eq!(tracker.poll(start + ms(450)), None);

        tracker.request_finished("late", start + ms(300));
        assert_eq!(tracker.settle_deadline(), Some(start + ms(700)));
    }

    #[test]
    fn test_unmatched_completions_do_not_settle() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(SettlePolicy::default());
        tracker.start_navigation(start).unwrap();
        tracker.request_started("doc");
        tracker.navigation_succeeded(start + ms(20)).unwrap();

        tracker.request_finished("ghost", start + ms(30));
        tracker.request_finished("ghost", start + ms(31));
        assert_eq!(tracker.in_flight(), 1);
        assert_eq!(tracker.settle_deadline(), None);
        assert_eq!(tracker.stats().unmatched_completions, 2);

        tracker.request_finished("doc", start + ms(40));
        tracker.request_finished("doc", start + ms(41));
        assert_eq!(tracker.stats().responses_observed, 1);
        assert_eq!(tracker.stats().unmatched_completions, 3);
        assert_eq!(tracker.settle_deadline(), Some(start + ms(440)));
    }

    #[test]
    fn test_redirect_counts_once_but_resets_timer() {
        let start = Instant::now();
        let mut tracker = loaded_tracker(start, 10);
        tracker.request_started("r1");
        tracker.request_finished("r1", start + ms(20));
        assert!(tracker.settle_deadline().is_some());

        tracker.request_started("r2");
        tracker.request_started("r2");
        assert_eq!(tracker.in_flight(), 1);
        assert_eq!(tracker.stats().requests_observed, 2);
        tracker.request_finished("r2", start + ms(60));
        assert_eq!(tracker.settle_deadline(), Some(start + ms(460)));
    }

    #[test]
    fn test_deadlines_inert_while_loading() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(SettlePolicy::default());
        tracker.start_navigation(start).unwrap();
        tracker.request_started("doc");
        tracker.request_finished("doc", start + ms(10));

        assert_eq!(tracker.next_deadline(), None);
        assert_eq!(tracker.poll(start + ms(5000)), None);
        assert!(tracker.is_loading());
    }

    #[test]
    fn test_late_navigation_captures_immediately_at_max_wait() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(SettlePolicy::default());
        tracker.start_navigation(start).unwrap();
        tracker.request_started("slow");
        tracker.navigation_succeeded(start + ms(1200)).unwrap();

        assert_eq!(
            tracker.poll(start + ms(1200)),
            Some(CaptureTrigger::MaxWaitElapsed)
        );
    }

    #[test]
    fn test_tie_prefers_settle() {
        let start = Instant::now();
        let mut tracker = loaded_tracker(start, 400);
        assert_eq!(tracker.settle_deadline(), tracker.max_deadline());
        assert_eq!(
            tracker.poll(start + ms(800)),
            Some(CaptureTrigger::NetworkSettled)
        );
    }

    #[test]
    fn test_navigation_failure_is_terminal() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(SettlePolicy::default());
        tracker.start_navigation(start).unwrap();
        tracker.navigation_failed().unwrap();

        assert_eq!(tracker.state(), CaptureState::NavigationFailed);
        assert_eq!(tracker.next_deadline(), None);
        assert_eq!(tracker.poll(start + ms(10_000)), None);

        tracker.request_started("after-failure");
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_invalid_transitions_are_errors() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(SettlePolicy::default());
        assert!(matches!(
            tracker.navigation_succeeded(start),
            Err(CaptureError::InvalidTransition {
                from: CaptureState::Idle,
                ..
            })
        ));

        tracker.start_navigation(start).unwrap();
        assert!(tracker.start_navigation(start).is_err());

        tracker.navigation_succeeded(start).unwrap();
        assert!(tracker.navigation_failed().is_err());
    }

    #[test]
    fn test_load_finished_strategy_settles_on_load() {
        let start = Instant::now();
        let policy = SettlePolicy {
            strategy: WaitStrategy::LoadFinished,
            ..Default::default()
        };
        let mut tracker = SettleTracker::new(policy);
        tracker.start_navigation(start).unwrap();
        tracker.request_started("pending");
        tracker.navigation_succeeded(start + ms(300)).unwrap();

        assert_eq!(tracker.trigger(), Some(CaptureTrigger::LoadFinished));
        assert_eq!(tracker.poll(start + ms(300)), Some(CaptureTrigger::LoadFinished));
        assert_eq!(tracker.next_deadline(), None);
    }

    #[test]
    fn test_events_after_settle_are_ignored() {
        let start = Instant::now();
        let mut tracker = loaded_tracker(start, 0);
        tracker.poll(start + ms(400));

        tracker.request_started("straggler");
        tracker.request_finished("other", start + ms(500));
        let stats = tracker.stats();
        assert_eq!(stats.requests_observed, 0);
        assert_eq!(stats.unmatched_completions, 0);
        assert_eq!(tracker.trigger(), Some(CaptureTrigger::NetworkSettled));
    }
}
