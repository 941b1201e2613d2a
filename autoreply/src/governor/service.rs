//! Admission control for reply dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::window::SlidingWindow;
use crate::clock::SharedClock;
use crate::domain::Monitor;
use crate::limits;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Smallest batch the scheduler may be shrunk to.
pub const BATCH_SIZE_MIN: usize = 2;
/// Largest batch the scheduler may grow to.
pub const BATCH_SIZE_MAX: usize = 20;
pub const BATCH_SIZE_DEFAULT: usize = 10;

/// Why admission was refused. Not an error: retry on a later pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenied {
    Paused,
    GlobalLimit,
    MinInterval { retry_after: Duration },
    MonitorHourlyLimit,
    OwnerHourlyLimit,
}

impl AdmissionDenied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::GlobalLimit => "global_limit",
            Self::MinInterval { .. } => "min_interval",
            Self::MonitorHourlyLimit => "monitor_hourly_limit",
            Self::OwnerHourlyLimit => "owner_hourly_limit",
        }
    }
}

impl std::fmt::Display for AdmissionDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinInterval { retry_after } => {
                write!(f, "min_interval (retry in {}s)", retry_after.as_secs())
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// Point-in-time view of the governor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorSnapshot {
    /// Dispatch attempts in the last rolling minute.
    pub attempts_last_minute: usize,
    /// Successful dispatches in the last rolling minute.
    pub successes_last_minute: usize,
    pub batch_size: usize,
    pub paused: bool,
}

#[derive(Debug)]
struct MonitorWindow {
    hourly: SlidingWindow,
    last_success: Option<Instant>,
}

impl MonitorWindow {
    fn new() -> Self {
        Self {
            hourly: SlidingWindow::new(HOUR),
            last_success: None,
        }
    }
}

#[derive(Debug)]
struct GovernorState {
    global: SlidingWindow,
    successes: SlidingWindow,
    monitors: HashMap<String, MonitorWindow>,
    owners: HashMap<String, SlidingWindow>,
    batch_size: usize,
    paused_until: Option<Instant>,
    next_id: u64,
}

impl GovernorState {
    fn release(&mut self, id: u64, monitor_id: &str, owner_id: &str) {
        self.global.release(id);
        if let Some(window) = self.monitors.get_mut(monitor_id) {
            window.hourly.release(id);
        }
        if let Some(window) = self.owners.get_mut(owner_id) {
            window.release(id);
        }
    }
}

/// Process-wide admission control.
///
/// Every check and reservation happens under one lock, so monitors may be
/// processed concurrently without exceeding any ceiling.
#[derive(Debug, Clone)]
pub struct RateGovernor {
    state: Arc<Mutex<GovernorState>>,
    clock: SharedClock,
}

impl RateGovernor {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_batch_size(clock, BATCH_SIZE_DEFAULT)
    }

    pub fn with_batch_size(clock: SharedClock, batch_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GovernorState {
                global: SlidingWindow::new(MINUTE),
                successes: SlidingWindow::new(MINUTE),
                monitors: HashMap::new(),
                owners: HashMap::new(),
                batch_size: batch_size.clamp(BATCH_SIZE_MIN, BATCH_SIZE_MAX),
                paused_until: None,
                next_id: 0,
            })),
            clock,
        }
    }

    /// Check every ceiling for `monitor` and reserve a slot in each window.
    pub fn try_acquire(&self, monitor: &Monitor) -> Result<AdmissionPermit, AdmissionDenied> {
        let now = self.clock.monotonic();
        let wall = self.clock.now();
        let mut state = self.state.lock();

        if Self::check_paused(&mut state, now) {
            return Err(AdmissionDenied::Paused);
        }

        if !state
            .global
            .has_room(now, limits::GLOBAL_RESPONSES_PER_MINUTE)
        {
            return Err(AdmissionDenied::GlobalLimit);
        }

        let min_interval = monitor.min_interval();
        let window = state
            .monitors
            .entry(monitor.id.clone())
            .or_insert_with(MonitorWindow::new);

        let since_memory = window.last_success.map(|at| now.saturating_duration_since(at));
        let since_stored = monitor
            .stats
            .last_response_at
            .map(|at| elapsed_since(wall, at));
        let since_last = match (since_memory, since_stored) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if let Some(elapsed) = since_last
            && elapsed < min_interval
        {
            return Err(AdmissionDenied::MinInterval {
                retry_after: min_interval - elapsed,
            });
        }

        if !window.hourly.has_room(now, monitor.hourly_cap() as usize) {
            return Err(AdmissionDenied::MonitorHourlyLimit);
        }

        let owner = state
            .owners
            .entry(monitor.owner_id.clone())
            .or_insert_with(|| SlidingWindow::new(HOUR));
        if !owner.has_room(now, limits::OWNER_RESPONSES_PER_HOUR) {
            return Err(AdmissionDenied::OwnerHourlyLimit);
        }

        let id = state.next_id;
        state.next_id += 1;
        state.global.push(id, now);
        if let Some(owner) = state.owners.get_mut(&monitor.owner_id) {
            owner.push(id, now);
        }
        if let Some(window) = state.monitors.get_mut(&monitor.id) {
            window.hourly.push(id, now);
        }

        debug!(monitor_id = %monitor.id, reservation = id, "Admission granted");
        Ok(AdmissionPermit {
            state: Arc::clone(&self.state),
            id,
            monitor_id: monitor.id.clone(),
            owner_id: monitor.owner_id.clone(),
            committed: false,
        })
    }

    /// Note a successful dispatch for spacing and observation.
    pub fn record_success(&self, monitor_id: &str) {
        let now = self.clock.monotonic();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.successes.push(id, now);
        state
            .monitors
            .entry(monitor_id.to_string())
            .or_insert_with(MonitorWindow::new)
            .last_success = Some(now);
    }

    /// Refuse all admissions for `duration`.
    pub fn pause_for(&self, duration: Duration) {
        let until = self.clock.monotonic() + duration;
        let mut state = self.state.lock();
        // Never shorten an existing pause.
        if state.paused_until.is_none_or(|current| current < until) {
            state.paused_until = Some(until);
        }
        info!(seconds = duration.as_secs(), "Dispatch paused");
    }

    pub fn resume(&self) {
        self.state.lock().paused_until = None;
    }

    /// Whether the pause flag is raised. An elapsed pause is cleared here.
    pub fn is_paused(&self) -> bool {
        let now = self.clock.monotonic();
        Self::check_paused(&mut self.state.lock(), now)
    }

    fn check_paused(state: &mut GovernorState, now: Instant) -> bool {
        match state.paused_until {
            Some(until) if now < until => true,
            Some(_) => {
                state.paused_until = None;
                info!("Dispatch pause elapsed");
                false
            }
            None => false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.state.lock().batch_size
    }

    /// Set the scheduler batch size, clamped to its bounds. Returns the
    /// applied value.
    pub fn set_batch_size(&self, size: usize) -> usize {
        let size = size.clamp(BATCH_SIZE_MIN, BATCH_SIZE_MAX);
        self.state.lock().batch_size = size;
        size
    }

    pub fn snapshot(&self) -> GovernorSnapshot {
        let now = self.clock.monotonic();
        let mut state = self.state.lock();
        let paused = Self::check_paused(&mut state, now);
        GovernorSnapshot {
            attempts_last_minute: state.global.count(now),
            successes_last_minute: state.successes.count(now),
            batch_size: state.batch_size,
            paused,
        }
    }

    /// Drop per-monitor and per-owner windows with nothing left to track.
    pub fn compact(&self) {
        let now = self.clock.monotonic();
        let mut state = self.state.lock();
        state.monitors.retain(|_, w| {
            let recent = w
                .last_success
                .is_some_and(|at| now.saturating_duration_since(at) < HOUR);
            recent || !w.hourly.is_empty(now)
        });
        state.owners.retain(|_, w| !w.is_empty(now));
    }
}

fn elapsed_since(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

/// Slots reserved by a granted admission.
///
/// Call [`commit`](Self::commit) once the dispatch is attempted. Dropping an
/// uncommitted permit gives the slots back.
#[derive(Debug)]
#[must_use = "dropping a permit releases its reservation"]
pub struct AdmissionPermit {
    state: Arc<Mutex<GovernorState>>,
    id: u64,
    monitor_id: String,
    owner_id: String,
    committed: bool,
}

impl AdmissionPermit {
    pub fn commit(mut self) {
        self.committed = true;
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.committed {
            self.state
                .lock()
                .release(self.id, &self.monitor_id, &self.owner_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::domain::AccessToken;
    use chrono::TimeZone;

    fn setup() -> (Arc<ManualClock>, RateGovernor) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap(),
        ));
        let governor = RateGovernor::new(clock.clone());
        (clock, governor)
    }

    fn monitor(id: &str, owner: &str, clock: &ManualClock) -> Monitor {
        let mut m = Monitor::new(owner, id, "page", AccessToken::new("t"), clock.now());
        m.id = id.to_string();
        m
    }

    #[test]
    fn test_min_interval_after_success() {
        let (clock, governor) = setup();
        let m = monitor("m1", "o1", &clock);

        governor.try_acquire(&m).unwrap().commit();
        governor.record_success("m1");

        clock.advance_secs(25);
        assert_eq!(
            governor.try_acquire(&m).unwrap_err(),
            AdmissionDenied::MinInterval {
                retry_after: Duration::from_secs(5)
            }
        );

        clock.advance_secs(5);
        assert!(governor.try_acquire(&m).is_ok());
    }

    #[test]
    fn test_persisted_last_response_is_honoured() {
        let (clock, governor) = setup();
        let mut m = monitor("m1", "o1", &clock);
        m.stats.last_response_at = Some(clock.now() - chrono::Duration::seconds(3));
        m.rate_limit.min_seconds_between = 0;

        assert!(matches!(
            governor.try_acquire(&m),
            Err(AdmissionDenied::MinInterval { .. })
        ));
    }

    #[test]
    fn test_monitor_hourly_cap_is_min_of_config_and_ceiling() {
        let (clock, governor) = setup();
        let mut m = monitor("m1", "o1", &clock);
        m.rate_limit.max_responses_per_hour = 3;

        for _ in 0..3 {
            governor.try_acquire(&m).unwrap().commit();
        }
        assert_eq!(
            governor.try_acquire(&m).unwrap_err(),
            AdmissionDenied::MonitorHourlyLimit
        );

        clock.advance_secs(3600);
        assert!(governor.try_acquire(&m).is_ok());
    }

    #[test]
    fn test_owner_cap_spans_monitors() {
        let (clock, governor) = setup();
        let monitors: Vec<_> = (0..5)
            .map(|i| monitor(&format!("m{}", i), "o1", &clock))
            .collect();

        for m in &monitors {
            for _ in 0..10 {
                governor.try_acquire(m).unwrap().commit();
            }
            clock.advance_secs(1);
        }
        let extra = monitor("m-extra", "o1", &clock);
        assert_eq!(
            governor.try_acquire(&extra).unwrap_err(),
            AdmissionDenied::OwnerHourlyLimit
        );

        let other_owner = monitor("m-other", "o2", &clock);
        clock.advance_secs(60);
        assert!(governor.try_acquire(&other_owner).is_ok());
    }

    #[test]
    fn test_global_cap_per_rolling_minute() {
        let (clock, governor) = setup();
        for i in 0..60 {
            let m = monitor(&format!("m{}", i), &format!("o{}", i), &clock);
            governor.try_acquire(&m).unwrap().commit();
        }
        let m = monitor("late", "late", &clock);
        assert_eq!(
            governor.try_acquire(&m).unwrap_err(),
            AdmissionDenied::GlobalLimit
        );
        clock.advance_secs(59);
        assert!(governor.try_acquire(&m).is_err());
        clock.advance_secs(1);
        assert!(governor.try_acquire(&m).is_ok());
    }

    #[test]
    fn test_dropped_permit_releases_reservation() {
        let (clock, governor) = setup();
        let mut m = monitor("m1", "o1", &clock);
        m.rate_limit.max_responses_per_hour = 1;

        drop(governor.try_acquire(&m).unwrap());
        assert_eq!(governor.snapshot().attempts_last_minute, 0);

        let permit = governor.try_acquire(&m).unwrap();
        permit.commit();
        assert_eq!(governor.snapshot().attempts_last_minute, 1);
        assert_eq!(
            governor.try_acquire(&m).unwrap_err(),
            AdmissionDenied::MonitorHourlyLimit
        );
    }

    #[test]
    fn test_pause_clears_itself() {
        let (clock, governor) = setup();
        let m = monitor("m1", "o1", &clock);

        governor.pause_for(Duration::from_secs(300));
        assert!(governor.is_paused());
        assert_eq!(governor.try_acquire(&m).unwrap_err(), AdmissionDenied::Paused);

        clock.advance_secs(300);
        assert!(!governor.is_paused());
        assert!(governor.try_acquire(&m).is_ok());
    }

    #[test]
    fn test_batch_size_is_bounded() {
        let (_clock, governor) = setup();
        assert_eq!(governor.batch_size(), BATCH_SIZE_DEFAULT);
        assert_eq!(governor.set_batch_size(1), BATCH_SIZE_MIN);
        assert_eq!(governor.set_batch_size(100), BATCH_SIZE_MAX);
    }

    #[test]
    fn test_compact_keeps_live_windows() {
        let (clock, governor) = setup();
        let m = monitor("m1", "o1", &clock);
        governor.try_acquire(&m).unwrap().commit();
        governor.compact();
        assert_eq!(governor.state.lock().monitors.len(), 1);

        clock.advance_secs(3600);
        governor.compact();
        assert!(governor.state.lock().monitors.is_empty());
        assert!(governor.state.lock().owners.is_empty());
    }
}
