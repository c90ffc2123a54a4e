//! Live migration session: lifecycle state machine, traffic split, counters.

use core::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use jobshift_core::{SessionId, SourceKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SessionError;

/// Lifecycle of a session.
///
/// ```text
/// idle ──start──▶ dual_run ──cutover──▶ cutover
///                    │                     │
///                    └──rollback──▶ rolled_back ◀──rollback
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    DualRun,
    Cutover,
    RolledBack,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::DualRun => "dual_run",
            SessionState::Cutover => "cutover",
            SessionState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic routing counters, shared by every in-flight request.
#[derive(Debug, Default)]
pub struct RoutingStats {
    routed_to_target: AtomicU64,
    routed_to_legacy: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub routed_to_target: u64,
    pub routed_to_legacy: u64,
    pub errors: u64,
}

impl RoutingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_target(&self) {
        self.routed_to_target.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_legacy(&self) {
        self.routed_to_legacy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            routed_to_target: self.routed_to_target.load(Ordering::Relaxed),
            routed_to_legacy: self.routed_to_legacy.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    rollback_reason: Option<String>,
    updated_at: DateTime<Utc>,
}

/// Point-in-time view of a session, as reported by `/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: SessionId,
    pub source: SourceKind,
    pub state: SessionState,
    pub percentage: u8,
    pub stats: StatsSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One live migration from a legacy framework to the target system.
///
/// State transitions are serialized by a mutex so that of two racing
/// transitions exactly one wins. The routing percentage is an atomic read
/// lock-free by [`Self::should_route_to_target`]; it is only written while
/// the mutex is held.
#[derive(Debug)]
pub struct MigrationSession {
    id: SessionId,
    source: SourceKind,
    created_at: DateTime<Utc>,
    lifecycle: Mutex<Lifecycle>,
    percentage: AtomicU8,
    stats: Arc<RoutingStats>,
}

impl MigrationSession {
    pub fn new(source: SourceKind) -> Self {
        Self::with_stats(source, Arc::new(RoutingStats::new()))
    }

    /// Session that reports into an existing counter set.
    pub fn with_stats(source: SourceKind, stats: Arc<RoutingStats>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            source,
            created_at: now,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                rollback_reason: None,
                updated_at: now,
            }),
            percentage: AtomicU8::new(0),
            stats,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn stats(&self) -> &Arc<RoutingStats> {
        &self.stats
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn percentage(&self) -> u8 {
        self.percentage.load(Ordering::Acquire)
    }

    pub fn rollback_reason(&self) -> Option<String> {
        self.lock().rollback_reason.clone()
    }

    /// `idle → dual_run` at `percentage`.
    pub fn start_dual_run(&self, percentage: u32) -> Result<(), SessionError> {
        let pct = check_percentage(percentage)?;
        let mut lifecycle = self.lock();
        if lifecycle.state != SessionState::Idle {
            return Err(SessionError::StateConflict {
                action: "start dual run",
                state: lifecycle.state,
            });
        }
        self.percentage.store(pct, Ordering::Release);
        self.transition(&mut lifecycle, SessionState::DualRun);
        info!(session = %self.id, percentage = pct, "dual run started");
        Ok(())
    }

    /// Change the split while in `dual_run`.
    pub fn set_percentage(&self, percentage: u32) -> Result<(), SessionError> {
        let pct = check_percentage(percentage)?;
        let mut lifecycle = self.lock();
        if lifecycle.state != SessionState::DualRun {
            return Err(SessionError::StateConflict {
                action: "change percentage",
                state: lifecycle.state,
            });
        }
        let previous = self.percentage.swap(pct, Ordering::AcqRel);
        lifecycle.updated_at = Utc::now();
        info!(session = %self.id, previous, percentage = pct, "routing percentage changed");
        Ok(())
    }

    /// `dual_run → cutover`; all traffic goes to the target from now on.
    pub fn cutover(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.lock();
        if lifecycle.state != SessionState::DualRun {
            return Err(SessionError::StateConflict {
                action: "cut over",
                state: lifecycle.state,
            });
        }
        self.percentage.store(100, Ordering::Release);
        self.transition(&mut lifecycle, SessionState::Cutover);
        info!(session = %self.id, "cutover complete");
        Ok(())
    }

    /// `dual_run | cutover → rolled_back`; all traffic returns to legacy.
    pub fn rollback(&self, reason: &str) -> Result<(), SessionError> {
        let reason = reason.trim();
        let mut lifecycle = self.lock();
        if !matches!(lifecycle.state, SessionState::DualRun | SessionState::Cutover) {
            return Err(SessionError::StateConflict {
                action: "roll back",
                state: lifecycle.state,
            });
        }
        if reason.is_empty() {
            return Err(SessionError::MissingReason);
        }
        self.percentage.store(0, Ordering::Release);
        lifecycle.rollback_reason = Some(reason.to_string());
        self.transition(&mut lifecycle, SessionState::RolledBack);
        info!(session = %self.id, reason, "rolled back");
        Ok(())
    }

    /// Independent coin flip at the current percentage.
    ///
    /// Not sticky: two requests for the same legacy job may be routed
    /// differently.
    pub fn should_route_to_target(&self) -> bool {
        match self.percentage.load(Ordering::Acquire) {
            0 => false,
            pct if pct >= 100 => true,
            pct => rand::rng().random_range(0..100u8) < pct,
        }
    }

    pub fn status(&self) -> SessionStatus {
        let (state, rollback_reason, updated_at) = {
            let lifecycle = self.lock();
            (lifecycle.state, lifecycle.rollback_reason.clone(), lifecycle.updated_at)
        };
        SessionStatus {
            id: self.id,
            source: self.source,
            state,
            percentage: self.percentage(),
            stats: self.stats.snapshot(),
            rollback_reason,
            created_at: self.created_at,
            updated_at,
        }
    }

    fn transition(&self, lifecycle: &mut Lifecycle, to: SessionState) {
        lifecycle.state = to;
        lifecycle.updated_at = Utc::now();
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_percentage(percentage: u32) -> Result<u8, SessionError> {
    u8::try_from(percentage)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or(SessionError::InvalidPercentage(percentage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn dual_run(pct: u32) -> MigrationSession {
        let session = MigrationSession::new(SourceKind::Sidekiq);
        session.start_dual_run(pct).unwrap();
        session
    }

    #[test]
    fn new_session_is_idle_and_routes_nothing() {
        let session = MigrationSession::new(SourceKind::BullMq);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.percentage(), 0);
        assert!(!session.should_route_to_target());
    }

    #[test]
    fn rollback_from_idle_conflicts_and_keeps_percentage() {
        let session = MigrationSession::new(SourceKind::Sidekiq);
        let err = session.rollback("target is slow").unwrap_err();

        assert_eq!(
            err,
            SessionError::StateConflict {
                action: "roll back",
                state: SessionState::Idle
            }
        );
        assert_eq!(session.percentage(), 0);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn cutover_twice_fails_the_second_time() {
        let session = dual_run(40);
        session.cutover().unwrap();
        assert_eq!(session.percentage(), 100);

        let err = session.cutover().unwrap_err();
        assert!(matches!(err, SessionError::StateConflict { state: SessionState::Cutover, .. }));
        assert_eq!(session.state(), SessionState::Cutover);
    }

    #[test]
    fn cutover_requires_dual_run() {
        let session = MigrationSession::new(SourceKind::Sidekiq);
        assert!(session.cutover().is_err());

        let session = dual_run(10);
        session.rollback("bad data").unwrap();
        assert!(session.cutover().is_err());
        assert_eq!(session.state(), SessionState::RolledBack);
    }

    #[test]
    fn percentage_is_locked_outside_dual_run() {
        let session = dual_run(10);
        session.set_percentage(55).unwrap();
        assert_eq!(session.percentage(), 55);

        session.cutover().unwrap();
        assert!(session.set_percentage(20).is_err());
        assert_eq!(session.percentage(), 100);

        session.rollback("errors spiked").unwrap();
        assert_eq!(session.percentage(), 0);
        assert!(session.set_percentage(20).is_err());
        assert!(session.start_dual_run(20).is_err());
    }

    #[test]
    fn out_of_range_percentage_is_rejected() {
        let session = MigrationSession::new(SourceKind::Sidekiq);
        assert_eq!(session.start_dual_run(101), Err(SessionError::InvalidPercentage(101)));
        assert_eq!(session.state(), SessionState::Idle);

        let session = dual_run(5);
        assert_eq!(session.set_percentage(300), Err(SessionError::InvalidPercentage(300)));
        assert_eq!(session.percentage(), 5);
    }

    #[test]
    fn rollback_needs_a_reason_and_reports_it() {
        let session = dual_run(50);
        assert_eq!(session.rollback("  "), Err(SessionError::MissingReason));
        assert_eq!(session.state(), SessionState::DualRun);

        session.rollback("checkout jobs failing").unwrap();
        let status = session.status();
        assert_eq!(status.state, SessionState::RolledBack);
        assert_eq!(status.rollback_reason.as_deref(), Some("checkout jobs failing"));
        assert_eq!(status.percentage, 0);
    }

    #[test]
    fn concurrent_cutovers_have_exactly_one_winner() {
        let session = Arc::new(dual_run(30));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.cutover().is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn cutover_and_rollback_race_leaves_a_consistent_state() {
        for _ in 0..50 {
            let session = Arc::new(dual_run(30));
            let a = {
                let session = Arc::clone(&session);
                thread::spawn(move || session.cutover())
            };
            let b = {
                let session = Arc::clone(&session);
                thread::spawn(move || session.rollback("race"))
            };
            let (cutover, rollback) = (a.join().unwrap(), b.join().unwrap());

            // rollback is legal from both dual_run and cutover, so it always
            // lands; cutover only wins if it ran first
            assert!(rollback.is_ok());
            assert_eq!(session.state(), SessionState::RolledBack);
            assert_eq!(session.percentage(), 0);
            if cutover.is_err() {
                assert!(matches!(
                    cutover,
                    Err(SessionError::StateConflict { state: SessionState::RolledBack, .. })
                ));
            }
        }
    }

    #[test]
    fn split_roughly_follows_percentage() {
        let session = dual_run(30);
        let routed = (0..10_000).filter(|_| session.should_route_to_target()).count();
        assert!((2_000..4_000).contains(&routed), "routed {routed} of 10000");
    }

    #[test]
    fn status_serializes_snake_case_state() {
        let session = dual_run(25);
        session.stats().record_legacy();
        let wire = serde_json::to_value(session.status()).unwrap();
        assert_eq!(wire["state"], "dual_run");
        assert_eq!(wire["percentage"], 25);
        assert_eq!(wire["source"], "sidekiq");
        assert_eq!(wire["stats"]["routed_to_legacy"], 1);
        assert!(wire.get("rollback_reason").is_none());
    }
}
