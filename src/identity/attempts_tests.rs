use super::*;
use crate::identity::clock::ManualClock;

fn tracker() -> (Arc<ManualClock>, AttemptTracker) {
    let clock = Arc::new(ManualClock::new());
    let t = AttemptTracker::with_clock(clock.clone());
    (clock, t)
}

#[test]
fn unknown_client_is_not_locked() {
    let (_, t) = tracker();
    assert!(!t.is_locked_out("10.0.0.1"));
    assert_eq!(t.attempts("10.0.0.1"), 0);
    assert!(t.is_empty());
}

#[test]
fn record_increments_by_one() {
    let (_, t) = tracker();
    assert_eq!(t.record_attempt("a"), 1);
    assert_eq!(t.record_attempt("a"), 2);
    assert_eq!(t.attempts("a"), 2);
}

#[test]
fn locks_after_max_attempts() {
    let (_, t) = tracker();
    for _ in 0..MAX_ATTEMPTS - 1 {
        t.record_attempt("a");
        assert!(!t.is_locked_out("a"));
    }
    t.record_attempt("a");
    assert!(t.is_locked_out("a"));
}

#[test]
fn independent_per_client() {
    let (_, t) = tracker();
    for _ in 0..MAX_ATTEMPTS {
        t.record_attempt("a");
    }
    assert!(t.is_locked_out("a"));
    assert!(!t.is_locked_out("b"));
}

#[test]
fn lockout_expires_and_clears_record() {
    let (clock, t) = tracker();
    for _ in 0..MAX_ATTEMPTS {
        t.record_attempt("a");
    }
    clock.advance(LOCKOUT_TIME - Duration::from_secs(1));
    assert!(t.is_locked_out("a"));
    clock.advance(Duration::from_secs(1));
    assert!(!t.is_locked_out("a"));
    // record is gone, not merely zeroed
    assert_eq!(t.len(), 0);
    assert_eq!(t.record_attempt("a"), 1);
}

#[test]
fn reset_removes_record() {
    let (_, t) = tracker();
    t.record_attempt("a");
    t.reset_attempts("a");
    assert_eq!(t.attempts("a"), 0);
    assert!(t.is_empty());
}

#[test]
fn status_reports_remaining_minutes() {
    let (clock, t) = tracker();
    for _ in 0..MAX_ATTEMPTS {
        t.record_attempt("a");
    }
    let s = t.status("a");
    assert!(s.locked);
    assert_eq!(s.attempts_left, 0);
    assert_eq!(s.lockout_minutes, 15);

    clock.advance(Duration::from_secs(60 + 30));
    // 13.5 minutes left rounds up
    assert_eq!(t.status("a").lockout_minutes, 14);

    let fresh = t.status("b");
    assert_eq!(fresh, AttemptStatus { locked: false, attempts_left: MAX_ATTEMPTS, lockout_minutes: 0 });
}

#[test]
fn sweep_drops_only_stale_records() {
    let (clock, t) = tracker();
    t.record_attempt("old");
    clock.advance(LOCKOUT_TIME);
    t.record_attempt("new");
    assert_eq!(t.sweep(), 1);
    assert_eq!(t.attempts("old"), 0);
    assert_eq!(t.attempts("new"), 1);
}

#[test]
fn lockout_minutes_rounds_up() {
    assert_eq!(lockout_minutes(Duration::from_millis(1)), 1);
    assert_eq!(lockout_minutes(Duration::from_secs(60)), 1);
    assert_eq!(lockout_minutes(Duration::from_secs(61)), 2);
    assert_eq!(lockout_minutes(Duration::ZERO), 0);
}

#[test]
fn concurrent_failures_are_not_lost() {
    let t = Arc::new(AttemptTracker::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let t = t.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    t.record_attempt("shared");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(t.attempts("shared"), 800);
}

#[test]
fn begin_attempt_reserves_then_refuses() {
    let (clock, t) = tracker();
    for n in 1..=MAX_ATTEMPTS {
        assert_eq!(t.begin_attempt("a"), Ok(n));
    }
    let remaining = t.begin_attempt("a").unwrap_err();
    assert_eq!(remaining, LOCKOUT_TIME);
    // a refused attempt is not counted
    assert_eq!(t.attempts("a"), MAX_ATTEMPTS);

    clock.advance(LOCKOUT_TIME);
    assert_eq!(t.begin_attempt("a"), Ok(1));
}

#[test]
fn concurrent_reservations_stop_at_the_limit() {
    let t = Arc::new(AttemptTracker::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let t = t.clone();
            std::thread::spawn(move || (0..10).filter(|_| t.begin_attempt("shared").is_ok()).count())
        })
        .collect();
    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(granted, MAX_ATTEMPTS as usize);
    assert_eq!(t.attempts("shared"), MAX_ATTEMPTS);
}
