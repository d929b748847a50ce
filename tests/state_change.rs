mod common;

use common::test_helpers::{count, init_tracing, scripted, states, ProbeError, Step};
use statewait::{Context, ContextError, Jitter, StateChangeConfig, TrackingSleeper, WaitError};
use std::time::Duration;
use tokio::time::Instant;

type Waiter = StateChangeConfig<usize, &'static str, ProbeError>;

/// Waiter over `steps` that never actually sleeps.
fn instant(steps: Vec<Step>) -> (Waiter, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let (refresh, calls) = scripted(steps);
    let waiter = StateChangeConfig::new(refresh)
        .poll_interval(Duration::from_millis(1))
        .with_sleeper(TrackingSleeper::new())
        .timeout(Duration::from_secs(60));
    (waiter, calls)
}

#[tokio::test]
async fn flap_resets_continuous_occurrence() {
    let (waiter, calls) = instant(states(&["ready", "pending", "ready", "ready", "ready"]));
    let mut waiter = waiter.pending(["pending"]).target(["ready"]).continuous_target_occurrence(3);

    let got = waiter.wait_for_state(&Context::background()).await.unwrap();
    assert_eq!(got, Some(4));
    assert_eq!(count(&calls), 5);
}

#[tokio::test]
async fn not_found_tolerance_is_exceeded_on_sixth_absence() {
    let mut steps = vec![Step::Absent; 6];
    steps.push(Step::State("available"));
    let (waiter, calls) = instant(steps);
    let mut waiter = waiter.target(["available"]).not_found_checks(5);

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.as_not_found().unwrap().retries, 6);
    assert_eq!(err.to_string(), "couldn't find resource (6 retries)");
    assert_eq!(count(&calls), 6);
}

#[tokio::test]
async fn tolerated_absences_then_presence_succeed() {
    let mut steps = vec![Step::Absent; 5];
    steps.push(Step::State("available"));
    let (waiter, _) = instant(steps);
    let mut waiter = waiter.target(["available"]).not_found_checks(5);

    assert_eq!(waiter.wait_for_state(&Context::background()).await.unwrap(), Some(5));
}

#[tokio::test]
async fn presence_resets_not_found_tick() {
    let mut steps = vec![Step::Absent; 4];
    steps.push(Step::State("creating"));
    steps.extend(vec![Step::Absent; 4]);
    steps.push(Step::State("available"));
    let (waiter, _) = instant(steps);
    let mut waiter = waiter.pending(["creating"]).target(["available"]).not_found_checks(5);

    assert_eq!(waiter.wait_for_state(&Context::background()).await.unwrap(), Some(9));
}

#[tokio::test]
async fn unknown_state_is_a_hard_stop_when_pending_declared() {
    let (waiter, calls) = instant(states(&["A", "C", "B"]));
    let mut waiter = waiter.pending(["A"]).target(["B"]);

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    let unexpected = err.as_unexpected_state().expect("unexpected state error");
    assert_eq!(unexpected.state, "C");
    assert_eq!(unexpected.expected_states, vec!["B".to_string()]);
    assert_eq!(err.to_string(), "unexpected state 'C', wanted target 'B'");
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn unknown_state_is_tolerated_without_pending() {
    let (waiter, calls) = instant(states(&["provisioning", "warming", "B"]));
    let mut waiter = waiter.target(["B"]);

    assert_eq!(waiter.wait_for_state(&Context::background()).await.unwrap(), Some(2));
    assert_eq!(count(&calls), 3);
}

#[tokio::test]
async fn unexpected_state_carries_hook_error() {
    let (waiter, _) = instant(states(&["A", "failed"]));
    let mut waiter = waiter
        .pending(["A"])
        .target(["B"])
        .last_error_from(|_: &usize| Some(ProbeError("quota exceeded")));

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert!(err.is_unexpected_state());
    assert_eq!(
        err.to_string(),
        "unexpected state 'failed', wanted target 'B'. last error: quota exceeded"
    );
}

#[tokio::test]
async fn probe_errors_propagate_unchanged() {
    let steps = vec![Step::State("A"), Step::Fail(WaitError::Inner(ProbeError("access denied")))];
    let (waiter, calls) = instant(steps);
    let mut waiter = waiter.pending(["A"]).target(["B"]);

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert_eq!(err.into_inner(), Some(ProbeError("access denied")));
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn absence_with_empty_target_succeeds_immediately() {
    let (waiter, calls) = instant(vec![Step::Absent]);
    let mut waiter = waiter.pending(["deleting"]);

    assert_eq!(waiter.wait_for_state(&Context::background()).await.unwrap(), None);
    assert_eq!(count(&calls), 1);
}

#[tokio::test]
async fn absence_streak_counts_for_empty_target() {
    let steps = vec![Step::State("deleting"), Step::Absent, Step::Absent];
    let (waiter, calls) = instant(steps);
    let mut waiter = waiter.pending(["deleting"]).continuous_target_occurrence(2);

    assert_eq!(waiter.wait_for_state(&Context::background()).await.unwrap(), None);
    assert_eq!(count(&calls), 3);
}

#[tokio::test(start_paused = true)]
async fn timeout_reports_budget_and_last_state() {
    init_tracing();
    let (refresh, _) = scripted(states(&["A"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["A"])
        .target(["B"])
        .timeout(Duration::from_millis(100));

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert!(err.timed_out());
    let timeout = err.as_timeout().unwrap();
    assert_eq!(timeout.timeout, Duration::from_millis(100));
    assert_eq!(timeout.last_state.as_deref(), Some("A"));
    assert_eq!(timeout.expected_states, vec!["B".to_string()]);
    assert_eq!(
        err.to_string(),
        "timeout while waiting for state to become 'B' (last state: 'A', timeout: 100ms)"
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_carries_hook_error() {
    let (refresh, _) = scripted(states(&["A"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["A"])
        .target(["B"])
        .poll_interval(Duration::from_millis(30))
        .timeout(Duration::from_millis(100))
        .last_error_from(|seen: &usize| (*seen > 0).then_some(ProbeError("stuck in A")));

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(!err.timed_out());
    assert!(err.to_string().ends_with(": stuck in A"), "{err}");
}

#[tokio::test(start_paused = true)]
async fn creating_then_available_end_to_end() {
    init_tracing();
    let (refresh, calls) = scripted(states(&["creating", "creating", "available"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["creating"])
        .target(["available"])
        .poll_interval(Duration::from_millis(10))
        .timeout(Duration::from_secs(1));

    let start = Instant::now();
    let got = waiter.wait_for_state(&Context::background()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(got, Some(2));
    assert_eq!(count(&calls), 3);
    assert!(elapsed >= Duration::from_millis(20), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
}

#[tokio::test]
async fn backoff_holds_while_target_streak_builds() {
    let sleeper = TrackingSleeper::new();
    let (refresh, _) = scripted(states(&["pending", "ready", "ready", "ready"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["pending"])
        .target(["ready"])
        .continuous_target_occurrence(3)
        .jitter(Jitter::None)
        .with_sleeper(sleeper.clone());

    waiter.wait_for_state(&Context::background()).await.unwrap();
    let step = Duration::from_millis(100);
    assert_eq!(sleeper.calls(), vec![step, step, step]);
}

#[tokio::test]
async fn backoff_grows_while_pending() {
    let sleeper = TrackingSleeper::new();
    let (refresh, _) = scripted(states(&["pending", "pending", "pending", "ready"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["pending"])
        .target(["ready"])
        .jitter(Jitter::None)
        .with_sleeper(sleeper.clone());

    waiter.wait_for_state(&Context::background()).await.unwrap();
    assert_eq!(
        sleeper.calls(),
        vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(400)]
    );
}

#[tokio::test(start_paused = true)]
async fn initial_delay_runs_before_first_probe() {
    let (refresh, _) = scripted(states(&["available"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .target(["available"])
        .delay(Duration::from_millis(50))
        .timeout(Duration::from_secs(1));

    let start = Instant::now();
    waiter.wait_for_state(&Context::background()).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn initial_delay_counts_against_timeout() {
    let (refresh, calls) = scripted(states(&["available"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .target(["available"])
        .delay(Duration::from_secs(5))
        .timeout(Duration::from_secs(1));

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert!(err.timed_out());
    assert_eq!(count(&calls), 0);
}

#[tokio::test]
async fn zero_timeout_fails_without_probing() {
    let (refresh, calls) = scripted(states(&["available"]));
    let mut waiter = StateChangeConfig::new(refresh).target(["available"]).timeout(Duration::ZERO);

    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert!(err.timed_out());
    assert_eq!(count(&calls), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_cause_not_timeout() {
    let (refresh, _) = scripted(states(&["creating"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["creating"])
        .target(["available"])
        .timeout(Duration::from_secs(3600));

    let ctx = Context::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        canceller.cancel_with_cause("stack deleted");
    });

    let err = waiter.wait_for_state(&ctx).await.unwrap_err();
    assert!(err.is_canceled());
    assert!(!err.is_timeout());
    assert_eq!(err.to_string(), "stack deleted");
}

#[tokio::test(start_paused = true)]
async fn outer_deadline_is_reported_as_context_error() {
    let (refresh, _) = scripted(states(&["creating"]));
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["creating"])
        .target(["available"])
        .timeout(Duration::from_secs(3600));

    let ctx = Context::background().with_timeout(Duration::from_secs(1));
    let err = waiter.wait_for_state(&ctx).await.unwrap_err();
    assert!(err.is_deadline_exceeded());
}

#[tokio::test(start_paused = true)]
async fn slow_probe_is_bounded_by_remaining_budget() {
    let mut waiter = StateChangeConfig::<usize, &'static str, ProbeError>::new(|ctx: Context| async move {
        ctx.done().await;
        Err(WaitError::Context(ctx.err().unwrap_or(ContextError::DeadlineExceeded)))
    })
    .target(["available"])
    .timeout(Duration::from_millis(500));

    let start = Instant::now();
    let err = waiter.wait_for_state(&Context::background()).await.unwrap_err();
    assert!(err.timed_out(), "{err}");
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn min_timeout_floors_jittered_sleeps() {
    let sleeper = TrackingSleeper::new();
    let mut steps = vec![Step::State("pending"); 12];
    steps.push(Step::State("ready"));
    let (refresh, _) = scripted(steps);
    let mut waiter = StateChangeConfig::new(refresh)
        .pending(["pending"])
        .target(["ready"])
        .min_timeout(Duration::from_millis(200))
        .with_sleeper(sleeper.clone());

    waiter.wait_for_state(&Context::background()).await.unwrap();
    let sleeps = sleeper.calls();
    assert_eq!(sleeps.len(), 12);
    for slept in sleeps {
        assert!(slept >= Duration::from_millis(200), "{slept:?}");
    }
}

#[tokio::test]
async fn cancellation_seen_by_refresh_keeps_cause() {
    let ctx = Context::background();
    let outer = ctx.clone();
    let mut waiter = StateChangeConfig::<usize, &'static str, ProbeError>::new(move |probe_ctx: Context| {
        outer.cancel_with_cause("stack deleted");
        async move { Err(WaitError::Context(probe_ctx.check().err().unwrap_or(ContextError::Canceled))) }
    })
    .target(["available"])
    .timeout(Duration::from_secs(60));

    let err = waiter.wait_for_state(&ctx).await.unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(err.to_string(), "stack deleted");
}
