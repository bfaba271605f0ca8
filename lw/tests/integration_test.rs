//! Integration tests for Loadwatch
//!
//! These tests drive the coordinator through its public surface only.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use loadwatch::api::{CommentInput, DashboardSession, SimulatedBackend, SimulatedConfig, StakeholderType};
use loadwatch::boundary::ErrorBoundary;
use loadwatch::config::ApiConfig;
use loadwatch::loading::{
    Coordinator, CoordinatorConfig, HistoryAction, LoadingError, LoadingEvent, LoadingOptions,
};
use proptest::prelude::*;

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Coordinator whose operations carry no deadline, usable without a runtime
fn untimed() -> Coordinator {
    Coordinator::new(CoordinatorConfig {
        default_timeout_ms: 0,
        history_capacity: 256,
        ..Default::default()
    })
}

// =============================================================================
// Registry consistency
// =============================================================================

#[derive(Debug, Clone)]
enum Step {
    Start(usize),
    Stop(usize),
}

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        prop_oneof![(0..4usize).prop_map(Step::Start), (0..4usize).prop_map(Step::Stop)],
        0..60,
    )
}

const NAMES: [&str; 4] = ["fetchComments", "fetchDashboard", "submitComment", "checkHealth"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A name is loading exactly when its latest start has no later stop
    #[test]
    fn prop_is_loading_matches_start_stop_model(steps in arb_steps()) {
        let coord = untimed();
        let mut model = BTreeSet::new();
        let mut expected_stops = 0;

        for step in &steps {
            match step {
                Step::Start(i) => {
                    coord.start_loading(NAMES[*i], LoadingOptions::new());
                    model.insert(NAMES[*i]);
                }
                Step::Stop(i) => {
                    coord.stop_loading(NAMES[*i]);
                    if model.remove(NAMES[*i]) {
                        expected_stops += 1;
                    }
                }
            }

            for name in NAMES {
                prop_assert_eq!(coord.is_loading(name), model.contains(name));
            }
            prop_assert_eq!(coord.active_count(), model.len());
        }

        let active: Vec<String> = model.iter().map(|s| s.to_string()).collect();
        prop_assert_eq!(coord.active_names(), active);

        let stops = coord.history().iter().filter(|e| e.action == HistoryAction::Stop).count();
        prop_assert_eq!(stops, expected_stops);
    }
}

// =============================================================================
// Deadline behavior
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_stops_operation_and_notifies_once() {
    let coord = Coordinator::default();
    let on_timeout = counter();
    let boundary = counter();
    let (t, b) = (on_timeout.clone(), boundary.clone());
    coord.add_error_boundary_callback(move |record| {
        assert!(record.is_timeout());
        assert_eq!(record.operation.as_deref(), Some("fetchWordcloud"));
        b.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    coord.start_loading(
        "fetchWordcloud",
        LoadingOptions::new().timeout_ms(1000).on_timeout(move |err, _| {
            assert!(matches!(err, LoadingError::Timeout { timeout_ms: 1000, .. }));
            t.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    advance(999).await;
    assert!(coord.is_loading("fetchWordcloud"));

    advance(1).await;
    assert!(!coord.is_loading("fetchWordcloud"));
    advance(60_000).await;
    assert_eq!(on_timeout.load(Ordering::SeqCst), 1);
    assert_eq!(boundary.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_deadline_means_no_timeout() {
    let coord = Coordinator::default();
    let fired = counter();
    let seen = fired.clone();
    coord.start_loading(
        "x",
        LoadingOptions::new().timeout_ms(1000).on_timeout(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    advance(500).await;
    coord.stop_loading("x");
    advance(1500).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_force_stop_sweeps_and_disarms() {
    let coord = Coordinator::default();
    let fired = counter();
    for name in ["a", "b", "c"] {
        let seen = fired.clone();
        coord.start_loading(
            name,
            LoadingOptions::new().timeout_ms(2000).on_timeout(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }

    assert_eq!(coord.force_stop_all_loading("route change"), 3);
    assert!(coord.get_active_operations().is_empty());
    advance(10_000).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Error routing
// =============================================================================

#[tokio::test]
async fn test_one_failing_subscriber_does_not_block_others() {
    let coord = Coordinator::default();
    let hits = counter();
    let seen = hits.clone();
    coord.set_error_callback("x", |_| Err(eyre::eyre!("listener broke")));
    coord.add_error_boundary_callback(|_| -> eyre::Result<()> { panic!("boundary broke") });
    coord.add_error_boundary_callback(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let record = coord.handle_loading_error("x", LoadingError::application("err"));
    assert_eq!(record.message(), "err");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_with_loading_failure_is_routed_and_rethrown() {
    let coord = Coordinator::default();
    let routed = counter();
    let seen = routed.clone();
    coord.add_error_boundary_callback(move |record| {
        assert_eq!(record.operation.as_deref(), Some("submit"));
        assert_eq!(record.message(), "bad");
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let result: Result<(), String> = coord
        .with_loading("submit", async { Err("bad".to_string()) }, LoadingOptions::new())
        .await;
    assert_eq!(result.unwrap_err(), "bad");
    assert!(!coord.is_loading("submit"));
    assert_eq!(routed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cleanup_twice_is_harmless() {
    let coord = Coordinator::default();
    let ran = counter();
    let seen = ran.clone();
    coord.start_loading("a", LoadingOptions::new());
    coord.add_cleanup_callback(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    coord.cleanup();
    coord.cleanup();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(coord.is_idle());
    assert!(coord.history().is_empty());
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_fetch_completes_within_deadline() {
    let coord = Coordinator::default();
    coord.start_loading("fetchData", LoadingOptions::new().timeout_ms(5000));
    assert!(coord.is_loading("fetchData"));

    advance(2000).await;
    coord.stop_loading("fetchData");
    advance(10_000).await;

    let actions: Vec<_> = coord.history().into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![HistoryAction::Start, HistoryAction::Stop]);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_staggered_operations() {
    let coord = Coordinator::default();
    let mut events = coord.subscribe();
    for name in ["op1", "op2", "op3"] {
        coord.start_loading(name, LoadingOptions::new().timeout_ms(10_000));
    }

    for (i, name) in ["op1", "op2", "op3"].into_iter().enumerate() {
        advance(1000).await;
        coord.stop_loading(name);
        assert_eq!(coord.get_debug_info().operation_count, 2 - i);
    }

    let mut stopped = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LoadingEvent::Stopped { operation, elapsed_ms } = event {
            stopped.push((operation, elapsed_ms));
        }
    }
    assert_eq!(
        stopped,
        vec![
            ("op1".to_string(), 1000),
            ("op2".to_string(), 2000),
            ("op3".to_string(), 3000)
        ]
    );
}

// =============================================================================
// Dashboard session
// =============================================================================

#[tokio::test]
async fn test_dashboard_session_with_boundary() {
    let coord = Coordinator::default();
    let backend = Arc::new(SimulatedBackend::new(&SimulatedConfig {
        latency_ms: 0,
        failure_rate: 0.0,
    }));
    let session = DashboardSession::new(coord.clone(), backend, ApiConfig::default());
    let boundary = ErrorBoundary::attach(&coord);

    for text in ["Love the library hours", "Hate the parking fees", "Meeting notes attached"] {
        let input = CommentInput::new(StakeholderType::Citizen, text).unwrap();
        session.submit_comment(&input).await.unwrap();
    }

    let view = session.refresh(2).await;
    let stats = view.stats.unwrap();
    assert_eq!(stats.total_comments, 3);
    assert_eq!(view.comments.unwrap().len(), 2);
    assert!(!boundary.has_error());

    let metrics = coord.metrics();
    assert_eq!(metrics.get("submitComment").unwrap().completed, 3);
    assert_eq!(metrics.total_errored, 0);
    assert!(coord.is_idle());
}

// =============================================================================
// CLI
// =============================================================================

mod cli {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// `lw` isolated from the user's config and log directories
    fn lw(home: &TempDir) -> Command {
        let mut cmd = Command::cargo_bin("lw").unwrap();
        cmd.current_dir(home.path())
            .env("HOME", home.path())
            .env("XDG_CONFIG_HOME", home.path().join("config"))
            .env("XDG_DATA_HOME", home.path().join("data"));
        cmd
    }

    #[test]
    fn test_help() {
        let home = TempDir::new().unwrap();
        lw(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("loading operations"));
    }

    #[test]
    fn test_config_json() {
        let home = TempDir::new().unwrap();
        lw(&home)
            .args(["config", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("default-timeout-ms"));
    }

    #[test]
    fn test_local_config_file_is_used() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join(".loadwatch.yml"), "api:\n  base-url: http://example.test\n").unwrap();
        lw(&home)
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("http://example.test"));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let home = TempDir::new().unwrap();
        lw(&home)
            .args(["--config", "nope.yml", "config"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to load config"));
    }

    #[test]
    fn test_simulated_submit() {
        let home = TempDir::new().unwrap();
        lw(&home)
            .args(["--simulate", "--format", "json", "submit", "-s", "ngo", "Love the cleaner river"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"sentiment_label\": \"positive\""));
    }

    #[test]
    fn test_invalid_stakeholder_rejected() {
        let home = TempDir::new().unwrap();
        lw(&home)
            .args(["--simulate", "submit", "-s", "government", "Fine"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown stakeholder type"));
    }

    #[test]
    fn test_simulated_health() {
        let home = TempDir::new().unwrap();
        lw(&home)
            .args(["--simulate", "health"])
            .assert()
            .success()
            .stdout(predicate::str::contains("healthy"));
    }

    #[test]
    fn test_demo_json_summary() {
        let home = TempDir::new().unwrap();
        lw(&home)
            .args(["demo", "-n", "3", "--latency-ms", "0", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"cleanup\"").and(predicate::str::contains("submitComment")));
    }
}
