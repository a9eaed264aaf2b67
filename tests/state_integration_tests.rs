//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Guards an export run against double entry, even under contention
//! - Maintains consistency across the export, zoning and capture flows

use std::sync::Arc;
use std::time::Duration as StdDuration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::time::{Duration, timeout};
use zonatlas::models::{CropKind, CropStatus, ExportPhase, ExportSummary, ProjectOutcome};
use zonatlas::services::DiscoveredProject;
use zonatlas::{Preferences, StateChange, StateManager};

fn outcome(name: &str, status: CropStatus) -> ProjectOutcome {
    let path = Utf8PathBuf::from(format!("/missions/{name}.qgz"));
    let mut outcome = ProjectOutcome::new(&path);
    outcome.record(CropKind::Wide, status, "", None);
    outcome.record(CropKind::Core, status, "", None);
    outcome
}

#[tokio::test]
async fn test_root_change_events_emitted() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.set_mission_root(Some(Utf8PathBuf::from("/missions/2026 Ain")));

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");

    assert!(
        matches!(event, StateChange::RootChanged { configured: true }),
        "Expected RootChanged event, got: {:?}",
        event
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();
    let mut rx3 = state.subscribe();

    state.set_projects(vec![DiscoveredProject {
        name: "Accès".to_string(),
        path: Utf8PathBuf::from("/missions/2026 Ain/Accès.qgz"),
    }]);

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout")
            .expect("Channel closed");
        assert!(matches!(
            event,
            StateChange::ProjectsDiscovered { count: 1 }
        ));
    }
}

#[tokio::test]
async fn test_export_lifecycle_events() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state
        .try_begin_export(2)
        .expect("first start must be accepted");

    let mut found_started = false;
    for _ in 0..3 {
        match timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(StateChange::ExportStarted { total_projects: 2 })) => {
                found_started = true;
            }
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(found_started, "Should receive ExportStarted event");

    state.record_outcome(&outcome("Accès", CropStatus::Exported));

    let mut found_completed = false;
    for _ in 0..4 {
        match timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(StateChange::ProjectCompleted {
                project,
                exported,
                ..
            })) => {
                assert_eq!(project, "Accès");
                assert_eq!(exported, 2);
                found_completed = true;
            }
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(found_completed, "Should receive ProjectCompleted event");

    let mut summary = ExportSummary::default();
    summary.absorb(outcome("Accès", CropStatus::Exported));
    summary.elapsed = StdDuration::from_secs(42);
    state.finish_export(&summary);

    let mut found_finished = false;
    for _ in 0..4 {
        match timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(StateChange::ExportFinished { exported, .. })) => {
                assert_eq!(exported, 2);
                found_finished = true;
                break;
            }
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(found_finished, "Should receive ExportFinished event");

    let snapshot = state.snapshot();
    assert_eq!(snapshot.phase, ExportPhase::Done);
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.last_elapsed, Some(StdDuration::from_secs(42)));
}

#[tokio::test]
async fn test_double_start_guard_under_contention() {
    let state = Arc::new(StateManager::new());

    let mut handles = vec![];
    for _ in 0..8 {
        let state_clone = Arc::clone(&state);
        handles.push(tokio::spawn(async move {
            state_clone.try_begin_export(4).is_some()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1, "Exactly one start may win the race");
    assert_eq!(state.read(|s| s.phase), ExportPhase::Running);
}

#[tokio::test]
async fn test_progress_updates_emit_events() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.update_progress(
        "Accès".to_string(),
        "Rendu de la mise en page...".to_string(),
    );

    let mut received_progress = false;
    let mut received_operation = false;

    for _ in 0..2 {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout")
            .expect("Channel closed");

        match event {
            StateChange::ProgressUpdated { .. } => received_progress = true,
            StateChange::OperationChanged { .. } => received_operation = true,
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    assert!(received_progress, "Should receive ProgressUpdated event");
    assert!(received_operation, "Should receive OperationChanged event");
}

#[tokio::test]
async fn test_zoning_flow_events() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.set_zoning_running(true);

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout")
        .expect("Channel closed");
    assert!(matches!(
        event,
        StateChange::ZoningStateChanged { running: true }
    ));

    let workbook = Utf8PathBuf::from("/missions/2026 Ain/ID zonages.xlsx");
    state.finish_zoning(Some(workbook.clone()));

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout")
        .expect("Channel closed");
    assert!(matches!(
        event,
        StateChange::ZoningStateChanged { running: false }
    ));

    assert_eq!(state.read(|s| s.last_workbook.clone()), Some(workbook));
}

#[tokio::test]
async fn test_capture_flag_round_trip() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.set_capture_running(true);
    state.set_capture_running(false);

    let mut transitions = Vec::new();
    for _ in 0..2 {
        match timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(StateChange::CaptureStateChanged { running })) => transitions.push(running),
            Ok(Ok(other)) => panic!("Unexpected event: {:?}", other),
            _ => break,
        }
    }

    assert_eq!(transitions, vec![true, false]);
}

#[tokio::test]
async fn test_concurrent_state_access() {
    let state = Arc::new(StateManager::new());

    let mut handles = vec![];
    for i in 0..10 {
        let state_clone = Arc::clone(&state);
        handles.push(tokio::spawn(async move {
            state_clone.update(|s| {
                s.projects_done = i;
            });
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    // Last write wins, but the value must be one of the written ones.
    let done = state.read(|s| s.projects_done);
    assert!(done < 10, "projects_done should be within range");
}

#[tokio::test]
async fn test_apply_preferences_restores_root_and_settings() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    let mut preferences = Preferences::default();
    preferences.mission_root = "/missions/2026 Ain".to_string();
    preferences.worker_count = 6;
    preferences.dpi = 150;
    state.apply_preferences(&preferences);

    let mut found_root = false;
    let mut found_settings = false;
    for _ in 0..4 {
        match timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Ok(StateChange::RootChanged { configured: true })) => found_root = true,
            Ok(Ok(StateChange::SettingsChanged)) => found_settings = true,
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }

    assert!(found_root, "Should receive RootChanged event");
    assert!(found_settings, "Should receive SettingsChanged event");

    let snapshot = state.snapshot();
    assert_eq!(
        snapshot.mission_root.as_deref(),
        Some(Utf8Path::new("/missions/2026 Ain"))
    );
    assert_eq!(snapshot.worker_count, 6);
    assert_eq!(snapshot.dpi, 150);
}

#[tokio::test]
async fn test_clearing_root_resets_readiness() {
    let state = Arc::new(StateManager::new());
    state.set_mission_root(Some(Utf8PathBuf::from("/missions/2026 Ain")));
    state.set_projects(vec![DiscoveredProject {
        name: "Accès".to_string(),
        path: Utf8PathBuf::from("/missions/2026 Ain/Accès.qgz"),
    }]);
    assert!(state.read(|s| s.is_ready_for_export()));

    state.set_mission_root(None);

    let snapshot = state.snapshot();
    assert!(!snapshot.is_root_configured);
    assert!(snapshot.projects.is_empty());
    assert!(!snapshot.is_ready_for_export());
}
