//! End-to-end collector behaviour with real processes.

use public_exporter::{task::TaskState, CollectorKey, CollectorSpec};
use std::time::{Duration, Instant};

mod helpers;
use helpers::{eventually, process_manager, scripts::ScriptDir};

#[tokio::test]
async fn test_successful_script_is_published_within_two_seconds() {
    let scripts = ScriptDir::new();
    let key = CollectorKey::new("prod", "echo");
    let manager = process_manager();
    manager
        .start(vec![(key.clone(), scripts.shell_spec("ok.sh", r#"echo "ok""#, 1, 5))])
        .unwrap();

    assert!(eventually(Duration::from_secs(2), || manager.active_count() == 1).await);
    let snapshot = manager.registry().get(&key).unwrap();
    assert!(snapshot.healthy);
    assert!(snapshot.formatted_output.contains("ok"));
    assert!(manager.is_healthy());

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_timed_out_script_is_unhealthy_without_partial_output() {
    let scripts = ScriptDir::new();
    let key = CollectorKey::new("prod", "slow");
    let manager = process_manager();
    manager
        .start(vec![(
            key.clone(),
            scripts.shell_spec("slow.sh", "echo partial-line\nsleep 5", 30, 1),
        )])
        .unwrap();

    assert!(eventually(Duration::from_secs(4), || manager.active_count() == 1).await);
    let snapshot = manager.registry().get(&key).unwrap();
    assert!(!snapshot.healthy);
    assert!(snapshot.formatted_output.contains("# Error: script timed out"));
    assert!(!snapshot.formatted_output.contains("partial-line"));
    assert!(!manager.is_healthy());

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_script_type_stops_without_publishing() {
    let scripts = ScriptDir::new();
    let marker = scripts.path().join("ran");
    let script = scripts.shell("check.rb", &format!("touch {}", marker.display()));
    let key = CollectorKey::new("prod", "ruby");
    let manager = process_manager();
    manager
        .start(vec![(
            key.clone(),
            CollectorSpec {
                script_path: script.to_string_lossy().into_owned(),
                script_type: "ruby".to_string(),
                interval_seconds: 1,
                timeout_seconds: 1,
                enabled: true,
            },
        )])
        .unwrap();

    let stopped = eventually(Duration::from_secs(1), || {
        manager.task_states() == vec![(key.clone(), TaskState::Stopped)]
    })
    .await;
    assert!(stopped);
    assert!(manager.registry().get(&key).is_none());
    assert!(!marker.exists());

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_long_running_collectors_do_not_block_each_other() {
    let scripts = ScriptDir::new();
    let a = CollectorKey::new("prod", "a");
    let b = CollectorKey::new("staging", "b");
    let manager = process_manager();

    let started = Instant::now();
    manager
        .start(vec![
            (a.clone(), scripts.shell_spec("a.sh", "sleep 1\necho a_value 1", 30, 5)),
            (b.clone(), scripts.shell_spec("b.sh", "sleep 1\necho b_value 2", 30, 5)),
        ])
        .unwrap();

    assert!(eventually(Duration::from_secs(4), || manager.active_count() == 2).await);
    // Sequential execution would need at least two seconds.
    assert!(started.elapsed() < Duration::from_millis(1900));
    assert!(manager.registry().get(&a).unwrap().formatted_output.contains("a_value 1"));
    assert!(manager.registry().get(&b).unwrap().formatted_output.contains("b_value 2"));

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_executions_of_one_collector_never_overlap() {
    let scripts = ScriptDir::new();
    let log = scripts.path().join("runs.log");
    let body = format!(
        "echo \"start $(date +%s%N)\" >> {log}\nsleep 1.5\necho \"end $(date +%s%N)\" >> {log}\necho done 1",
        log = log.display()
    );
    let manager = process_manager();
    manager
        .start(vec![(CollectorKey::new("prod", "overrun"), scripts.shell_spec("overrun.sh", &body, 1, 5))])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    manager.stop().await.unwrap();

    let contents = std::fs::read_to_string(&log).unwrap();
    let events: Vec<(&str, u128)> = contents
        .lines()
        .map(|line| {
            let (kind, ts) = line.split_once(' ').unwrap();
            (kind, ts.parse().unwrap())
        })
        .collect();

    assert!(events.len() >= 4, "expected at least two runs, got {:?}", events);
    for pair in events.chunks(2) {
        assert_eq!(pair[0].0, "start");
        if let Some(end) = pair.get(1) {
            assert_eq!(end.0, "end");
            assert!(end.1 >= pair[0].1);
        }
    }
    for window in events.windows(2) {
        assert!(window[1].1 >= window[0].1);
    }
}

#[tokio::test]
async fn test_no_publishes_after_stop_returns() {
    let scripts = ScriptDir::new();
    let key = CollectorKey::new("prod", "tick");
    let manager = process_manager();
    manager
        .start(vec![(key.clone(), scripts.shell_spec("tick.sh", "echo tick 1", 1, 2))])
        .unwrap();

    assert!(eventually(Duration::from_secs(2), || manager.active_count() == 1).await);
    manager.stop().await.unwrap();

    let before = manager.snapshot();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let after = manager.snapshot();
    assert_eq!(before.len(), after.len());
    for ((_, b), (_, a)) in before.iter().zip(after.iter()) {
        assert_eq!(b.last_updated, a.last_updated);
    }
    assert!(manager
        .task_states()
        .iter()
        .all(|(_, state)| *state == TaskState::Stopped));
}

#[tokio::test]
async fn test_snapshot_without_intervening_writes_is_stable() {
    let scripts = ScriptDir::new();
    let manager = process_manager();
    manager
        .start(vec![(CollectorKey::new("prod", "once"), scripts.shell_spec("once.sh", "echo once 1", 60, 2))])
        .unwrap();

    assert!(eventually(Duration::from_secs(2), || manager.active_count() == 1).await);
    let first = manager.snapshot();
    let second = manager.snapshot();
    assert_eq!(first, second);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_execution() {
    let scripts = ScriptDir::new();
    let key = CollectorKey::new("prod", "busy");
    let manager = process_manager();
    manager
        .start(vec![(key.clone(), scripts.shell_spec("busy.sh", "sleep 1\necho busy 1", 60, 5))])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.stop().await.unwrap();

    // The run in progress at stop time still completes and publishes.
    let snapshot = manager.registry().get(&key).unwrap();
    assert!(snapshot.healthy);
    assert!(snapshot.formatted_output.contains("busy 1"));
}
