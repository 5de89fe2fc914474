//! Cluster rounds end to end, with a local stand-in for the SSH client

mod common;

use std::time::{Duration, Instant};

use common::{fake_cluster, fake_cluster_from};
use fleetcmd_core::{ExecutionMode, Phase};
use fleetcmd_exec::{ExecError, HostTarget};

#[tokio::test]
async fn test_parallel_echo() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);

    let report = cluster.run(ExecutionMode::Parallel, "echo hi", None).await;

    assert!(report.is_success());
    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        assert!(result.success());
        assert_eq!(result.output.stdout.to_string(), "hi\n");
        assert!(result.output.stderr.is_empty());
    }
}

#[tokio::test]
async fn test_buffers_hold_exact_output() {
    for mode in [ExecutionMode::Parallel, ExecutionMode::Sequential] {
        let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);

        let report = cluster.run(mode, "echo out; echo err >&2", None).await;

        assert!(report.is_success(), "{mode}");
        for result in &report.results {
            assert_eq!(result.output.stdout.to_string(), "out\n");
            assert_eq!(result.output.stderr.to_string(), "err\n");
        }
    }
}

#[tokio::test]
async fn test_missing_binary_reported_per_host() {
    for mode in [ExecutionMode::Parallel, ExecutionMode::Sequential] {
        let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);

        let report = cluster.run(mode, "nonexistent-binary", None).await;

        assert_eq!(report.results.len(), 2);
        for result in &report.results {
            assert!(result.error.is_some(), "{mode}");
            assert!(result.output.stderr.contains("nonexistent-binary"));
        }
        let err = report.error.unwrap();
        assert_eq!(err.index, 0);
        assert_eq!(err.host, "localhost");
    }
}

#[tokio::test]
async fn test_cluster_cwd() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]).with_cwd("/tmp");

    let report = cluster.run_all("pwd", None).await;

    assert!(report.is_success());
    for result in &report.results {
        assert_eq!(result.output.stdout.to_string(), "/tmp\n");
    }
}

#[tokio::test]
async fn test_rounds_do_not_leak_output() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);

    let first = cluster.run_all("echo hi", None).await;
    let second = cluster.run_all("echo hi", None).await;

    assert!(first.is_success() && second.is_success());
    for (a, b) in first.results.iter().zip(&second.results) {
        assert_eq!(a.output.stdout.to_string(), "hi\n");
        assert_eq!(b.output.stdout.to_string(), "hi\n");
    }
}

#[tokio::test]
async fn test_parallel_timeout() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);
    let started = Instant::now();

    let report = cluster
        .run_all("sleep 5; echo OK", Some(Duration::from_millis(300)))
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    let err = report.error.unwrap();
    assert_eq!(err.phase, Phase::Wait);
    assert!(err.source.is_timeout());
    for result in &report.results {
        assert!(result.error.as_ref().is_some_and(ExecError::is_timeout));
        assert!(!result.output.stdout.contains("OK"));
    }
}

#[tokio::test]
async fn test_finishes_before_timeout() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);

    let report = cluster
        .run_sequential("sleep 0.1; echo OK", Some(Duration::from_secs(5)))
        .await;

    assert!(report.is_success());
    for result in &report.results {
        assert_eq!(result.output.stdout.to_string(), "OK\n");
    }
}

#[tokio::test]
async fn test_sequential_stop_on_error() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]).with_stop_on_error(true);

    let report = cluster.run_sequential("exit 3", None).await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].host, "localhost");
    assert_eq!(
        report.results[0].error,
        Some(ExecError::ExitStatus { code: 3 })
    );
    assert_eq!(report.error.unwrap().phase, Phase::Run);
}

#[tokio::test]
async fn test_duplicates_keep_order() {
    let hosts = ["localhost", "127.0.0.1", "localhost"];
    let mut cluster = fake_cluster(&hosts);

    let report = cluster.run_all("sleep 0.2; echo done", None).await;

    let labels: Vec<_> = report.results.iter().map(|r| r.host.as_str()).collect();
    assert_eq!(labels, hosts);
    assert!(report.results.iter().all(|r| r.output.stdout.to_string() == "done\n"));
}

#[tokio::test]
async fn test_missing_key_on_one_host() {
    let targets = vec![
        HostTarget::parse("localhost"),
        HostTarget::parse("127.0.0.1").with_key("/no/such/key"),
        HostTarget::parse("deploy@localhost"),
    ];
    let mut cluster = fake_cluster_from(targets);

    let report = cluster.run_all("echo hi", None).await;

    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].success());
    assert_eq!(
        report.results[1].error,
        Some(ExecError::KeyNotFound("/no/such/key".to_string()))
    );
    assert!(report.results[2].success());
    assert_eq!(report.results[2].host, "deploy@localhost");

    let err = report.error.unwrap();
    assert_eq!((err.index, err.phase), (1, Phase::Start));
}

#[tokio::test]
async fn test_missing_key_stops_parallel_round() {
    let targets = vec![
        HostTarget::parse("localhost"),
        HostTarget::parse("127.0.0.1").with_key("/no/such/key"),
        HostTarget::parse("deploy@localhost"),
    ];
    let mut cluster = fake_cluster_from(targets).with_stop_on_error(true);

    let report = cluster.run_all("echo hi", None).await;

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].output.stdout.to_string(), "hi\n");
    assert!(report.results[0].success());
    assert_eq!(report.error.unwrap().phase, Phase::Start);
}

#[tokio::test]
async fn test_parallel_stop_on_error_kills_the_rest() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]).with_stop_on_error(true);
    cluster.members_mut()[1].executor.target_mut().cwd = Some("/".to_string());
    let started = Instant::now();

    // Only the host with cwd "/" sleeps
    let report = cluster
        .run_all("if [ \"$(pwd)\" = / ]; then sleep 5; else exit 1; fi", None)
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.error.unwrap().host, "localhost");
    assert_eq!(report.results[1].error, Some(ExecError::Cancelled));
}

#[tokio::test]
async fn test_round_after_unwaited_round() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);

    drop(cluster.start_all("echo first; sleep 5", None));
    let report = cluster.run_all("echo second", None).await;

    assert!(report.is_success());
    for result in &report.results {
        assert_eq!(result.output.stdout.to_string(), "second\n");
    }

    drop(cluster.start_all("sleep 5", None));
    let report = cluster.run_sequential("echo third", None).await;
    assert!(report.is_success());
    assert_eq!(report.results.len(), 2);
}

#[tokio::test]
async fn test_timeout_reaches_background_jobs() {
    let mut cluster = fake_cluster(&["localhost", "127.0.0.1"]);
    let started = Instant::now();

    let report = cluster
        .run_all("sleep 3 & echo hi", Some(Duration::from_millis(300)))
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.error.unwrap().source.is_timeout());
    for result in &report.results {
        assert!(result.error.as_ref().is_some_and(ExecError::is_timeout));
        assert_eq!(result.output.stdout.to_string(), "hi\n");
    }
}
