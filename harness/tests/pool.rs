use std::path::PathBuf;
use std::process::Command;

use gc_gen::Program;
use gc_harness::{
    score_population, Evaluator, FitnessConfig, HarnessError, Job, JobOutcome, PoolConfig,
    TestCase, WorkerPool,
};

const FIVE: &str = "SET v0 5\nYIELD v0";
// 9^16 iterations
const HANG: &str = "SET v0 9\nSET v1 1\n\
    MUL v0 v0\nMUL v0 v0\nMUL v0 v0\nMUL v0 v0\n\
    LOOP v0 v1 ( NOP )";

fn config(workers: usize) -> PoolConfig {
    PoolConfig {
        workers,
        worker_program: Some(PathBuf::from(env!("CARGO_BIN_EXE_gc"))),
        job_timeout_ms: None,
        liveness_ms: 2000,
    }
}

fn job(id: usize, program: &str) -> Job {
    Job {
        id,
        program: program.to_string(),
        input: vec![],
    }
}

#[test]
fn pool_runs_jobs() {
    let mut pool = WorkerPool::new(config(2));
    pool.start().unwrap();
    assert_eq!(pool.alive_workers(), 2);

    pool.submit((0..8).map(|id| job(id, FIVE)).collect()).unwrap();
    let results = pool.collect(8).unwrap();
    assert_eq!(results.len(), 8);
    for id in 0..8 {
        assert_eq!(results[&id].output(), Some(&[5][..]), "job {id}");
    }
}

#[test]
fn start_twice_is_rejected() {
    let mut pool = WorkerPool::new(config(1));
    pool.start().unwrap();
    assert!(matches!(pool.start(), Err(HarnessError::AlreadyInitialized)));
    assert_eq!(pool.alive_workers(), 1);
}

#[test]
fn hung_worker_is_replaced() {
    let mut pool = WorkerPool::new(config(2));
    pool.start().unwrap();

    let mut jobs = vec![job(0, HANG)];
    jobs.extend((1..=5).map(|id| job(id, FIVE)));
    pool.submit(jobs).unwrap();
    let results = pool.collect(6).unwrap();

    assert_eq!(results[&0], JobOutcome::Failed);
    for id in 1..=5 {
        assert_eq!(results[&id].output(), Some(&[5][..]), "job {id}");
    }
    assert_eq!(pool.restarts(), 1);
    assert_eq!(pool.alive_workers(), 2);

    // the replacement serves the next batch
    pool.submit((10..14).map(|id| job(id, FIVE)).collect()).unwrap();
    let results = pool.collect(4).unwrap();
    assert!(results.values().all(|r| r.output() == Some(&[5][..])));
}

/// An executable shell script standing in for the worker binary.
#[cfg(unix)]
fn worker_script(dir: &std::path::Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("worker.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn exiting_workers_fail_their_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let mut pool = WorkerPool::new(PoolConfig {
        worker_program: Some(worker_script(dir.path(), "read -r job\nexit 1")),
        ..config(2)
    });
    pool.start().unwrap();

    pool.submit((0..4).map(|id| job(id, FIVE)).collect()).unwrap();
    let results = pool.collect(4).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.values().all(|r| *r == JobOutcome::Failed));
    assert_eq!(pool.restarts(), 4);
    assert_eq!(pool.alive_workers(), 2);
}

#[cfg(unix)]
#[test]
fn pool_recovers_after_worker_exit() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("crashed");
    // The first process dies holding its job; every later one is the real worker.
    let body = format!(
        "if [ -e '{marker}' ]; then exec '{gc}' \"$@\"; fi\n\
         touch '{marker}'\nread -r job\nexit 1",
        marker = marker.display(),
        gc = env!("CARGO_BIN_EXE_gc"),
    );
    let mut pool = WorkerPool::new(PoolConfig {
        worker_program: Some(worker_script(dir.path(), &body)),
        ..config(1)
    });
    pool.start().unwrap();

    pool.submit(vec![job(0, FIVE)]).unwrap();
    assert_eq!(pool.collect(1).unwrap()[&0], JobOutcome::Failed);
    assert_eq!(pool.restarts(), 1);
    assert_eq!(pool.alive_workers(), 1);

    pool.submit((1..=3).map(|id| job(id, FIVE)).collect()).unwrap();
    let results = pool.collect(3).unwrap();
    for id in 1..=3 {
        assert_eq!(results[&id].output(), Some(&[5][..]), "job {id}");
    }
    assert_eq!(pool.restarts(), 1);
    assert_eq!(pool.alive_workers(), 1);
}

#[test]
fn soft_timeout_keeps_the_worker() {
    let mut pool = WorkerPool::new(PoolConfig {
        job_timeout_ms: Some(50),
        ..config(1)
    });
    pool.start().unwrap();
    pool.submit(vec![job(0, HANG), job(1, FIVE)]).unwrap();
    let results = pool.collect(2).unwrap();
    assert_eq!(results[&0], JobOutcome::Failed);
    assert_eq!(results[&1].output(), Some(&[5][..]));
    assert_eq!(pool.restarts(), 0);
}

#[test]
fn scoring_through_the_pool() {
    let mut pool = WorkerPool::new(config(2));
    pool.start().unwrap();
    let population = vec![
        Program::parse(FIVE).unwrap(),
        Program::parse(HANG).unwrap(),
        Program::parse(FIVE).unwrap(),
    ];
    let suite = vec![
        TestCase::new(vec![], vec![5]),
        TestCase::new(vec![3], vec![5]),
    ];
    let scores =
        score_population(&population, &suite, &FitnessConfig::default(), &mut pool).unwrap();
    assert_eq!(scores.alive_after, vec![2, 2]);
    assert!(scores.fitness[0] > 190.0);
    assert!(scores.fitness[2] > 190.0);
    assert!(scores.fitness[1] < 0.0);
    assert_eq!(pool.alive_workers(), 2);
}

#[test]
fn run_command_prints_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sum.gc");
    std::fs::write(
        &path,
        "SET v0 0\nSET v1 0\nINPUT v0\nINPUT v1\nADD v0 v1\nYIELD v0",
    )
    .unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_gc"))
        .arg("run")
        .arg(&path)
        .args(["-3", "4"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1");
}
