//! A fixed-size pool of `gc worker` processes, one supervisor thread per
//! slot. A worker that stops answering within the liveness deadline is
//! killed and replaced; the job it was holding comes back as a failure.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use subprocess::{Popen, PopenConfig, Redirection};
use tracing::{debug, error, info, warn};

use crate::error::{HarnessError, Result};
use crate::evaluate::Evaluator;
use crate::protocol::{Job, JobOutcome, JobResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    /// Executable that understands the `worker` subcommand. Defaults to the
    /// running binary.
    pub worker_program: Option<PathBuf>,
    /// Soft deadline handed to each worker's interpreter.
    pub job_timeout_ms: Option<u64>,
    /// Hard deadline after which a silent worker is killed.
    pub liveness_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            worker_program: None,
            job_timeout_ms: Some(100),
            liveness_ms: 1000,
        }
    }
}

impl PoolConfig {
    fn command(&self) -> Result<Vec<OsString>> {
        let program = match &self.worker_program {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        let mut command = vec![program.into_os_string(), OsString::from("worker")];
        if let Some(ms) = self.job_timeout_ms {
            command.push(OsString::from("--timeout-ms"));
            command.push(OsString::from(ms.to_string()));
        }
        Ok(command)
    }
}

enum Reply {
    Result(JobResult),
    Unresponsive,
    Exited,
}

/// One live worker process and the thread draining its stdout.
struct Worker {
    process: Popen,
    stdin: File,
    lines: mpsc::Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(command: &[OsString]) -> Result<Self> {
        let mut process = Popen::create(
            command,
            PopenConfig {
                stdin: Redirection::Pipe,
                stdout: Redirection::Pipe,
                ..Default::default()
            },
        )?;
        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("worker stdin is not piped"))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("worker stdout is not piped"))?;

        let (tx, lines) = mpsc::channel();
        let reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        debug!(pid = ?process.pid(), "spawned worker");
        Ok(Self {
            process,
            stdin,
            lines,
            reader: Some(reader),
        })
    }

    fn dispatch(&mut self, job: &Job, liveness: Duration) -> Reply {
        let mut line = match serde_json::to_string(job) {
            Ok(line) => line,
            Err(err) => {
                error!(%err, id = job.id, "could not encode job");
                return Reply::Result(JobResult::failed(job.id));
            }
        };
        line.push('\n');
        if self
            .stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.flush())
            .is_err()
        {
            return Reply::Exited;
        }

        let deadline = Instant::now() + liveness;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(reply) => match serde_json::from_str::<JobResult>(&reply) {
                    Ok(result) if result.id == job.id => return Reply::Result(result),
                    Ok(result) => {
                        warn!(expected = job.id, got = result.id, "stale reply from worker")
                    }
                    Err(err) => warn!(%err, "undecodable reply from worker"),
                },
                Err(RecvTimeoutError::Timeout) => return Reply::Unresponsive,
                Err(RecvTimeoutError::Disconnected) => return Reply::Exited,
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Owns one pool slot: pulls jobs off the shared queue, forwards them to its
/// worker and pushes results onto the shared result queue.
struct Supervisor {
    slot: usize,
    worker: Option<Worker>,
    command: Vec<OsString>,
    liveness: Duration,
    tasks: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    alive: Arc<AtomicUsize>,
    restarts: Arc<AtomicUsize>,
}

impl Supervisor {
    fn run(mut self) {
        loop {
            let job = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv();
            let Ok(job) = job else { break };

            if self.worker.is_none() {
                self.respawn();
            }
            let reply = match self.worker.as_mut() {
                Some(worker) => worker.dispatch(&job, self.liveness),
                None => Reply::Exited,
            };
            let result = match reply {
                Reply::Result(result) => result,
                Reply::Unresponsive => {
                    warn!(
                        slot = self.slot,
                        id = job.id,
                        "worker missed liveness deadline, replacing"
                    );
                    self.replace();
                    JobResult::failed(job.id)
                }
                Reply::Exited => {
                    warn!(slot = self.slot, id = job.id, "worker exited, replacing");
                    self.replace();
                    JobResult::failed(job.id)
                }
            };
            if self.results.send(result).is_err() {
                break;
            }
        }
        debug!(slot = self.slot, "supervisor stopping");
    }

    fn replace(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker);
            self.alive.fetch_sub(1, Ordering::SeqCst);
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.respawn();
    }

    fn respawn(&mut self) {
        match Worker::spawn(&self.command) {
            Ok(worker) => {
                self.worker = Some(worker);
                self.alive.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => error!(slot = self.slot, %err, "could not respawn worker"),
        }
    }
}

pub struct WorkerPool {
    config: PoolConfig,
    tasks: Option<mpsc::Sender<Job>>,
    results: Option<mpsc::Receiver<JobResult>>,
    supervisors: Vec<JoinHandle<()>>,
    alive: Arc<AtomicUsize>,
    restarts: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// An idle pool; nothing is spawned until [`WorkerPool::start`].
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            tasks: None,
            results: None,
            supervisors: Vec::new(),
            alive: Arc::new(AtomicUsize::new(0)),
            restarts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_started(&self) -> bool {
        self.tasks.is_some()
    }

    /// Spawn every worker. Starting twice is caller misuse.
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Err(HarnessError::AlreadyInitialized);
        }
        if self.config.workers == 0 {
            return Err(HarnessError::Configuration("pool needs at least one worker".into()));
        }
        let command = self.config.command()?;
        let liveness = Duration::from_millis(self.config.liveness_ms);
        let (task_tx, task_rx) = mpsc::channel::<Job>();
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, result_rx) = mpsc::channel();

        // Every process comes up before any supervisor runs, so a failed
        // spawn leaves nothing behind.
        let workers = (0..self.config.workers)
            .map(|_| Worker::spawn(&command))
            .collect::<Result<Vec<_>>>()?;
        self.alive.store(workers.len(), Ordering::SeqCst);

        let mut supervisors = Vec::with_capacity(workers.len());
        for (slot, worker) in workers.into_iter().enumerate() {
            let supervisor = Supervisor {
                slot,
                worker: Some(worker),
                command: command.clone(),
                liveness,
                tasks: Arc::clone(&task_rx),
                results: result_tx.clone(),
                alive: Arc::clone(&self.alive),
                restarts: Arc::clone(&self.restarts),
            };
            let spawned = thread::Builder::new()
                .name(format!("gc-supervisor-{slot}"))
                .spawn(move || supervisor.run());
            match spawned {
                Ok(handle) => supervisors.push(handle),
                Err(err) => {
                    drop(task_tx);
                    for handle in supervisors {
                        let _ = handle.join();
                    }
                    self.alive.store(0, Ordering::SeqCst);
                    return Err(err.into());
                }
            }
        }

        self.supervisors = supervisors;
        self.tasks = Some(task_tx);
        self.results = Some(result_rx);
        info!(workers = self.config.workers, "worker pool started");
        Ok(())
    }

    pub fn alive_workers(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    /// Workers replaced since the pool started.
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl Evaluator for WorkerPool {
    fn submit(&mut self, jobs: Vec<Job>) -> Result<()> {
        let tasks = self.tasks.as_ref().ok_or(HarnessError::NotStarted)?;
        for job in jobs {
            tasks.send(job).map_err(|_| HarnessError::Disconnected)?;
        }
        Ok(())
    }

    fn collect(&mut self, expected: usize) -> Result<HashMap<usize, JobOutcome>> {
        let results = self.results.as_ref().ok_or(HarnessError::NotStarted)?;
        let mut outcomes = HashMap::with_capacity(expected);
        for _ in 0..expected {
            let result = results.recv().map_err(|_| HarnessError::Disconnected)?;
            outcomes.insert(result.id, result.outcome());
        }
        Ok(outcomes)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue stops every supervisor, which kills its worker.
        self.tasks.take();
        for handle in self.supervisors.drain(..) {
            let _ = handle.join();
        }
    }
}
