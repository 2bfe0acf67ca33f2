use std::collections::HashMap;

use gc_gen::Interpreter;

use crate::error::{HarnessError, Result};
use crate::protocol::{Job, JobOutcome, JobResult};
use crate::worker;

/// Somewhere jobs can be sent and results drained from. `collect` blocks
/// until exactly `expected` results have arrived and keys them by job id.
pub trait Evaluator {
    fn submit(&mut self, jobs: Vec<Job>) -> Result<()>;
    fn collect(&mut self, expected: usize) -> Result<HashMap<usize, JobOutcome>>;
}

/// Runs jobs on the calling thread with the same per-job logic a worker
/// process uses. No hard deadline: only the interpreter's own timeout
/// bounds a job.
#[derive(Debug, Default)]
pub struct InlineEvaluator {
    interpreter: Interpreter,
    done: Vec<JobResult>,
}

impl InlineEvaluator {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            done: Vec::new(),
        }
    }
}

impl Evaluator for InlineEvaluator {
    fn submit(&mut self, jobs: Vec<Job>) -> Result<()> {
        for job in jobs {
            self.done.push(worker::evaluate(&job, &self.interpreter));
        }
        Ok(())
    }

    fn collect(&mut self, expected: usize) -> Result<HashMap<usize, JobOutcome>> {
        if self.done.len() < expected {
            return Err(HarnessError::Disconnected);
        }
        Ok(self
            .done
            .drain(..expected)
            .map(|r| (r.id, r.outcome()))
            .collect())
    }
}
