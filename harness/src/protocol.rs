//! Newline-delimited JSON spoken between the pool and its worker processes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One program run against one test input. `id` is the program's index in
/// the batch being scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: usize,
    pub program: String,
    pub input: Vec<i64>,
}

/// What a worker sends back. A failed job has neither output nor timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: usize,
    pub output: Option<Vec<i64>>,
    pub elapsed_us: Option<u64>,
}

impl JobResult {
    pub fn failed(id: usize) -> Self {
        Self {
            id,
            output: None,
            elapsed_us: None,
        }
    }

    pub fn completed(id: usize, output: Vec<i64>, elapsed: Duration) -> Self {
        Self {
            id,
            output: Some(output),
            elapsed_us: Some(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)),
        }
    }

    pub fn outcome(self) -> JobOutcome {
        match (self.output, self.elapsed_us) {
            (Some(output), Some(us)) => JobOutcome::Completed {
                output,
                elapsed: Duration::from_micros(us),
            },
            _ => JobOutcome::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { output: Vec<i64>, elapsed: Duration },
    /// Fault, timeout, crash or lost worker; never carries timing.
    Failed,
}

impl JobOutcome {
    pub fn output(&self) -> Option<&[i64]> {
        match self {
            JobOutcome::Completed { output, .. } => Some(output),
            JobOutcome::Failed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_is_null_on_the_wire() {
        let line = serde_json::to_string(&JobResult::failed(4)).unwrap();
        assert_eq!(line, r#"{"id":4,"output":null,"elapsed_us":null}"#);
    }

    #[test]
    fn completed_result_carries_timing() {
        let result: JobResult =
            serde_json::from_str(r#"{"id":1,"output":[5],"elapsed_us":250}"#).unwrap();
        assert_eq!(
            result.outcome(),
            JobOutcome::Completed {
                output: vec![5],
                elapsed: Duration::from_micros(250)
            }
        );
    }

    #[test]
    fn output_without_timing_is_a_failure() {
        let result = JobResult {
            id: 0,
            output: Some(vec![1]),
            elapsed_us: None,
        };
        assert_eq!(result.outcome(), JobOutcome::Failed);
    }
}
