//! The job loop run inside each worker process.

use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use gc_gen::Interpreter;
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{Job, JobResult};

/// Serve jobs until `input` closes. Every decodable job gets exactly one
/// result line, flushed immediately so the supervisor never waits on a
/// buffer.
pub fn serve<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    interpreter: &Interpreter,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let job: Job = match serde_json::from_str(&line) {
            Ok(job) => job,
            Err(err) => {
                warn!(%err, "skipping undecodable job");
                continue;
            }
        };
        let result = evaluate(&job, interpreter);
        serde_json::to_writer(&mut output, &result)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    Ok(())
}

/// Run one job, timing the interpreter call. Faults and panics both come
/// back as a failed result.
pub fn evaluate(job: &Job, interpreter: &Interpreter) -> JobResult {
    let start = Instant::now();
    let run = panic::catch_unwind(AssertUnwindSafe(|| {
        interpreter.execute_source(&job.program, &job.input)
    }));
    let elapsed = start.elapsed();
    match run {
        Ok(Ok(output)) => JobResult::completed(job.id, output, elapsed),
        Ok(Err(failure)) => {
            debug!(id = job.id, %failure, "job failed");
            JobResult::failed(job.id)
        }
        Err(_) => {
            warn!(id = job.id, "interpreter panicked");
            JobResult::failed(job.id)
        }
    }
}
