//! Fitness scoring. Every program starts at minus its structural penalty,
//! then the suite is run one test case at a time over the programs that
//! have passed every case so far.

use gc_gen::{Opcode, Program};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::evaluate::Evaluator;
use crate::protocol::{Job, JobOutcome};
use crate::suite::TestCase;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Added for each test whose output matches exactly.
    pub reward: f64,
    /// Subtracted per second of measured run time on every completed job.
    pub runtime_penalty: f64,
    /// Programs longer than this are charged per line only, at a higher rate.
    pub long_program: usize,
    /// Charged per unit of distance from exactly one `YIELD` and one `INPUT`.
    pub io_penalty: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            reward: 100.0,
            runtime_penalty: 100.0,
            long_program: 10,
            io_penalty: 4.0,
        }
    }
}

/// Size and shape penalty, independent of any test.
pub fn structural_penalty(program: &Program, config: &FitnessConfig) -> f64 {
    let lines = program.len();
    let size = if lines > config.long_program {
        3 * lines
    } else {
        lines + program.char_len() / 5
    };
    let yields = program.count_opcode(Opcode::Yield) as f64;
    let inputs = program.count_opcode(Opcode::Input) as f64;
    size as f64 + config.io_penalty * ((yields - 1.0).abs() + (inputs - 1.0).abs())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    /// One total per program, in population order.
    pub fitness: Vec<f64>,
    /// How many programs were still alive after each test case ran.
    pub alive_after: Vec<usize>,
}

/// Score a population against `suite`. A program that fails or mismatches
/// a case keeps what it has accumulated but is not run on later cases.
pub fn score_population(
    population: &[Program],
    suite: &[TestCase],
    config: &FitnessConfig,
    evaluator: &mut dyn Evaluator,
) -> Result<Scores> {
    let sources: Vec<String> = population.iter().map(ToString::to_string).collect();
    let mut fitness: Vec<f64> = population
        .iter()
        .map(|p| -structural_penalty(p, config))
        .collect();
    let mut alive: Vec<usize> = (0..population.len()).collect();
    let mut alive_after = Vec::with_capacity(suite.len());

    for (index, case) in suite.iter().enumerate() {
        if alive.is_empty() {
            alive_after.push(0);
            continue;
        }
        let jobs = alive
            .iter()
            .map(|&id| Job {
                id,
                program: sources[id].clone(),
                input: case.input.clone(),
            })
            .collect();
        evaluator.submit(jobs)?;
        let outcomes = evaluator.collect(alive.len())?;

        alive.retain(|&id| match outcomes.get(&id) {
            Some(JobOutcome::Completed { output, elapsed }) => {
                fitness[id] -= config.runtime_penalty * elapsed.as_secs_f64();
                if *output == case.expected {
                    fitness[id] += config.reward;
                    true
                } else {
                    false
                }
            }
            Some(JobOutcome::Failed) | None => false,
        });
        debug!(test = index, alive = alive.len(), "test case scored");
        alive_after.push(alive.len());
    }

    Ok(Scores { fitness, alive_after })
}
