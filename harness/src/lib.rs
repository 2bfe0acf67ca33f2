pub mod artifact;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod evolution;
pub mod fitness;
pub mod pool;
pub mod protocol;
pub mod suite;
pub mod worker;

pub use crate::artifact::{ArtifactStore, DirectoryStore};
pub use crate::config::{AppConfig, ConfigSection};
pub use crate::error::{HarnessError, Result};
pub use crate::evaluate::{Evaluator, InlineEvaluator};
pub use crate::evolution::{
    EvolutionConfig, EvolutionEngine, Generation, ProgressCallback, SilentProgress,
};
pub use crate::fitness::{score_population, structural_penalty, FitnessConfig, Scores};
pub use crate::pool::{PoolConfig, WorkerPool};
pub use crate::protocol::{Job, JobOutcome, JobResult};
pub use crate::suite::{load_suite, parse_suite, TestCase};
