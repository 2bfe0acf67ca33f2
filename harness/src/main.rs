use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gc_gen::{Interpreter, Program, ProgramGenerator, ProgramMutator};
use gc_harness::{
    load_suite, worker, AppConfig, DirectoryStore, EvolutionEngine, InlineEvaluator,
    ProgressCallback, WorkerPool,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gc", about = "Evolve small programs from input/output examples", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evolve programs against a test suite
    Evolve {
        /// Test suite, one `inputs = outputs` case per line
        #[arg(short, long, value_name = "FILE")]
        tests: PathBuf,
        /// Directory for the best program of each generation
        #[arg(short, long, value_name = "DIR", default_value = "outputs")]
        out: PathBuf,
        /// Path to .toml configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Number of worker processes
        #[arg(short, long)]
        workers: Option<usize>,
        /// Stop after this many generations
        #[arg(short, long)]
        generations: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Evaluate in this process instead of a worker pool
        #[arg(long)]
        inline: bool,
    },
    /// Run a program; reads stdin interactively when no inputs are given
    Run {
        file: PathBuf,
        #[arg(allow_negative_numbers = true)]
        inputs: Vec<i64>,
    },
    /// Serve evaluation jobs over stdin/stdout
    Worker {
        /// Per-job interpreter deadline
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_generation_start(&mut self, _generation: usize) {}

    fn on_test_complete(&mut self, generation: usize, test: usize, alive: usize) {
        tracing::debug!(generation, test, alive, "survivors");
    }

    fn on_generation_complete(&mut self, generation: usize, best: &Program, best_fitness: f64) {
        println!(
            "{} {}",
            format!("Best of generation {generation}:").green().bold(),
            format!("(fitness {best_fitness:.2})").dimmed()
        );
        println!("{best}");
    }
}

fn init_tracing(default: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Evolve {
            tests,
            out,
            config,
            workers,
            generations,
            seed,
            inline,
        } => {
            init_tracing("info");
            let mut config = match config {
                Some(path) => AppConfig::load(&path)?,
                None => AppConfig::default(),
            };
            if let Some(workers) = workers {
                config.pool.workers = workers;
            }
            if generations.is_some() {
                config.evolution.generations = generations;
            }
            if seed.is_some() {
                config.evolution.seed = seed;
            }
            config.validate()?;

            let suite = load_suite(&tests)
                .with_context(|| format!("reading test suite {}", tests.display()))?;
            if suite.is_empty() {
                bail!("test suite {} has no cases", tests.display());
            }
            info!(cases = suite.len(), "loaded test suite");

            let mut store = DirectoryStore::new(&out)?;
            let mut engine = EvolutionEngine::new(
                config.evolution.clone(),
                config.fitness,
                ProgramGenerator::new(config.generator),
                ProgramMutator::new(config.mutation),
                suite,
            );
            if inline {
                let interpreter = Interpreter::new()
                    .with_timeout(config.pool.job_timeout_ms.map(Duration::from_millis));
                let mut evaluator = InlineEvaluator::new(interpreter);
                engine.run(&mut evaluator, &mut store, &mut ConsoleProgress)?;
            } else {
                let mut pool = WorkerPool::new(config.pool.clone());
                pool.start()?;
                engine.run(&mut pool, &mut store, &mut ConsoleProgress)?;
            }
        }
        Commands::Run { file, inputs } => {
            init_tracing("warn");
            let source = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let program = Program::parse(&source)?;
            let interpreter = Interpreter::new();
            if inputs.is_empty() {
                let mut stdin = io::stdin().lock();
                let mut stdout = io::stdout().lock();
                interpreter.execute_interactive(&program, &mut stdin, &mut stdout)?;
            } else {
                let output = interpreter.execute(&program, &inputs)?;
                let line: Vec<String> = output.iter().map(ToString::to_string).collect();
                println!("{}", line.join(" "));
            }
        }
        Commands::Worker { timeout_ms } => {
            init_tracing("warn");
            let interpreter =
                Interpreter::new().with_timeout(timeout_ms.map(Duration::from_millis));
            worker::serve(io::stdin().lock(), io::stdout().lock(), &interpreter)?;
        }
    }
    Ok(())
}
