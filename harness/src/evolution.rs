//! The generational loop: seed, score, rank, publish, reproduce.

use gc_gen::{Program, ProgramGenerator, ProgramMutator};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::ArtifactStore;
use crate::error::{HarnessError, Result};
use crate::evaluate::Evaluator;
use crate::fitness::{score_population, FitnessConfig};
use crate::suite::TestCase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    /// Top fraction carried over unchanged.
    pub survive_top: f64,
    /// Fraction of the rest, sampled uniformly, carried over unchanged.
    pub survive_random: f64,
    /// Fraction replaced by freshly generated programs.
    pub new_random: f64,
    pub seed: Option<u64>,
    /// Stop after this many generations; run forever when unset.
    pub generations: Option<usize>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 2000,
            survive_top: 0.25,
            survive_random: 0.10,
            new_random: 0.25,
            seed: None,
            generations: None,
        }
    }
}

pub trait ProgressCallback {
    fn on_generation_start(&mut self, generation: usize);
    fn on_test_complete(&mut self, _generation: usize, _test: usize, _alive: usize) {}
    fn on_generation_complete(&mut self, generation: usize, best: &Program, best_fitness: f64);
}

pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_generation_start(&mut self, _generation: usize) {}
    fn on_generation_complete(&mut self, _generation: usize, _best: &Program, _best_fitness: f64) {}
}

/// Summary of one finished generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub index: usize,
    pub best: Program,
    pub best_fitness: f64,
    pub alive_after: Vec<usize>,
}

pub struct EvolutionEngine {
    config: EvolutionConfig,
    fitness: FitnessConfig,
    generator: ProgramGenerator,
    mutator: ProgramMutator,
    suite: Vec<TestCase>,
    rng: StdRng,
    population: Vec<Program>,
    generation: usize,
}

impl EvolutionEngine {
    pub fn new(
        config: EvolutionConfig,
        fitness: FitnessConfig,
        generator: ProgramGenerator,
        mutator: ProgramMutator,
        suite: Vec<TestCase>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            fitness,
            generator,
            mutator,
            suite,
            rng,
            population: Vec::new(),
            generation: 0,
        }
    }

    /// Start from the given programs instead of a generated population.
    pub fn with_population(mut self, population: Vec<Program>) -> Self {
        self.population = population;
        self
    }

    pub fn population(&self) -> &[Program] {
        &self.population
    }

    /// Index of the next generation to be scored.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn seed_population(&mut self) {
        self.population = (0..self.config.population_size)
            .map(|_| self.generator.generate(&mut self.rng))
            .collect();
        info!(size = self.population.len(), "seeded population");
    }

    /// Score, rank and publish the current population, then replace it with
    /// the next one.
    pub fn step(
        &mut self,
        evaluator: &mut dyn Evaluator,
        store: &mut dyn ArtifactStore,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Generation> {
        if self.population.is_empty() {
            self.seed_population();
        }
        let index = self.generation;
        progress.on_generation_start(index);

        let scores = score_population(&self.population, &self.suite, &self.fitness, evaluator)?;
        for (test, alive) in scores.alive_after.iter().enumerate() {
            progress.on_test_complete(index, test, *alive);
        }

        let ranked = rank(std::mem::take(&mut self.population), &scores.fitness);
        let Some((best, best_fitness)) = ranked.first().cloned() else {
            return Err(HarnessError::Configuration("population is empty".into()));
        };
        store.publish(index, &best.to_string())?;
        info!(generation = index, best_fitness, lines = best.len(), "generation complete");
        progress.on_generation_complete(index, &best, best_fitness);

        let ranked: Vec<Program> = ranked.into_iter().map(|(program, _)| program).collect();
        self.population = self.reproduce(&ranked);
        self.generation += 1;

        Ok(Generation {
            index,
            best,
            best_fitness,
            alive_after: scores.alive_after,
        })
    }

    /// Step until the configured generation limit, or forever.
    pub fn run(
        &mut self,
        evaluator: &mut dyn Evaluator,
        store: &mut dyn ArtifactStore,
        progress: &mut dyn ProgressCallback,
    ) -> Result<()> {
        while self.config.generations.map_or(true, |limit| self.generation < limit) {
            self.step(evaluator, store, progress)?;
        }
        Ok(())
    }

    /// Elites, then a random sample of the rest, then mutants of those two
    /// groups taken in turn, then brand-new programs.
    pub fn reproduce(&mut self, ranked: &[Program]) -> Vec<Program> {
        let n = self.config.population_size;
        let top = fraction(n, self.config.survive_top).min(ranked.len());
        let random = fraction(n, self.config.survive_random).min(ranked.len() - top);
        let fresh = fraction(n, self.config.new_random).min(n.saturating_sub(top + random));

        let mut next: Vec<Program> = ranked[..top].to_vec();
        next.extend(ranked[top..].choose_multiple(&mut self.rng, random).cloned());

        let parents = next.len();
        let mutants = n.saturating_sub(parents + fresh);
        for i in 0..mutants {
            let child = if parents == 0 {
                self.generator.generate(&mut self.rng)
            } else {
                let parent = next[i % parents].clone();
                self.mutator.mutated(&parent, &self.generator, &mut self.rng)
            };
            next.push(child);
        }
        for _ in 0..fresh {
            next.push(self.generator.generate(&mut self.rng));
        }
        next
    }
}

/// Sort descending by fitness. Equal scores keep their population order.
pub fn rank(population: Vec<Program>, fitness: &[f64]) -> Vec<(Program, f64)> {
    let mut ranked: Vec<(Program, f64)> = population
        .into_iter()
        .zip(fitness.iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

/// `ceil(n * share)`, ignoring float noise such as `2000 * 0.1`.
fn fraction(n: usize, share: f64) -> usize {
    (n as f64 * share - 1e-9).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::InlineEvaluator;
    use gc_gen::{GeneratorConfig, Interpreter, ProgramMutationConfig};
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        published: Vec<(usize, String)>,
    }

    impl ArtifactStore for MemoryStore {
        fn publish(&mut self, generation: usize, source: &str) -> Result<()> {
            self.published.push((generation, source.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_generation_start(&mut self, generation: usize) {
            self.events.push(format!("start {generation}"));
        }

        fn on_test_complete(&mut self, _generation: usize, test: usize, alive: usize) {
            self.events.push(format!("test {test} {alive}"));
        }

        fn on_generation_complete(&mut self, generation: usize, _best: &Program, _fitness: f64) {
            self.events.push(format!("done {generation}"));
        }
    }

    fn engine(population_size: usize, suite: Vec<TestCase>) -> EvolutionEngine {
        let config = EvolutionConfig {
            population_size,
            seed: Some(17),
            ..EvolutionConfig::default()
        };
        EvolutionEngine::new(
            config,
            FitnessConfig::default(),
            ProgramGenerator::new(GeneratorConfig::default()),
            ProgramMutator::new(ProgramMutationConfig::default()),
            suite,
        )
    }

    fn nops(count: usize) -> Program {
        Program::parse(&vec!["NOP"; count].join("\n")).unwrap()
    }

    #[test]
    fn rank_is_stable_and_descending() {
        let ranked = rank(vec![nops(1), nops(2), nops(3), nops(4)], &[1.0, 5.0, 1.0, -2.0]);
        let lens: Vec<usize> = ranked.iter().map(|(p, _)| p.len()).collect();
        assert_eq!(lens, vec![2, 1, 3, 4]);
    }

    #[test]
    fn reproduce_composes_next_population() {
        let mut engine = engine(20, vec![]);
        let ranked: Vec<Program> = (1..=20).map(nops).collect();
        let next = engine.reproduce(&ranked);
        assert_eq!(next.len(), 20);
        // 5 elites in rank order
        assert_eq!(&next[..5], &ranked[..5]);
        // 2 untouched survivors from the rest
        for survivor in &next[5..7] {
            assert!(ranked[5..].contains(survivor));
        }
    }

    #[test]
    fn same_seed_same_population() {
        let mut a = engine(50, vec![]);
        let mut b = engine(50, vec![]);
        a.seed_population();
        b.seed_population();
        assert_eq!(a.population(), b.population());
    }

    #[test]
    fn step_publishes_the_best_program() {
        let suite = vec![TestCase::new(vec![], vec![5])];
        let five = Program::parse("SET v0 5\nYIELD v0").unwrap();
        let mut engine =
            engine(4, suite).with_population(vec![nops(1), five.clone(), nops(2), nops(3)]);
        let mut store = MemoryStore::default();
        let mut progress = Recorder::default();
        let generation = engine
            .step(&mut InlineEvaluator::default(), &mut store, &mut progress)
            .unwrap();

        assert_eq!(generation.index, 0);
        assert_eq!(generation.best, five);
        assert_eq!(generation.alive_after, vec![1]);
        assert_eq!(store.published, vec![(0, five.to_string())]);
        assert_eq!(progress.events, vec!["start 0", "test 0 1", "done 0"]);
        assert_eq!(engine.generation(), 1);
        assert_eq!(engine.population().len(), 4);
        // the winner is carried over as the first elite
        assert_eq!(engine.population()[0], five);
    }

    #[test]
    fn run_stops_at_generation_limit() {
        let suite = vec![TestCase::new(vec![2], vec![4])];
        let mut engine = engine(30, suite);
        engine.config.generations = Some(3);
        let mut store = MemoryStore::default();
        let interpreter = Interpreter::new().with_timeout(Some(Duration::from_millis(50)));
        let mut eval = InlineEvaluator::new(interpreter);
        engine
            .run(&mut eval, &mut store, &mut SilentProgress)
            .unwrap();
        let generations: Vec<usize> = store.published.iter().map(|(g, _)| *g).collect();
        assert_eq!(generations, vec![0, 1, 2]);
        assert_eq!(engine.population().len(), 30);
    }
}
