use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::symbol::Var;
use crate::tree::{Block, Command, ComparisonOp, Opcode, Program};

/// How many lines a freshly generated program gets.
pub trait LengthDistribution: Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore) -> usize;
}

/// `floor(scale / sqrt(u))` for `u` uniform in (0, 1], capped at `max`.
/// Mostly short programs with the occasional long outlier.
#[derive(Debug, Clone, Copy)]
pub struct InverseSquare {
    pub scale: f64,
    pub max: usize,
}

impl LengthDistribution for InverseSquare {
    fn sample(&self, rng: &mut dyn RngCore) -> usize {
        let u = 1.0 - rng.random::<f64>();
        let length = (self.scale / u.sqrt()).floor();
        if length >= self.max as f64 {
            self.max
        } else {
            length as usize
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedLength(pub usize);

impl LengthDistribution for FixedLength {
    fn sample(&self, _rng: &mut dyn RngCore) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub length_scale: f64,
    pub max_lines: usize,
    pub literal_min: i64,
    pub literal_max: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            length_scale: 3.0,
            max_lines: 64,
            literal_min: 1,
            literal_max: 9,
        }
    }
}

/// Variables a new line may reference, plus the name the next declaration
/// will take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    vars: Vec<Var>,
    next: Var,
}

impl Scope {
    pub fn new(vars: Vec<Var>, next: Var) -> Self {
        Self { vars, next }
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn declare(&mut self) -> Var {
        let var = self.next;
        self.vars.push(var);
        self.next = var.next();
        var
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Declare,
    Bare,
    Vars(usize),
    Branch { arms: usize },
    Loop,
    Blocks,
}

/// One candidate line form, available once `requires` variables are in scope.
#[derive(Debug, Clone, Copy)]
struct Template {
    opcode: Opcode,
    requires: usize,
    shape: Shape,
}

const fn template(opcode: Opcode, requires: usize, shape: Shape) -> Template {
    Template { opcode, requires, shape }
}

const TEMPLATES: &[Template] = &[
    template(Opcode::Set, 0, Shape::Declare),
    template(Opcode::Nop, 0, Shape::Bare),
    template(Opcode::Yield, 1, Shape::Vars(1)),
    template(Opcode::Input, 1, Shape::Vars(1)),
    template(Opcode::Multi, 1, Shape::Blocks),
    template(Opcode::Copy, 2, Shape::Vars(2)),
    template(Opcode::If, 2, Shape::Branch { arms: 1 }),
    template(Opcode::If, 2, Shape::Branch { arms: 2 }),
    template(Opcode::Loop, 2, Shape::Loop),
    template(Opcode::Add, 2, Shape::Vars(2)),
    template(Opcode::Sub, 2, Shape::Vars(2)),
    template(Opcode::Mul, 2, Shape::Vars(2)),
    template(Opcode::Div, 2, Shape::Vars(2)),
    template(Opcode::Mod, 2, Shape::Vars(2)),
    template(Opcode::Pow, 2, Shape::Vars(2)),
    template(Opcode::Add, 3, Shape::Vars(3)),
    template(Opcode::Sub, 3, Shape::Vars(3)),
    template(Opcode::Mul, 3, Shape::Vars(3)),
    template(Opcode::Div, 3, Shape::Vars(3)),
    template(Opcode::Mod, 3, Shape::Vars(3)),
    template(Opcode::Pow, 3, Shape::Vars(3)),
];

/// Constrained-random synthesis of programs whose every variable reference
/// is declared earlier in execution order.
pub struct ProgramGenerator {
    length: Box<dyn LengthDistribution>,
    config: GeneratorConfig,
}

impl ProgramGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let length = InverseSquare {
            scale: config.length_scale,
            max: config.max_lines,
        };
        Self::with_length(config, Box::new(length))
    }

    pub fn with_length(config: GeneratorConfig, length: Box<dyn LengthDistribution>) -> Self {
        Self { length, config }
    }

    /// A program whose length is drawn from the length distribution.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> Program {
        let lines = self.length.sample(rng);
        self.generate_program(lines, rng)
    }

    pub fn generate_program<R: Rng>(&self, line_count: usize, rng: &mut R) -> Program {
        let mut scope = Scope::default();
        let lines = (0..line_count)
            .map(|_| self.generate_line(&mut scope, 0, rng))
            .collect();
        Program::new(lines)
    }

    /// One line referencing only `scope`. At depth 0 a declaration may be
    /// chosen, which adds its variable to `scope`. Nested lines never declare.
    pub fn generate_line<R: Rng>(&self, scope: &mut Scope, depth: usize, rng: &mut R) -> Command {
        let candidates: Vec<&Template> = TEMPLATES
            .iter()
            .filter(|t| t.requires <= scope.len())
            .filter(|t| depth == 0 || t.opcode != Opcode::Set)
            .collect();
        let Some(template) = candidates.choose(rng) else {
            return Command::Nop;
        };

        match template.shape {
            Shape::Declare => {
                let var = scope.declare();
                let value = rng.random_range(self.config.literal_min..=self.config.literal_max);
                Command::Set { var, value }
            }
            Shape::Bare => Command::Nop,
            Shape::Vars(n) => {
                let vars: Vec<Var> = (0..n).map(|_| self.pick_var(scope, rng)).collect();
                assemble(template.opcode, &vars)
            }
            Shape::Branch { arms } => {
                let lhs = self.pick_var(scope, rng);
                let op = ComparisonOp::ALL.choose(rng).copied().unwrap_or(ComparisonOp::Equal);
                let rhs = self.pick_var(scope, rng);
                let then = self.generate_block(scope, depth, rng);
                let otherwise = (arms == 2).then(|| self.generate_block(scope, depth, rng));
                Command::If { lhs, op, rhs, then, otherwise }
            }
            Shape::Loop => {
                let count = self.pick_var(scope, rng);
                let index = self.pick_var(scope, rng);
                let body = self.generate_block(scope, depth, rng);
                Command::Loop { count, index, body }
            }
            Shape::Blocks => {
                let first = self.generate_block(scope, depth, rng);
                let second = self.generate_block(scope, depth, rng);
                Command::Multi(first, second)
            }
        }
    }

    pub fn generate_block<R: Rng>(&self, scope: &mut Scope, depth: usize, rng: &mut R) -> Block {
        Block::line(self.generate_line(scope, depth + 1, rng))
    }

    fn pick_var<R: Rng>(&self, scope: &Scope, rng: &mut R) -> Var {
        scope.vars().choose(rng).copied().unwrap_or_default()
    }
}

fn assemble(opcode: Opcode, vars: &[Var]) -> Command {
    match (opcode, vars) {
        (Opcode::Yield, &[var]) => Command::Yield(var),
        (Opcode::Input, &[var]) => Command::Input(var),
        (Opcode::Copy, &[to, from]) => Command::Copy { to, from },
        (op, &[lhs, rhs]) => arithmetic(op, lhs, rhs, None),
        (op, &[lhs, rhs, dest]) => arithmetic(op, lhs, rhs, Some(dest)),
        _ => Command::Nop,
    }
}

fn arithmetic(opcode: Opcode, lhs: Var, rhs: Var, dest: Option<Var>) -> Command {
    match opcode.arithmetic() {
        Some(op) => Command::Arithmetic { op, lhs, rhs, dest },
        None => Command::Nop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generator(lines: usize) -> ProgramGenerator {
        ProgramGenerator::with_length(GeneratorConfig::default(), Box::new(FixedLength(lines)))
    }

    /// Every reference on a line is to a variable declared on an earlier line.
    fn references_are_declared(program: &Program) -> bool {
        let mut declared = Vec::new();
        for line in &program.lines {
            let mut ok = true;
            let own = line.declarations();
            line.visit_vars(&mut |v| ok &= declared.contains(&v) || own.contains(&v));
            if !ok {
                return false;
            }
            declared.extend(own);
        }
        true
    }

    fn nested_declarations(program: &Program) -> usize {
        program
            .lines
            .iter()
            .flat_map(|l| l.blocks())
            .flat_map(|b| b.lines())
            .flat_map(|l| l.declarations())
            .count()
    }

    #[test]
    fn fixed_distribution_sets_length() {
        let mut rng = StdRng::seed_from_u64(7);
        let g = generator(12);
        for _ in 0..20 {
            assert_eq!(g.generate(&mut rng).len(), 12);
        }
    }

    #[test]
    fn inverse_square_favours_short_programs() {
        let mut rng = StdRng::seed_from_u64(11);
        let dist = InverseSquare { scale: 3.0, max: 64 };
        let samples: Vec<usize> = (0..2000).map(|_| dist.sample(&mut rng)).collect();
        assert!(samples.iter().all(|&n| (3..=64).contains(&n)));
        // P(n <= 9) = P(u >= 1/9) = 8/9
        let short = samples.iter().filter(|&&n| n <= 9).count();
        assert!(short > 1650, "{short}");
    }

    #[test]
    fn empty_scope_only_declares_or_idles() {
        let mut rng = StdRng::seed_from_u64(3);
        let g = generator(1);
        for _ in 0..200 {
            let line = g.generate_line(&mut Scope::default(), 0, &mut rng);
            assert!(matches!(line, Command::Set { .. } | Command::Nop), "{line}");
            let nested = g.generate_line(&mut Scope::default(), 1, &mut rng);
            assert_eq!(nested, Command::Nop);
        }
    }

    #[test]
    fn declarations_are_sequential_with_small_literals() {
        let mut rng = StdRng::seed_from_u64(5);
        let program = generator(40).generate(&mut rng);
        let mut expected = 0;
        for line in &program.lines {
            if let Command::Set { var, value } = line {
                assert_eq!(var.index(), expected);
                assert!((1..=9).contains(value));
                expected += 1;
            }
        }
    }

    #[test]
    fn new_declaration_takes_next_free_name() {
        let mut rng = StdRng::seed_from_u64(9);
        let g = generator(1);
        let mut seen_set = false;
        for _ in 0..200 {
            let mut scope = Scope::new(vec![Var::new(0), Var::new(3)], Var::new(7));
            if let Command::Set { var, .. } = g.generate_line(&mut scope, 0, &mut rng) {
                assert_eq!(var, Var::new(7));
                assert_eq!(scope.vars(), &[Var::new(0), Var::new(3), Var::new(7)]);
                seen_set = true;
            }
        }
        assert!(seen_set);
    }

    #[test]
    fn generated_programs_are_well_scoped() {
        let mut rng = StdRng::seed_from_u64(1);
        let g = ProgramGenerator::new(GeneratorConfig::default());
        for _ in 0..300 {
            let program = g.generate(&mut rng);
            assert!(references_are_declared(&program), "{program}");
            assert_eq!(nested_declarations(&program), 0, "{program}");
        }
    }

    proptest! {
        #[test]
        fn generated_text_round_trips(seed in any::<u64>(), lines in 0usize..30) {
            let mut rng = StdRng::seed_from_u64(seed);
            let program = generator(lines).generate(&mut rng);
            let text = program.to_string();
            let reparsed = Program::parse(&text).unwrap();
            prop_assert_eq!(&reparsed, &program);
            prop_assert_eq!(reparsed.to_string(), text);
        }

        #[test]
        fn execution_is_deterministic(
            seed in any::<u64>(),
            input in proptest::collection::vec(-20i64..20, 0..4),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let program = generator(8).generate(&mut rng);
            let interpreter =
                Interpreter::new().with_timeout(Some(std::time::Duration::from_millis(200)));
            let first = interpreter.execute(&program, &input);
            let second = interpreter.execute(&program, &input);
            let timed_out = Err(crate::interpreter::Failure::Timeout);
            if first != timed_out && second != timed_out {
                prop_assert_eq!(first, second);
            }
        }
    }
}
