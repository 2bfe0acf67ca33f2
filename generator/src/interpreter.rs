use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

use crate::environment::Environment;
use crate::parse::ParseError;
use crate::tree::{ArithmeticOp, Block, Command, Program};

/// Faults that abort a whole top-level execution. Structural faults (wrong
/// arity, unknown variables) are not failures: those lines are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("negative exponent")]
    NegativeExponent,

    #[error("malformed input: {0}")]
    MalformedInput(#[from] ParseError),

    #[error("execution exceeded its time budget")]
    Timeout,
}

/// Where `YIELD` writes and `INPUT` reads.
enum Channel<'a> {
    /// Outputs collect into the returned sequence, inputs come from the job.
    Collect,
    /// Outputs print one per line, inputs are read one per line.
    Console {
        input: &'a mut dyn BufRead,
        output: &'a mut dyn Write,
    },
}

/// Evaluates programs. An interpreter holds no state between executions:
/// every top-level call starts from an empty variable store.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    timeout: Option<Duration>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Fail with [`Failure::Timeout`] once an execution has run this long.
    /// Checked before each line and each loop iteration.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn execute(&self, program: &Program, inputs: &[i64]) -> Result<Vec<i64>, Failure> {
        let mut out = Vec::new();
        let mut exec = Execution::new(self.deadline(), Environment::new(inputs), Channel::Collect);
        exec.run(program.lines.iter(), &mut out)?;
        Ok(out)
    }

    /// Parse and execute in one step; parse faults become
    /// [`Failure::MalformedInput`].
    pub fn execute_source(&self, source: &str, inputs: &[i64]) -> Result<Vec<i64>, Failure> {
        let program = Program::parse(source)?;
        self.execute(&program, inputs)
    }

    /// Run with `YIELD` printing to `output` and `INPUT` reading lines from
    /// `input`. Lines that are not integers leave the variable unchanged.
    pub fn execute_interactive(
        &self,
        program: &Program,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Result<(), Failure> {
        let mut out = Vec::new();
        let channel = Channel::Console { input, output };
        let mut exec = Execution::new(self.deadline(), Environment::default(), channel);
        exec.run(program.lines.iter(), &mut out)
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }
}

struct Execution<'a> {
    deadline: Option<Instant>,
    env: Environment,
    channel: Channel<'a>,
}

impl<'a> Execution<'a> {
    fn new(deadline: Option<Instant>, env: Environment, channel: Channel<'a>) -> Self {
        Self { deadline, env, channel }
    }

    fn run<'p>(
        &mut self,
        lines: impl Iterator<Item = &'p Command>,
        out: &mut Vec<i64>,
    ) -> Result<(), Failure> {
        for line in lines {
            self.check_deadline()?;
            self.step(line, out)?;
        }
        Ok(())
    }

    fn run_block(&mut self, block: &Block, out: &mut Vec<i64>) -> Result<(), Failure> {
        self.run(block.lines(), out)
    }

    fn check_deadline(&self) -> Result<(), Failure> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Failure::Timeout),
            _ => Ok(()),
        }
    }

    fn step(&mut self, line: &Command, out: &mut Vec<i64>) -> Result<(), Failure> {
        match line {
            Command::Set { var, value } => self.env.set(*var, *value),
            Command::Nop | Command::Unrecognized(_) => {}
            Command::Yield(var) => {
                if let Some(value) = self.env.get(*var) {
                    self.emit(value, out);
                }
            }
            Command::Input(var) => {
                if self.env.contains(*var) {
                    if let Some(value) = self.read_input() {
                        self.env.set(*var, value);
                    }
                }
            }
            Command::Copy { to, from } => {
                if let (true, Some(value)) = (self.env.contains(*to), self.env.get(*from)) {
                    self.env.set(*to, value);
                }
            }
            Command::Arithmetic { op, lhs, rhs, dest } => {
                let target = dest.unwrap_or(*lhs);
                if let (Some(a), Some(b), true) =
                    (self.env.get(*lhs), self.env.get(*rhs), self.env.contains(target))
                {
                    let result = apply(*op, a, b)?;
                    self.env.set(target, result);
                }
            }
            Command::If { lhs, op, rhs, then, otherwise } => {
                let (Some(a), Some(b)) = (self.env.get(*lhs), self.env.get(*rhs)) else {
                    return Ok(());
                };
                if op.holds(a, b) {
                    self.run_block(then, out)?;
                } else if let Some(otherwise) = otherwise {
                    self.run_block(otherwise, out)?;
                }
            }
            Command::Loop { count, index, body } => {
                let (Some(n), Some(saved)) = (self.env.get(*count), self.env.get(*index)) else {
                    return Ok(());
                };
                for i in 1..=n {
                    self.check_deadline()?;
                    self.env.set(*index, i);
                    self.run_block(body, out)?;
                }
                self.env.set(*index, saved);
            }
            Command::Multi(first, second) => {
                self.run_block(first, out)?;
                self.run_block(second, out)?;
            }
        }
        Ok(())
    }

    fn emit(&mut self, value: i64, out: &mut Vec<i64>) {
        match &mut self.channel {
            Channel::Collect => out.push(value),
            Channel::Console { output, .. } => {
                if let Err(e) = writeln!(output, "{value}") {
                    warn!(error = %e, "failed to write program output");
                }
            }
        }
    }

    fn read_input(&mut self) -> Option<i64> {
        match &mut self.channel {
            Channel::Collect => self.env.next_input(),
            Channel::Console { input, .. } => {
                let mut line = String::new();
                input.read_line(&mut line).ok()?;
                line.trim().parse().ok()
            }
        }
    }
}

pub fn apply(op: ArithmeticOp, a: i64, b: i64) -> Result<i64, Failure> {
    match op {
        ArithmeticOp::Add => a.checked_add(b).ok_or(Failure::Overflow),
        ArithmeticOp::Sub => a.checked_sub(b).ok_or(Failure::Overflow),
        ArithmeticOp::Mul => a.checked_mul(b).ok_or(Failure::Overflow),
        ArithmeticOp::Div => floor_div(a, b),
        ArithmeticOp::Mod => floor_mod(a, b),
        ArithmeticOp::Pow => pow(a, b),
    }
}

/// Division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Result<i64, Failure> {
    if b == 0 {
        return Err(Failure::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or(Failure::Overflow)?;
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Remainder taking the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Result<i64, Failure> {
    if b == 0 {
        return Err(Failure::DivisionByZero);
    }
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn pow(base: i64, exp: i64) -> Result<i64, Failure> {
    if exp < 0 {
        return Err(Failure::NegativeExponent);
    }
    match u32::try_from(exp) {
        Ok(exp) => base.checked_pow(exp).ok_or(Failure::Overflow),
        Err(_) => match base {
            0 | 1 => Ok(base),
            -1 => Ok(if exp % 2 == 0 { 1 } else { -1 }),
            _ => Err(Failure::Overflow),
        },
    }
}
