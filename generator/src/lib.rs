mod symbol;
mod tree;
mod parse;
mod emit;
mod environment;
mod interpreter;
mod generator;
mod mutator;

pub use crate::symbol::Var;
pub use crate::tree::{ArithmeticOp, Block, Command, ComparisonOp, Opcode, Program};
pub use crate::parse::ParseError;
pub use crate::emit::{Emittable, Emitter};
pub use crate::environment::Environment;
pub use crate::interpreter::{apply, Failure, Interpreter};
pub use crate::generator::{
    FixedLength, GeneratorConfig, InverseSquare, LengthDistribution, ProgramGenerator, Scope,
};
pub use crate::mutator::{
    Edit, MutationContext, Mutator, NestedEdit, ProgramMutationConfig, ProgramMutator,
};
