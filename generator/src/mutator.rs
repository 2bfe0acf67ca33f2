use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::generator::{ProgramGenerator, Scope};
use crate::tree::{Block, Command, Program};

/// A Mutator is like a Generator except it operates in-place
pub trait Mutator<T, C> {
    fn mutate(&mut self, obj: &mut T, context: C);
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramMutationConfig {
    /// Chance that each round of editing happens at all.
    pub p_mutate: f64,
    /// Chance of another round after an edit.
    pub p_again: f64,
    pub insert_weight: u32,
    pub delete_weight: u32,
    pub modify_weight: u32,
    pub replace_weight: u32,
    pub replace_block_weight: u32,
    pub splice_weight: u32,
}

impl Default for ProgramMutationConfig {
    fn default() -> Self {
        Self {
            p_mutate: 0.7,
            p_again: 0.6,
            insert_weight: 3,
            delete_weight: 1,
            modify_weight: 2,
            replace_weight: 1,
            replace_block_weight: 1,
            splice_weight: 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Edit {
    Insert,
    Delete,
    Modify,
}

/// How a line with sub-blocks is modified.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NestedEdit {
    /// A fresh line in its place.
    Replace,
    /// One sub-block swapped for a fresh single line.
    ReplaceBlock,
    /// The wrapper dropped and one sub-block's line promoted in its place.
    Splice,
}

pub struct MutationContext<'a, R> {
    pub generator: &'a ProgramGenerator,
    pub rng: &'a mut R,
}

/// Structure-aware edits over a program's lines. New material always comes
/// from the generator, scoped to what is declared before the edit point, and
/// a declaration still referenced elsewhere is never deleted or replaced.
pub struct ProgramMutator {
    config: ProgramMutationConfig,
}

impl ProgramMutator {
    pub fn new(config: ProgramMutationConfig) -> Self {
        Self { config }
    }

    /// A mutated copy of `program`; may be identical.
    pub fn mutated<R: Rng>(
        &mut self,
        program: &Program,
        generator: &ProgramGenerator,
        rng: &mut R,
    ) -> Program {
        let mut child = program.clone();
        self.mutate(&mut child, MutationContext { generator, rng });
        child
    }

    /// Apply exactly one edit and report which one it was.
    pub fn edit<R: Rng>(
        &self,
        program: &mut Program,
        generator: &ProgramGenerator,
        rng: &mut R,
    ) -> Edit {
        let len = program.len();
        let mut edit = self.choose_edit(len, rng);
        let index = match edit {
            Edit::Insert => rng.random_range(0..=len),
            Edit::Delete | Edit::Modify => rng.random_range(0..len),
        };
        if edit != Edit::Insert && is_protected(program, index) {
            edit = Edit::Insert;
        }

        let mut scope = Scope::new(program.declared_before(index), program.next_free_var());
        match edit {
            Edit::Insert => {
                let line = generator.generate_line(&mut scope, 0, rng);
                program.lines.insert(index, line);
            }
            Edit::Delete => {
                program.lines.remove(index);
            }
            Edit::Modify => {
                let old = std::mem::replace(&mut program.lines[index], Command::Nop);
                program.lines[index] = self.modify(old, &mut scope, generator, rng);
            }
        }
        trace!(?edit, index, lines = program.len(), "edited program");
        edit
    }

    fn choose_edit<R: Rng>(&self, len: usize, rng: &mut R) -> Edit {
        if len == 0 {
            return Edit::Insert;
        }
        let delete_weight = if len > 1 { self.config.delete_weight } else { 0 };
        let weighted = [
            (Edit::Insert, self.config.insert_weight),
            (Edit::Delete, delete_weight),
            (Edit::Modify, self.config.modify_weight),
        ];
        weighted
            .choose_weighted(rng, |(_, w)| *w)
            .map(|(edit, _)| *edit)
            .unwrap_or(Edit::Insert)
    }

    fn modify<R: Rng>(
        &self,
        old: Command,
        scope: &mut Scope,
        generator: &ProgramGenerator,
        rng: &mut R,
    ) -> Command {
        if !old.has_blocks() {
            return generator.generate_line(scope, 0, rng);
        }
        let weighted = [
            (NestedEdit::Replace, self.config.replace_weight),
            (NestedEdit::ReplaceBlock, self.config.replace_block_weight),
            (NestedEdit::Splice, self.config.splice_weight),
        ];
        let nested = weighted
            .choose_weighted(rng, |(_, w)| *w)
            .map(|(edit, _)| *edit)
            .unwrap_or(NestedEdit::Replace);
        trace!(?nested, "modifying nested line");

        match nested {
            NestedEdit::Replace => generator.generate_line(scope, 0, rng),
            NestedEdit::ReplaceBlock => {
                let mut line = old;
                let slot = rng.random_range(0..line.blocks().len());
                let fresh = generator.generate_block(scope, 0, rng);
                if let Some(block) = line.blocks_mut().into_iter().nth(slot) {
                    *block = fresh;
                }
                line
            }
            NestedEdit::Splice => {
                let mut inner: Vec<Command> = old
                    .into_blocks()
                    .into_iter()
                    .filter_map(Block::into_line)
                    .collect();
                if inner.is_empty() {
                    generator.generate_line(scope, 0, rng)
                } else {
                    let pick = rng.random_range(0..inner.len());
                    inner.swap_remove(pick)
                }
            }
        }
    }
}

impl<R: Rng> Mutator<Program, MutationContext<'_, R>> for ProgramMutator {
    /// Each round passes the `p_mutate` gate, applies one edit, then continues
    /// with probability `p_again`, so the number of edits is geometric.
    fn mutate(&mut self, program: &mut Program, ctx: MutationContext<'_, R>) {
        let MutationContext { generator, rng } = ctx;
        loop {
            if !rng.random_bool(self.config.p_mutate) {
                break;
            }
            self.edit(program, generator, rng);
            if !rng.random_bool(self.config.p_again) {
                break;
            }
        }
    }
}

/// A line is protected when something it declares is referenced elsewhere.
fn is_protected(program: &Program, index: usize) -> bool {
    program.lines[index]
        .declarations()
        .into_iter()
        .any(|var| program.occurrences(var) > 1)
}
