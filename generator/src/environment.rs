use std::collections::{HashMap, VecDeque};

use crate::symbol::Var;

/// Runtime state of one top-level execution: a single flat variable
/// namespace shared by every nested sub-block, and the cursor over the
/// program's inputs. There is no block scoping; a binding made anywhere is
/// visible everywhere afterwards.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: HashMap<Var, i64>,
    inputs: VecDeque<i64>,
}

impl Environment {
    pub fn new(inputs: &[i64]) -> Self {
        Self {
            bindings: HashMap::new(),
            inputs: inputs.iter().copied().collect(),
        }
    }

    pub fn get(&self, var: Var) -> Option<i64> {
        self.bindings.get(&var).copied()
    }

    pub fn contains(&self, var: Var) -> bool {
        self.bindings.contains_key(&var)
    }

    pub fn set(&mut self, var: Var, value: i64) {
        self.bindings.insert(var, value);
    }

    /// Values of all listed variables, or `None` if any is unbound.
    pub fn all(&self, vars: &[Var]) -> Option<Vec<i64>> {
        vars.iter().map(|v| self.get(*v)).collect()
    }

    /// Take the next unread input, if any remain. Inputs are read in the
    /// order given, first to last.
    pub fn next_input(&mut self) -> Option<i64> {
        self.inputs.pop_front()
    }
}
