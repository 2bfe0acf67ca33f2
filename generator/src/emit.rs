use std::fmt;

use crate::tree::{Block, Command, Program, CLOSE, OPEN, SEPARATOR};

/// Accumulates tokens into source lines.
pub struct Emitter {
    lines: Vec<String>,
    current: Vec<String>,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            current: Vec::new(),
        }
    }

    pub fn emit_token(&mut self, token: impl ToString) {
        self.current.push(token.to_string());
    }

    pub fn end_line(&mut self) {
        let tokens = std::mem::take(&mut self.current);
        self.lines.push(tokens.join(" "));
    }

    fn enter_block(&mut self) {
        self.emit_token(OPEN)
    }

    fn separate_block(&mut self) {
        self.emit_token(SEPARATOR)
    }

    fn exit_block(&mut self) {
        self.emit_token(CLOSE)
    }

    pub fn emit(mut self) -> String {
        if !self.current.is_empty() {
            self.end_line();
        }
        self.lines.join("\n")
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Emittable {
    fn emit(&self, e: &mut Emitter);
}

impl Emittable for Program {
    fn emit(&self, e: &mut Emitter) {
        for line in &self.lines {
            line.emit(e);
            e.end_line();
        }
    }
}

impl Emittable for Block {
    fn emit(&self, e: &mut Emitter) {
        for line in self.lines() {
            line.emit(e);
        }
    }
}

impl Emittable for Command {
    fn emit(&self, e: &mut Emitter) {
        if let Command::Unrecognized(tokens) = self {
            tokens.iter().for_each(|t| e.emit_token(t));
            return;
        }
        if let Some(opcode) = self.opcode() {
            e.emit_token(opcode.keyword());
        }
        match self {
            Command::Set { var, value } => {
                e.emit_token(var);
                e.emit_token(value);
            }
            Command::Yield(var) | Command::Input(var) => e.emit_token(var),
            Command::Copy { to, from } => {
                e.emit_token(to);
                e.emit_token(from);
            }
            Command::Arithmetic { lhs, rhs, dest, .. } => {
                e.emit_token(lhs);
                e.emit_token(rhs);
                if let Some(dest) = dest {
                    e.emit_token(dest);
                }
            }
            Command::If { lhs, op, rhs, .. } => {
                e.emit_token(lhs);
                e.emit_token(op.token());
                e.emit_token(rhs);
            }
            Command::Loop { count, index, .. } => {
                e.emit_token(count);
                e.emit_token(index);
            }
            Command::Nop | Command::Multi(..) | Command::Unrecognized(_) => {}
        }

        let blocks = self.blocks();
        if blocks.is_empty() {
            return;
        }
        e.enter_block();
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                e.separate_block();
            }
            block.emit(e);
        }
        e.exit_block();
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut e = Emitter::new();
        self.emit(&mut e);
        f.write_str(&e.emit())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut e = Emitter::new();
        self.emit(&mut e);
        f.write_str(&e.emit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Var;
    use crate::tree::ComparisonOp;

    #[test]
    fn emits_nested_blocks_with_markers() {
        let line = Command::If {
            lhs: Var::new(0),
            op: ComparisonOp::GreaterEqual,
            rhs: Var::new(1),
            then: Block::line(Command::Multi(Block::line(Command::Nop), Block::empty())),
            otherwise: Some(Block::line(Command::Yield(Var::new(1)))),
        };
        assert_eq!(line.to_string(), "IF v0 >= v1 ( MULTI ( NOP ; ) ; YIELD v1 )");
    }

    #[test]
    fn hand_written_source_round_trips() {
        let source = "SET v0 5\nSET v1 2\n\
                      LOOP v1 v0 ( IF v0 = v1 ( YIELD v0 ; INPUT v1 ) )\n\
                      DIV v0 v1 v1";
        let program = Program::parse(source).unwrap();
        assert_eq!(program.to_string(), source);
        assert_eq!(program.char_len(), source.len());
    }

    #[test]
    fn empty_program_is_empty_text() {
        assert_eq!(Program::default().to_string(), "");
    }
}
