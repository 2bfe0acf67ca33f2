use std::str::FromStr;

use thiserror::Error;

use crate::symbol::Var;
use crate::tree::{Block, Command, ComparisonOp, Opcode, Program, CLOSE, OPEN, SEPARATOR};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: expected an opcode, found `{found}`")]
    MissingOpcode { line: usize, found: String },

    #[error("line {line}: `)` without a matching `(`")]
    UnmatchedClose { line: usize },

    #[error("line {line}: {open} unclosed `(`")]
    Unclosed { line: usize, open: usize },

    #[error("line {line}: `{token}` is not an integer literal")]
    InvalidLiteral { line: usize, token: String },
}

/// Tokens of one line, split into the tokens at the outermost level and the
/// token runs of each outermost sub-block. Markers of deeper levels stay
/// inside their run, to be matched when that run is parsed in turn.
#[derive(Debug, PartialEq, Eq)]
pub struct Split<'a> {
    pub main: Vec<&'a str>,
    pub blocks: Vec<Vec<&'a str>>,
}

pub fn split_command<'a>(tokens: &[&'a str], line: usize) -> Result<Split<'a>, ParseError> {
    let mut depth = 0usize;
    let mut main = Vec::new();
    let mut blocks: Vec<Vec<&'a str>> = Vec::new();

    for &token in tokens {
        match token {
            OPEN => {
                depth += 1;
                if depth == 1 {
                    blocks.push(Vec::new());
                    continue;
                }
            }
            CLOSE => {
                if depth == 0 {
                    return Err(ParseError::UnmatchedClose { line });
                }
                depth -= 1;
                if depth == 0 {
                    continue;
                }
            }
            SEPARATOR if depth == 1 => {
                blocks.push(Vec::new());
                continue;
            }
            _ => {}
        }

        match blocks.last_mut() {
            Some(block) if depth > 0 => block.push(token),
            _ => main.push(token),
        }
    }

    if depth != 0 {
        return Err(ParseError::Unclosed { line, open: depth });
    }
    Ok(Split { main, blocks })
}

/// Parse one line's tokens into a command. Shapes that fit no opcode become
/// [`Command::Unrecognized`]; only token-level faults are errors.
pub fn parse_line(tokens: &[&str], line: usize) -> Result<Command, ParseError> {
    let Split { main, blocks } = split_command(tokens, line)?;
    let Some((&keyword, args)) = main.split_first() else {
        return Err(ParseError::MissingOpcode {
            line,
            found: tokens.first().map(|t| t.to_string()).unwrap_or_default(),
        });
    };

    let unrecognized = || Command::Unrecognized(tokens.iter().map(|t| t.to_string()).collect());
    let Some(opcode) = Opcode::from_keyword(keyword) else {
        return Ok(unrecognized());
    };
    let vars: Option<Vec<Var>> = args.iter().map(|t| Var::parse(t)).collect();

    let command = match (opcode, args, blocks.len()) {
        (Opcode::Set, [var, literal], 0) => {
            let Some(var) = Var::parse(var) else {
                return Ok(unrecognized());
            };
            let value: i64 = literal.parse().map_err(|_| ParseError::InvalidLiteral {
                line,
                token: literal.to_string(),
            })?;
            // `+5`, `007` and `-0` would not print back the way they were read.
            if value.to_string() != *literal {
                return Ok(unrecognized());
            }
            Command::Set { var, value }
        }
        (Opcode::Nop, [], 0) => Command::Nop,
        (Opcode::Multi, [], 2) => {
            let mut it = blocks.iter();
            match (it.next(), it.next()) {
                (Some(first), Some(second)) => {
                    Command::Multi(parse_block(first, line)?, parse_block(second, line)?)
                }
                _ => unrecognized(),
            }
        }
        (Opcode::If, [lhs, op, rhs], 1 | 2) => {
            let (Some(lhs), Some(op), Some(rhs)) =
                (Var::parse(lhs), ComparisonOp::from_token(op), Var::parse(rhs))
            else {
                return Ok(unrecognized());
            };
            let then = parse_block(&blocks[0], line)?;
            let otherwise = blocks.get(1).map(|b| parse_block(b, line)).transpose()?;
            Command::If { lhs, op, rhs, then, otherwise }
        }
        (opcode, _, n) => match (opcode, vars.as_deref(), n) {
            (Opcode::Yield, Some(&[var]), 0) => Command::Yield(var),
            (Opcode::Input, Some(&[var]), 0) => Command::Input(var),
            (Opcode::Copy, Some(&[to, from]), 0) => Command::Copy { to, from },
            (Opcode::Loop, Some(&[count, index]), 1) => Command::Loop {
                count,
                index,
                body: parse_block(&blocks[0], line)?,
            },
            (op, Some(&[lhs, rhs]), 0) => match op.arithmetic() {
                Some(op) => Command::Arithmetic { op, lhs, rhs, dest: None },
                None => unrecognized(),
            },
            (op, Some(&[lhs, rhs, dest]), 0) => match op.arithmetic() {
                Some(op) => Command::Arithmetic { op, lhs, rhs, dest: Some(dest) },
                None => unrecognized(),
            },
            _ => unrecognized(),
        },
    };
    Ok(command)
}

fn parse_block(tokens: &[&str], line: usize) -> Result<Block, ParseError> {
    if tokens.is_empty() {
        Ok(Block::empty())
    } else {
        parse_line(tokens, line).map(Block::line)
    }
}

impl Program {
    /// Parse program source: one line per text line, blank lines skipped.
    pub fn parse(source: &str) -> Result<Program, ParseError> {
        let mut lines = Vec::new();
        for (n, text) in source.lines().enumerate() {
            let tokens: Vec<&str> = text.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            lines.push(parse_line(&tokens, n + 1)?);
        }
        Ok(Program::new(lines))
    }
}

impl FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Program::parse(s)
    }
}
