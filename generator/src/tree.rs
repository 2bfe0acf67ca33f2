use std::collections::BTreeSet;

use crate::symbol::Var;

pub const OPEN: &str = "(";
pub const SEPARATOR: &str = ";";
pub const CLOSE: &str = ")";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
    Set,
    Nop,
    Yield,
    Input,
    Copy,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    If,
    Loop,
    Multi,
}

impl Opcode {
    pub const ALL: [Opcode; 14] = [
        Opcode::Set,
        Opcode::Nop,
        Opcode::Yield,
        Opcode::Input,
        Opcode::Copy,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::If,
        Opcode::Loop,
        Opcode::Multi,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Opcode::Set => "SET",
            Opcode::Nop => "NOP",
            Opcode::Yield => "YIELD",
            Opcode::Input => "INPUT",
            Opcode::Copy => "COPY",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Pow => "POW",
            Opcode::If => "IF",
            Opcode::Loop => "LOOP",
            Opcode::Multi => "MULTI",
        }
    }

    pub fn from_keyword(token: &str) -> Option<Opcode> {
        Opcode::ALL.into_iter().find(|op| op.keyword() == token)
    }

    pub fn arithmetic(self) -> Option<ArithmeticOp> {
        match self {
            Opcode::Add => Some(ArithmeticOp::Add),
            Opcode::Sub => Some(ArithmeticOp::Sub),
            Opcode::Mul => Some(ArithmeticOp::Mul),
            Opcode::Div => Some(ArithmeticOp::Div),
            Opcode::Mod => Some(ArithmeticOp::Mod),
            Opcode::Pow => Some(ArithmeticOp::Pow),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithmeticOp {
    pub fn opcode(self) -> Opcode {
        match self {
            ArithmeticOp::Add => Opcode::Add,
            ArithmeticOp::Sub => Opcode::Sub,
            ArithmeticOp::Mul => Opcode::Mul,
            ArithmeticOp::Div => Opcode::Div,
            ArithmeticOp::Mod => Opcode::Mod,
            ArithmeticOp::Pow => Opcode::Pow,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ComparisonOp {
    Greater,
    GreaterEqual,
    Equal,
    LessEqual,
    Less,
    NotEqual,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 6] = [
        ComparisonOp::Greater,
        ComparisonOp::GreaterEqual,
        ComparisonOp::Equal,
        ComparisonOp::LessEqual,
        ComparisonOp::Less,
        ComparisonOp::NotEqual,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEqual => ">=",
            ComparisonOp::Equal => "=",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::Less => "<",
            ComparisonOp::NotEqual => "!=",
        }
    }

    pub fn from_token(token: &str) -> Option<ComparisonOp> {
        ComparisonOp::ALL.into_iter().find(|op| op.token() == token)
    }

    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            ComparisonOp::Greater => lhs > rhs,
            ComparisonOp::GreaterEqual => lhs >= rhs,
            ComparisonOp::Equal => lhs == rhs,
            ComparisonOp::LessEqual => lhs <= rhs,
            ComparisonOp::Less => lhs < rhs,
            ComparisonOp::NotEqual => lhs != rhs,
        }
    }
}

/// The body bound to one slot of a command. The token format has no line
/// separator inside brackets, so a slot holds at most one line.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Block(Option<Box<Command>>);

impl Block {
    pub fn empty() -> Self {
        Block(None)
    }

    pub fn line(command: Command) -> Self {
        Block(Some(Box::new(command)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn lines(&self) -> impl Iterator<Item = &Command> {
        self.0.as_deref().into_iter()
    }

    pub fn into_line(self) -> Option<Command> {
        self.0.map(|c| *c)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Set {
        var: Var,
        value: i64,
    },
    Nop,
    Yield(Var),
    Input(Var),
    Copy {
        to: Var,
        from: Var,
    },
    /// Two-operand form stores into `lhs`; three-operand form into `dest`.
    Arithmetic {
        op: ArithmeticOp,
        lhs: Var,
        rhs: Var,
        dest: Option<Var>,
    },
    If {
        lhs: Var,
        op: ComparisonOp,
        rhs: Var,
        then: Block,
        otherwise: Option<Block>,
    },
    Loop {
        count: Var,
        index: Var,
        body: Block,
    },
    Multi(Block, Block),
    /// A line whose shape fits no opcode. Kept verbatim, executes as a no-op.
    Unrecognized(Vec<String>),
}

impl Command {
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self {
            Command::Set { .. } => Opcode::Set,
            Command::Nop => Opcode::Nop,
            Command::Yield(_) => Opcode::Yield,
            Command::Input(_) => Opcode::Input,
            Command::Copy { .. } => Opcode::Copy,
            Command::Arithmetic { op, .. } => op.opcode(),
            Command::If { .. } => Opcode::If,
            Command::Loop { .. } => Opcode::Loop,
            Command::Multi(..) => Opcode::Multi,
            Command::Unrecognized(_) => return None,
        })
    }

    pub fn blocks(&self) -> Vec<&Block> {
        match self {
            Command::If { then, otherwise, .. } => {
                let mut blocks = vec![then];
                blocks.extend(otherwise.as_ref());
                blocks
            }
            Command::Loop { body, .. } => vec![body],
            Command::Multi(first, second) => vec![first, second],
            _ => vec![],
        }
    }

    pub fn blocks_mut(&mut self) -> Vec<&mut Block> {
        match self {
            Command::If { then, otherwise, .. } => {
                let mut blocks = vec![then];
                blocks.extend(otherwise.as_mut());
                blocks
            }
            Command::Loop { body, .. } => vec![body],
            Command::Multi(first, second) => vec![first, second],
            _ => vec![],
        }
    }

    pub fn into_blocks(self) -> Vec<Block> {
        match self {
            Command::If { then, otherwise, .. } => {
                let mut blocks = vec![then];
                blocks.extend(otherwise);
                blocks
            }
            Command::Loop { body, .. } => vec![body],
            Command::Multi(first, second) => vec![first, second],
            _ => vec![],
        }
    }

    pub fn has_blocks(&self) -> bool {
        !self.blocks().is_empty()
    }

    /// Every variable token on this line and in its sub-blocks, in order,
    /// with repetitions.
    pub fn visit_vars(&self, f: &mut impl FnMut(Var)) {
        match self {
            Command::Set { var, .. } => f(*var),
            Command::Nop => {}
            Command::Yield(var) | Command::Input(var) => f(*var),
            Command::Copy { to, from } => {
                f(*to);
                f(*from);
            }
            Command::Arithmetic { lhs, rhs, dest, .. } => {
                f(*lhs);
                f(*rhs);
                if let Some(dest) = dest {
                    f(*dest);
                }
            }
            Command::If { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Command::Loop { count, index, .. } => {
                f(*count);
                f(*index);
            }
            Command::Multi(..) => {}
            Command::Unrecognized(tokens) => {
                tokens.iter().filter_map(|t| Var::parse(t)).for_each(&mut *f);
            }
        }
        for block in self.blocks() {
            for line in block.lines() {
                line.visit_vars(&mut *f);
            }
        }
    }

    /// Variables declared by `SET` on this line or anywhere below it.
    pub fn declarations(&self) -> Vec<Var> {
        let mut out = Vec::new();
        self.collect_declarations(&mut out);
        out
    }

    fn collect_declarations(&self, out: &mut Vec<Var>) {
        if let Command::Set { var, .. } = self {
            out.push(*var);
        }
        for block in self.blocks() {
            for line in block.lines() {
                line.collect_declarations(out);
            }
        }
    }

    pub fn count_opcode(&self, opcode: Opcode) -> usize {
        let own = usize::from(self.opcode() == Some(opcode));
        own + self
            .blocks()
            .iter()
            .flat_map(|b| b.lines())
            .map(|line| line.count_opcode(opcode))
            .sum::<usize>()
    }
}

/// An ordered sequence of lines; order is execution order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Program {
    pub lines: Vec<Command>,
}

impl Program {
    pub fn new(lines: Vec<Command>) -> Self {
        Program { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// How many times `var` appears as a token anywhere in the program,
    /// its declaration included.
    pub fn occurrences(&self, var: Var) -> usize {
        let mut n = 0;
        for line in &self.lines {
            line.visit_vars(&mut |v| {
                if v == var {
                    n += 1
                }
            });
        }
        n
    }

    /// Variables declared by the lines before `index`, i.e. the scope a line
    /// placed at `index` may reference.
    pub fn declared_before(&self, index: usize) -> Vec<Var> {
        let declared: BTreeSet<Var> = self.lines[..index.min(self.lines.len())]
            .iter()
            .flat_map(|line| line.declarations())
            .collect();
        declared.into_iter().collect()
    }

    /// The index after the largest variable mentioned anywhere.
    pub fn next_free_var(&self) -> Var {
        let mut next = Var::new(0);
        for line in &self.lines {
            line.visit_vars(&mut |v| {
                if v >= next {
                    next = v.next()
                }
            });
        }
        next
    }

    pub fn count_opcode(&self, opcode: Opcode) -> usize {
        self.lines.iter().map(|l| l.count_opcode(opcode)).sum()
    }

    /// Length of the program's source text.
    pub fn char_len(&self) -> usize {
        self.to_string().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: usize) -> Var {
        Var::new(i)
    }

    fn sample() -> Program {
        Program::new(vec![
            Command::Set { var: v(0), value: 3 },
            Command::Set { var: v(1), value: 4 },
            Command::Multi(
                Block::line(Command::Yield(v(0))),
                Block::line(Command::Loop {
                    count: v(1),
                    index: v(0),
                    body: Block::line(Command::Yield(v(1))),
                }),
            ),
        ])
    }

    #[test]
    fn counts_occurrences_through_blocks() {
        let p = sample();
        assert_eq!(p.occurrences(v(0)), 3);
        assert_eq!(p.occurrences(v(1)), 3);
        assert_eq!(p.occurrences(v(2)), 0);
    }

    #[test]
    fn scope_is_prefix_declarations() {
        let p = sample();
        assert_eq!(p.declared_before(0), vec![]);
        assert_eq!(p.declared_before(1), vec![v(0)]);
        assert_eq!(p.declared_before(3), vec![v(0), v(1)]);
        assert_eq!(p.declared_before(99), vec![v(0), v(1)]);
        assert_eq!(p.next_free_var(), v(2));
    }

    #[test]
    fn counts_nested_opcodes() {
        let p = sample();
        assert_eq!(p.count_opcode(Opcode::Yield), 2);
        assert_eq!(p.count_opcode(Opcode::Loop), 1);
        assert_eq!(p.count_opcode(Opcode::Input), 0);
    }

    #[test]
    fn keywords_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_keyword(op.keyword()), Some(op));
        }
        for op in ComparisonOp::ALL {
            assert_eq!(ComparisonOp::from_token(op.token()), Some(op));
        }
    }
}
