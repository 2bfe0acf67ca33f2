use std::fmt;

/// A variable name. Names are drawn from a dense namespace `v0, v1, v2, ...`
/// so a variable is fully described by its index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(usize);

impl Var {
    pub fn new(index: usize) -> Self {
        Var(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// The variable after this one in the namespace.
    pub fn next(self) -> Self {
        Var(self.0 + 1)
    }

    /// Parse a `v<index>` token. Only canonical spellings are accepted so that
    /// a parsed name always prints back to the same token.
    pub fn parse(token: &str) -> Option<Var> {
        let digits = token.strip_prefix('v')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        digits.parse().ok().map(Var)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
