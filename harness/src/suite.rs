//! Test suites as text: one case per line, inputs and expected outputs
//! separated by `=`, e.g. `1 2 = 3`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Vec<i64>,
    pub expected: Vec<i64>,
}

impl TestCase {
    pub fn new(input: Vec<i64>, expected: Vec<i64>) -> Self {
        Self { input, expected }
    }
}

/// Parse a suite. Order is kept: it decides the elimination order when
/// scoring. Blank lines and `#` comments are ignored.
pub fn parse_suite(text: &str) -> Result<Vec<TestCase>> {
    let mut cases = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let Some((input, expected)) = content.split_once('=') else {
            return Err(HarnessError::Suite {
                line,
                message: "expected `inputs = outputs`".into(),
            });
        };
        cases.push(TestCase {
            input: numbers(input, line)?,
            expected: numbers(expected, line)?,
        });
    }
    Ok(cases)
}

pub fn load_suite(path: &Path) -> Result<Vec<TestCase>> {
    parse_suite(&fs::read_to_string(path)?)
}

fn numbers(text: &str, line: usize) -> Result<Vec<i64>> {
    text.split_whitespace()
        .map(|token| {
            token.parse().map_err(|_| HarnessError::Suite {
                line,
                message: format!("`{token}` is not an integer"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cases_in_order() {
        let suite = parse_suite("# sum\n1 2 = 3\n\n-4 4 = 0\n = 5\n7 =\n").unwrap();
        assert_eq!(
            suite,
            vec![
                TestCase::new(vec![1, 2], vec![3]),
                TestCase::new(vec![-4, 4], vec![0]),
                TestCase::new(vec![], vec![5]),
                TestCase::new(vec![7], vec![]),
            ]
        );
    }

    #[test]
    fn trailing_comment_is_ignored() {
        let suite = parse_suite("2 = 4 # double").unwrap();
        assert_eq!(suite, vec![TestCase::new(vec![2], vec![4])]);
    }

    #[test]
    fn errors_name_the_line() {
        let err = parse_suite("1 = 1\n1 2 3\n").unwrap_err();
        assert!(matches!(err, HarnessError::Suite { line: 2, .. }), "{err}");
        let err = parse_suite("\n\nx = 1").unwrap_err();
        assert!(matches!(err, HarnessError::Suite { line: 3, .. }), "{err}");
    }
}
