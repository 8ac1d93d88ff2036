//! Address pattern matching
//!
//! OSC address patterns are glob-like:
//! - `?` matches any single character except `/`
//! - `*` matches any run of characters (possibly empty) except `/`
//! - `[abc]`, `[a-z]` match one character from the set, `[!abc]` one outside it.
//!   A class that accepts no character, such as `[]` or `[/]`, is rejected.
//! - `{foo,bar}` matches any of the comma separated alternatives, nested at
//!   most [`MAX_GROUP_DEPTH`] deep
//!
//! Matching is symmetric: [`Pattern::intersects`] answers whether *any*
//! address is accepted by both patterns. Matching a pattern against a literal
//! address is the special case where one side has only literal characters.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use std::str::FromStr;

use crate::{Error, Result};

/// Path separator, never matched by a wildcard or class
const SEPARATOR: char = '/';

/// Deepest `{}` nesting the tokenizer accepts
pub const MAX_GROUP_DEPTH: usize = 32;

/// A single pattern token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Literal character
    Char(char),
    /// `*`
    Star,
    /// `?`
    Any,
    /// `[...]` or `[!...]`, stored as inclusive ranges
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
    /// `{a,b,c}`, each alternative is its own token sequence
    Group(Vec<Vec<Token>>),
}

/// A compiled address pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    raw: String,
    tokens: Vec<Token>,
    program: Program,
}

impl Pattern {
    /// Compile a pattern string
    pub fn compile(s: &str) -> Result<Self> {
        let mut chars = s.chars().peekable();
        let tokens = parse_sequence(&mut chars, 0)?;
        Ok(Self {
            raw: s.to_string(),
            program: Program::new(&tokens),
            tokens,
        })
    }

    /// Pattern that treats every character of `s` literally
    pub fn literal(s: &str) -> Self {
        Self {
            raw: s.to_string(),
            tokens: s.chars().map(Token::Char).collect(),
            program: Program::literal(s),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Check whether this pattern contains only literal characters
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Char(_)))
    }

    /// Check whether some address is accepted by both patterns
    pub fn intersects(&self, other: &Pattern) -> bool {
        intersect(&self.program, &other.program)
    }

    /// Check whether this pattern accepts a literal address
    pub fn matches(&self, address: &str) -> bool {
        intersect(&self.program, &Program::literal(address))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Pattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pattern::compile(s)
    }
}

/// Compile two pattern strings and test them for intersection
pub fn intersects(a: &str, b: &str) -> Result<bool> {
    Ok(Pattern::compile(a)?.intersects(&Pattern::compile(b)?))
}

// ============================================================================
// TOKENIZER
// ============================================================================

/// `depth` counts the enclosing groups
fn parse_sequence(chars: &mut Peekable<Chars<'_>>, depth: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            ',' | '}' if depth > 0 => break,
            '}' => return Err(Error::InvalidPattern("unmatched '}'".to_string())),
            ']' => return Err(Error::InvalidPattern("unmatched ']'".to_string())),
            '*' => {
                chars.next();
                // "**" accepts exactly what "*" accepts
                if tokens.last() != Some(&Token::Star) {
                    tokens.push(Token::Star);
                }
            }
            '?' => {
                chars.next();
                tokens.push(Token::Any);
            }
            '[' => {
                chars.next();
                tokens.push(parse_class(chars)?);
            }
            '{' => {
                chars.next();
                tokens.push(parse_group(chars, depth + 1)?);
            }
            _ => {
                chars.next();
                tokens.push(Token::Char(c));
            }
        }
    }

    Ok(tokens)
}

fn parse_class(chars: &mut Peekable<Chars<'_>>) -> Result<Token> {
    let negated = chars.next_if_eq(&'!').is_some();

    let mut body = Vec::new();
    loop {
        match chars.next() {
            Some(']') => break,
            Some(c) => body.push(c),
            None => return Err(Error::InvalidPattern("unmatched '['".to_string())),
        }
    }

    let mut ranges = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if i + 2 < body.len() && body[i + 1] == '-' {
            let (lo, hi) = (body[i], body[i + 2]);
            if lo > hi {
                return Err(Error::InvalidPattern(format!(
                    "reversed range '{}-{}'",
                    lo, hi
                )));
            }
            ranges.push((lo, hi));
            i += 3;
        } else {
            ranges.push((body[i], body[i]));
            i += 1;
        }
    }

    let class = Token::Class { negated, ranges };
    if !overlaps(&class, &Token::Any) {
        return Err(Error::InvalidPattern(
            "character class matches no character".to_string(),
        ));
    }
    Ok(class)
}

fn parse_group(chars: &mut Peekable<Chars<'_>>, depth: usize) -> Result<Token> {
    if depth > MAX_GROUP_DEPTH {
        return Err(Error::InvalidPattern(format!(
            "groups nested deeper than {}",
            MAX_GROUP_DEPTH
        )));
    }

    let mut alternatives = Vec::new();
    loop {
        alternatives.push(parse_sequence(chars, depth)?);
        match chars.next() {
            Some(',') => continue,
            Some('}') => break,
            _ => return Err(Error::InvalidPattern("unmatched '{'".to_string())),
        }
    }
    Ok(Token::Group(alternatives))
}

// ============================================================================
// INTERSECTION
// ============================================================================

/// Token sequence flattened into a graph of single-character steps.
///
/// Node 0 is always [`Node::Accept`]. Every group alternative is built with
/// the group's continuation as its successor, so search states are plain
/// node indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Program {
    nodes: Vec<Node>,
    start: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    /// Consume one character accepted by `token`
    Step { token: Token, next: usize },
    /// Consume any run of non-separator characters, then continue at `next`
    Star { next: usize },
    /// Continue at any target without consuming
    Split(Vec<usize>),
    Accept,
}

static STAR: Token = Token::Star;

impl Program {
    fn new(tokens: &[Token]) -> Self {
        let mut nodes = vec![Node::Accept];
        let start = build(tokens, 0, &mut nodes);
        Self { nodes, start }
    }

    fn literal(s: &str) -> Self {
        let mut nodes = Vec::with_capacity(s.len() + 1);
        nodes.push(Node::Accept);
        let mut next = 0;
        for c in s.chars().rev() {
            nodes.push(Node::Step {
                token: Token::Char(c),
                next,
            });
            next = nodes.len() - 1;
        }
        Self { nodes, start: next }
    }

    /// Character set consumed at `at` and the node reached afterwards
    fn consume(&self, at: usize) -> Option<(&Token, usize)> {
        match &self.nodes[at] {
            Node::Step { token, next } => Some((token, *next)),
            Node::Star { .. } => Some((&STAR, at)),
            Node::Split(_) | Node::Accept => None,
        }
    }
}

fn build(tokens: &[Token], next: usize, nodes: &mut Vec<Node>) -> usize {
    tokens.iter().rev().fold(next, |next, token| {
        let node = match token {
            Token::Star => Node::Star { next },
            Token::Group(alternatives) => Node::Split(
                alternatives
                    .iter()
                    .map(|alt| build(alt, next, nodes))
                    .collect(),
            ),
            _ => Node::Step {
                token: token.clone(),
                next,
            },
        };
        nodes.push(node);
        nodes.len() - 1
    })
}

/// Breadth-first search over pairs of node positions
fn intersect(a: &Program, b: &Program) -> bool {
    let mut queue = VecDeque::new();
    let mut seen = HashSet::new();
    let mut push = |queue: &mut VecDeque<(usize, usize)>, state: (usize, usize)| {
        if seen.insert(state) {
            queue.push_back(state);
        }
    };
    push(&mut queue, (a.start, b.start));

    while let Some((i, j)) = queue.pop_front() {
        match (&a.nodes[i], &b.nodes[j]) {
            (Node::Accept, Node::Accept) => return true,
            (Node::Split(targets), _) => {
                for &t in targets {
                    push(&mut queue, (t, j));
                }
            }
            (_, Node::Split(targets)) => {
                for &t in targets {
                    push(&mut queue, (i, t));
                }
            }
            (x, y) => {
                // A star may end without consuming
                if let Node::Star { next } = x {
                    push(&mut queue, (*next, j));
                }
                if let Node::Star { next } = y {
                    push(&mut queue, (i, *next));
                }
                if let (Some((x, x_next)), Some((y, y_next))) = (a.consume(i), b.consume(j)) {
                    if shares_char(x, y) {
                        push(&mut queue, (x_next, y_next));
                    }
                }
            }
        }
    }

    false
}

/// Whether two single-character tokens accept a common character
fn shares_char(x: &Token, y: &Token) -> bool {
    match (x, y) {
        (Token::Char(c), Token::Char(d)) => c == d,
        _ => overlaps(x, y),
    }
}

/// Whether two single-character tokens share an accepted non-separator character
fn overlaps(x: &Token, y: &Token) -> bool {
    let (x_neg, x_ranges) = as_set(x);
    let (y_neg, y_ranges) = as_set(y);

    match (x_neg, y_neg) {
        // finite exclusions never cover the whole alphabet
        (true, true) => true,
        (true, false) => y_ranges
            .iter()
            .any(|&(lo, hi)| has_uncovered(lo, hi, &x_ranges)),
        (false, true) => x_ranges
            .iter()
            .any(|&(lo, hi)| has_uncovered(lo, hi, &y_ranges)),
        (false, false) => x_ranges.iter().any(|&(xl, xh)| {
            y_ranges.iter().any(|&(yl, yh)| {
                let (lo, hi) = (xl.max(yl), xh.min(yh));
                lo <= hi && has_uncovered(lo, hi, &[])
            })
        }),
    }
}

/// Set view of a single-character token as (negated, inclusive ranges)
fn as_set(token: &Token) -> (bool, Vec<(u32, u32)>) {
    match token {
        Token::Char(c) => (false, vec![(*c as u32, *c as u32)]),
        Token::Any | Token::Star => (true, Vec::new()),
        Token::Class { negated, ranges } => (
            *negated,
            ranges
                .iter()
                .map(|&(lo, hi)| (lo as u32, hi as u32))
                .collect(),
        ),
        Token::Group(_) => (false, Vec::new()),
    }
}

/// Whether `lo..=hi` holds a character outside `covered`, the separator and surrogates
fn has_uncovered(lo: u32, hi: u32, covered: &[(u32, u32)]) -> bool {
    let sep = SEPARATOR as u32;
    let mut cursor = lo;

    'scan: while cursor <= hi {
        if cursor == sep {
            cursor += 1;
            continue;
        }
        if (0xD800..=0xDFFF).contains(&cursor) {
            cursor = 0xE000;
            continue;
        }
        for &(a, b) in covered {
            if a <= cursor && cursor <= b {
                cursor = b + 1;
                continue 'scan;
            }
        }
        return true;
    }

    false
}
