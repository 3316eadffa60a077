//! Mini-notation: a compact text syntax for patterns.
//!
//! Text goes through three stages. `tokenize` splits it into tokens that
//! remember their byte offsets, `parse` builds a [`Node`] tree by recursive
//! descent, and `compile` walks the tree once, mapping every node onto a
//! combinator composition. [`mini`] runs all three.
//!
//! ## Syntax
//!
//! ```text
//! bd sn hh        three steps in one cycle
//! [bd sn] hh      a group squeezed into one step
//! [bd, hh hh]     layers played together
//! [bd | sn]       one layer chosen at random per cycle
//! <bd sn cp>      one step per cycle
//! {a b c}%4       polymeter, four steps per cycle
//! a b, c d e      top-level layers form a polymeter
//! bd . sn sn      feet: [bd] [sn sn]
//! ~               rest
//! bd*2  bd/2      faster, slower (the operand may be a group: bd*<2 3>)
//! bd(3,8,2)       euclidean rhythm with rotation
//! bd@3  bd _ _    weight
//! bd!3  bd ! !    replicate
//! bd?  bd?0.3     drop at random
//! ```

use crate::error::{Error, ParseError, ParseErrorKind};
use crate::fraction::Fraction;
use crate::hap::Location;
use crate::pattern::{fastcat, gap, polymeter, pure, slowcat, stack, timecat, Pattern};
use crate::signal::choose_cycles_seeded;
use crate::value::Value;
use std::fmt;

/// Largest count accepted by `!n`.
const MAX_REPLICATION: usize = 1024;

// ============================================
// Tokenizer
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word(String),
    /// Numeric literal, kept as text so weights stay exact.
    Number(String),
    Rest,
    /// A run of `_`, one elongation per underscore.
    Elongate(usize),
    /// A standalone `.`, separating feet.
    Dot,
    LBracket,
    RBracket,
    LAngle,
    RAngle,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Pipe,
    Star,
    Slash,
    At,
    Bang,
    Question,
    Percent,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            TokenKind::Word(w) => return write!(f, "word '{}'", w),
            TokenKind::Number(n) => return write!(f, "number '{}'", n),
            TokenKind::Rest => "~",
            TokenKind::Elongate(_) => "_",
            TokenKind::Dot => ".",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LAngle => "<",
            TokenKind::RAngle => ">",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Pipe => "|",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::At => "@",
            TokenKind::Bang => "!",
            TokenKind::Question => "?",
            TokenKind::Percent => "%",
        };
        write!(f, "'{}'", symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Token {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn location(&self) -> Location {
        Location::new(self.offset, self.end())
    }
}

fn is_step_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '~' | '#' | '.' | '_' | '-' | '^' | ':' | '\'')
}

/// Classify a run of step characters. Anything built only from digits,
/// dots and minus signs has to be a well-formed decimal.
fn classify_step(src: &str, offset: usize, text: &str) -> Result<TokenKind, ParseError> {
    if text == "~" {
        return Ok(TokenKind::Rest);
    }
    if text == "." {
        return Ok(TokenKind::Dot);
    }
    if text.chars().all(|c| c == '_') {
        return Ok(TokenKind::Elongate(text.len()));
    }

    let numeric = text
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-');
    if numeric && text.chars().any(|c| c.is_ascii_digit()) {
        return match Fraction::parse_decimal(text) {
            Some(_) => Ok(TokenKind::Number(text.to_string())),
            None => Err(ParseError::at(
                src,
                offset,
                ParseErrorKind::InvalidNumber,
                format!("invalid number '{}'", text),
            )),
        };
    }

    Ok(TokenKind::Word(text.to_string()))
}

/// Split notation text into tokens.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if is_step_char(ch) {
            let mut end = offset;
            while let Some(&(i, c)) = chars.peek() {
                if !is_step_char(c) {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            let kind = classify_step(src, offset, &src[offset..end])?;
            tokens.push(Token {
                kind,
                offset,
                len: end - offset,
            });
            continue;
        }

        let kind = match ch {
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '<' => TokenKind::LAngle,
            '>' => TokenKind::RAngle,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '|' => TokenKind::Pipe,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '@' => TokenKind::At,
            '!' => TokenKind::Bang,
            '?' => TokenKind::Question,
            '%' => TokenKind::Percent,
            other => {
                return Err(ParseError::at(
                    src,
                    offset,
                    ParseErrorKind::UnexpectedToken,
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        chars.next();
        tokens.push(Token {
            kind,
            offset,
            len: ch.len_utf8(),
        });
    }

    Ok(tokens)
}

// ============================================
// Syntax tree
// ============================================

/// A parsed notation tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf { value: Value, location: Location },
    /// A numeric literal, with the exact rational it was written as.
    Number {
        value: Value,
        exact: Fraction,
        location: Location,
    },
    Rest,
    /// Steps sharing one cycle in proportion to their weights.
    Sequence(Vec<Step>),
    Stack(Vec<Node>),
    /// One of `choices` per cycle, drawn with `seed` as salt.
    Choice { choices: Vec<Node>, seed: u64 },
    /// One step per cycle, or weighted cycles when weights are given.
    Alternation(Vec<Step>),
    Polymeter {
        layers: Vec<Node>,
        steps_per_cycle: Option<Fraction>,
    },
    Fast { node: Box<Node>, factor: Box<Node> },
    Slow { node: Box<Node>, factor: Box<Node> },
    Euclid {
        node: Box<Node>,
        pulses: Box<Node>,
        steps: Box<Node>,
        rotation: Option<Box<Node>>,
        location: Location,
    },
    Degrade {
        node: Box<Node>,
        probability: f64,
        seed: u64,
    },
}

/// A node together with its relative duration inside a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub node: Node,
    pub weight: Fraction,
}

impl Step {
    pub fn new(node: Node) -> Self {
        Step {
            node,
            weight: Fraction::one(),
        }
    }
}

// ============================================
// Parser
// ============================================

/// The sequences of a bracketed group and the separator between them.
struct Layers {
    sequences: Vec<Vec<Step>>,
    separator: Option<Token>,
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Next salt for `?` and `|`, in source order.
    seeds: u64,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// End offset of the most recently consumed token.
    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, Token::end)
    }

    fn next_seed(&mut self) -> u64 {
        let seed = self.seeds;
        self.seeds += 1;
        seed
    }

    fn error(&self, offset: usize, kind: ParseErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::at(self.src, offset, kind, message)
    }

    fn unexpected(&self, token: &Token) -> ParseError {
        self.error(
            token.offset,
            ParseErrorKind::UnexpectedToken,
            format!("unexpected {}", token.kind),
        )
    }

    fn unexpected_end(&self, expected: &str) -> ParseError {
        self.error(
            self.src.len(),
            ParseErrorKind::UnexpectedToken,
            format!("expected {} but the input ended", expected),
        )
    }

    fn expect_close(&mut self, close: TokenKind, open: &Token) -> Result<(), ParseError> {
        match self.peek() {
            Some(tok) if tok.kind == close => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) => Err(self.error(
                tok.offset,
                ParseErrorKind::UnexpectedToken,
                format!("expected {} to close {}, found {}", close, open.kind, tok.kind),
            )),
            None => Err(self.error(
                open.offset,
                ParseErrorKind::UnterminatedGroup,
                format!("{} is never closed", open.kind),
            )),
        }
    }

    /// Sequences separated by `,` or `|`. The two can't be mixed.
    fn parse_layers(&mut self) -> Result<Layers, ParseError> {
        let mut sequences = vec![self.parse_sequence()?];
        let mut separator: Option<Token> = None;

        while let Some(tok) = self.peek().cloned() {
            if !matches!(tok.kind, TokenKind::Comma | TokenKind::Pipe) {
                break;
            }
            if let Some(sep) = &separator {
                if sep.kind != tok.kind {
                    return Err(self.error(
                        tok.offset,
                        ParseErrorKind::UnexpectedToken,
                        "',' and '|' cannot be mixed in one group",
                    ));
                }
            }
            self.pos += 1;
            separator = Some(tok);
            sequences.push(self.parse_sequence()?);
        }

        Ok(Layers {
            sequences,
            separator,
        })
    }

    fn parse_sequence(&mut self) -> Result<Vec<Step>, ParseError> {
        let mut feet: Vec<Vec<Step>> = Vec::new();
        let mut steps: Vec<Step> = Vec::new();

        while let Some(tok) = self.peek().cloned() {
            match tok.kind {
                TokenKind::Comma
                | TokenKind::Pipe
                | TokenKind::RBracket
                | TokenKind::RAngle
                | TokenKind::RBrace
                | TokenKind::RParen => break,
                TokenKind::Dot => {
                    self.pos += 1;
                    feet.push(std::mem::take(&mut steps));
                }
                TokenKind::Elongate(count) => {
                    self.pos += 1;
                    let last = steps.last_mut().ok_or_else(|| {
                        self.error(
                            tok.offset,
                            ParseErrorKind::UnexpectedToken,
                            "'_' must follow a step",
                        )
                    })?;
                    last.weight = &last.weight + Fraction::from_integer(count as i64);
                }
                TokenKind::Bang => {
                    self.pos += 1;
                    let last = steps.last().cloned().ok_or_else(|| {
                        self.error(
                            tok.offset,
                            ParseErrorKind::UnexpectedToken,
                            "'!' must follow a step",
                        )
                    })?;
                    steps.push(last);
                }
                _ => steps.extend(self.parse_step()?),
            }
        }

        if feet.is_empty() {
            return Ok(steps);
        }
        feet.push(steps);
        Ok(feet
            .into_iter()
            .filter(|foot| !foot.is_empty())
            .map(|foot| Step::new(Node::Sequence(foot)))
            .collect())
    }

    /// An atom and its modifiers. `!n` makes several copies of the step.
    fn parse_step(&mut self) -> Result<Vec<Step>, ParseError> {
        let mut node = self.parse_atom()?;
        let mut weight = Fraction::one();
        let mut copies = 1usize;

        while let Some(tok) = self.peek().cloned() {
            let adjacent = tok.offset == self.last_end();
            match &tok.kind {
                TokenKind::Star | TokenKind::Slash => {
                    self.pos += 1;
                    let factor = Box::new(self.parse_operand(&tok)?);
                    let inner = Box::new(node);
                    node = if tok.kind == TokenKind::Star {
                        Node::Fast {
                            node: inner,
                            factor,
                        }
                    } else {
                        Node::Slow {
                            node: inner,
                            factor,
                        }
                    };
                }
                TokenKind::At => {
                    self.pos += 1;
                    weight = self.parse_number(&tok)?;
                }
                TokenKind::Bang if adjacent => {
                    self.pos += 1;
                    copies = match self.adjacent_number() {
                        Some((offset, text)) => self.replication_count(offset, &text)?,
                        None => copies + 1,
                    };
                }
                TokenKind::Question if adjacent => {
                    self.pos += 1;
                    let probability = match self.adjacent_number() {
                        Some((offset, text)) => text.parse::<f64>().map_err(|_| {
                            self.error(
                                offset,
                                ParseErrorKind::InvalidNumber,
                                format!("invalid probability '{}'", text),
                            )
                        })?,
                        None => 0.5,
                    };
                    node = Node::Degrade {
                        node: Box::new(node),
                        probability,
                        seed: self.next_seed(),
                    };
                }
                TokenKind::LParen if adjacent => {
                    self.pos += 1;
                    node = self.parse_euclid(node, &tok)?;
                }
                _ => break,
            }
        }

        Ok(vec![Step { node, weight }; copies])
    }

    fn replication_count(&self, offset: usize, text: &str) -> Result<usize, ParseError> {
        match text.parse::<usize>() {
            Ok(n) if n <= MAX_REPLICATION => Ok(n),
            Ok(_) => Err(self.error(
                offset,
                ParseErrorKind::InvalidNumber,
                format!("replication count '{}' is over the limit of {}", text, MAX_REPLICATION),
            )),
            Err(_) => Err(self.error(
                offset,
                ParseErrorKind::InvalidNumber,
                format!("replication count must be a whole number, found '{}'", text),
            )),
        }
    }

    fn parse_atom(&mut self) -> Result<Node, ParseError> {
        let tok = self
            .advance()
            .ok_or_else(|| self.unexpected_end("a step"))?;

        match &tok.kind {
            TokenKind::Word(word) => Ok(Node::Leaf {
                value: Value::Str(word.clone()),
                location: tok.location(),
            }),
            TokenKind::Number(text) => Ok(Node::Number {
                value: self.number_value(text, tok.offset)?,
                exact: self.exact_number(text, tok.offset)?,
                location: tok.location(),
            }),
            TokenKind::Rest => Ok(Node::Rest),
            TokenKind::LBracket => {
                let layers = self.parse_layers()?;
                self.expect_close(TokenKind::RBracket, &tok)?;
                Ok(self.group(layers, Node::Sequence))
            }
            TokenKind::LAngle => {
                let layers = self.parse_layers()?;
                self.expect_close(TokenKind::RAngle, &tok)?;
                Ok(self.group(layers, Node::Alternation))
            }
            TokenKind::LBrace => {
                let layers = self.parse_layers()?;
                self.expect_close(TokenKind::RBrace, &tok)?;
                let steps = if self.peek_kind() == Some(&TokenKind::Percent) {
                    let percent = self.advance();
                    match percent {
                        Some(percent) => Some(self.parse_number(&percent)?),
                        None => None,
                    }
                } else {
                    None
                };
                self.polymeter(layers, steps)
            }
            TokenKind::LParen => {
                let layers = self.parse_layers()?;
                self.expect_close(TokenKind::RParen, &tok)?;
                self.polymeter(layers, None)
            }
            _ => Err(self.unexpected(&tok)),
        }
    }

    /// The operand of `*` or `/`: a number, or a group for patterned factors.
    fn parse_operand(&mut self, op: &Token) -> Result<Node, ParseError> {
        match self.peek() {
            Some(tok) => match tok.kind {
                TokenKind::Number(_)
                | TokenKind::Word(_)
                | TokenKind::LBracket
                | TokenKind::LAngle => self.parse_atom(),
                _ => Err(self.error(
                    tok.offset,
                    ParseErrorKind::UnexpectedToken,
                    format!("expected a number or group after {}, found {}", op.kind, tok.kind),
                )),
            },
            None => Err(self.unexpected_end(&format!("a number or group after {}", op.kind))),
        }
    }

    fn parse_number(&mut self, op: &Token) -> Result<Fraction, ParseError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Number(text),
                offset,
                ..
            }) => Fraction::parse_decimal(&text).ok_or_else(|| {
                self.error(
                    offset,
                    ParseErrorKind::InvalidNumber,
                    format!("invalid number '{}'", text),
                )
            }),
            Some(tok) => Err(self.error(
                tok.offset,
                ParseErrorKind::UnexpectedToken,
                format!("expected a number after {}, found {}", op.kind, tok.kind),
            )),
            None => Err(self.unexpected_end(&format!("a number after {}", op.kind))),
        }
    }

    /// Consume a number written directly against the previous token.
    fn adjacent_number(&mut self) -> Option<(usize, String)> {
        let (offset, text) = match self.peek() {
            Some(Token {
                kind: TokenKind::Number(text),
                offset,
                ..
            }) if *offset == self.last_end() => (*offset, text.clone()),
            _ => return None,
        };
        self.pos += 1;
        Some((offset, text))
    }

    fn parse_euclid(&mut self, node: Node, open: &Token) -> Result<Node, ParseError> {
        let mut args = vec![self.parse_sequence()?];
        while self.peek_kind() == Some(&TokenKind::Comma) {
            self.pos += 1;
            args.push(self.parse_sequence()?);
        }
        self.expect_close(TokenKind::RParen, open)?;

        if args.len() > 3 || args.iter().any(Vec::is_empty) {
            return Err(self.arity_error(open));
        }
        let mut args = args
            .into_iter()
            .map(|steps| Box::new(Node::Sequence(steps)));
        match (args.next(), args.next(), args.next()) {
            (Some(pulses), Some(steps), rotation) => Ok(Node::Euclid {
                node: Box::new(node),
                pulses,
                steps,
                rotation,
                location: open.location(),
            }),
            _ => Err(self.arity_error(open)),
        }
    }

    fn arity_error(&self, open: &Token) -> ParseError {
        self.error(
            open.offset,
            ParseErrorKind::UnexpectedToken,
            "expected (pulses,steps) or (pulses,steps,rotation)",
        )
    }

    fn exact_number(&self, text: &str, offset: usize) -> Result<Fraction, ParseError> {
        Fraction::parse_decimal(text).ok_or_else(|| {
            self.error(
                offset,
                ParseErrorKind::InvalidNumber,
                format!("invalid number '{}'", text),
            )
        })
    }

    fn number_value(&self, text: &str, offset: usize) -> Result<Value, ParseError> {
        let value = if text.contains('.') {
            text.parse().ok().map(Value::Float)
        } else {
            text.parse().ok().map(Value::Int)
        };
        value.ok_or_else(|| {
            self.error(
                offset,
                ParseErrorKind::InvalidNumber,
                format!("number '{}' is out of range", text),
            )
        })
    }

    /// Combine the sequences of a `[ ]` or `< >` group.
    fn group(&mut self, layers: Layers, wrap: fn(Vec<Step>) -> Node) -> Node {
        let pipe = matches!(
            layers.separator.as_ref().map(|t| &t.kind),
            Some(TokenKind::Pipe)
        );
        let stacked = layers.separator.is_some();
        let mut nodes: Vec<Node> = layers.sequences.into_iter().map(wrap).collect();

        if pipe {
            Node::Choice {
                choices: nodes,
                seed: self.next_seed(),
            }
        } else if stacked {
            Node::Stack(nodes)
        } else {
            nodes.pop().unwrap_or_else(|| Node::Sequence(Vec::new()))
        }
    }

    fn polymeter(&self, layers: Layers, steps_per_cycle: Option<Fraction>) -> Result<Node, ParseError> {
        if let Some(sep) = &layers.separator {
            if sep.kind == TokenKind::Pipe {
                return Err(self.error(
                    sep.offset,
                    ParseErrorKind::UnexpectedToken,
                    "'|' is not allowed in a polymeter",
                ));
            }
        }
        Ok(Node::Polymeter {
            layers: layers.sequences.into_iter().map(Node::Sequence).collect(),
            steps_per_cycle,
        })
    }
}

/// Parse notation text into a tree.
///
/// Empty text is an empty sequence. The first syntax error aborts the parse.
pub fn parse(src: &str) -> Result<Node, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
        seeds: 0,
    };

    let layers = parser.parse_layers()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.unexpected(tok));
    }

    let comma = matches!(
        layers.separator.as_ref().map(|t| &t.kind),
        Some(TokenKind::Comma)
    );
    if comma {
        parser.polymeter(layers, None)
    } else {
        Ok(parser.group(layers, Node::Sequence))
    }
}

// ============================================
// Compiler
// ============================================

/// Turn a tree into a pattern.
///
/// Fails only on literals that can't serve where they appear, such as a
/// word used as a speed factor or a fractional euclidean step count.
pub fn compile(node: &Node) -> Result<Pattern<Value>, Error> {
    let pat = match node {
        Node::Leaf { value, location } | Node::Number { value, location, .. } => {
            pure(value.clone()).with_location(*location)
        }
        Node::Rest => gap(1),
        Node::Sequence(steps) => compile_steps(steps, false)?,
        Node::Alternation(steps) => compile_steps(steps, true)?,
        Node::Stack(layers) => stack(compile_all(layers)?),
        Node::Choice { choices, seed } => choose_cycles_seeded(compile_all(choices)?, *seed),
        Node::Polymeter {
            layers,
            steps_per_cycle,
        } => polymeter(steps_per_cycle.clone(), compile_all(layers)?),
        Node::Fast { node, factor } => {
            let pat = compile(node)?;
            match literal_number(factor)? {
                Some(factor) => pat.fast(factor),
                None => pat.fast_by(compile_fraction(factor)?),
            }
        }
        Node::Slow { node, factor } => {
            let pat = compile(node)?;
            match literal_number(factor)? {
                Some(factor) => pat.slow(factor),
                None => pat.slow_by(compile_fraction(factor)?),
            }
        }
        Node::Euclid {
            node,
            pulses,
            steps,
            rotation,
            ..
        } => compile_euclid(node, pulses, steps, rotation.as_deref())?,
        Node::Degrade {
            node,
            probability,
            seed,
        } => compile(node)?.degrade_by_seeded(*probability, *seed),
    };
    Ok(pat)
}

/// Parse and compile notation text.
pub fn mini(src: &str) -> Result<Pattern<Value>, Error> {
    let node = parse(src)?;
    compile(&node)
}

fn compile_all(nodes: &[Node]) -> Result<Vec<Pattern<Value>>, Error> {
    nodes.iter().map(compile).collect()
}

fn compile_steps(steps: &[Step], alternate: bool) -> Result<Pattern<Value>, Error> {
    let weighted = steps
        .iter()
        .map(|step| Ok((step.weight.clone(), compile(&step.node)?)))
        .collect::<Result<Vec<_>, Error>>()?;

    if weighted.iter().all(|(w, _)| *w == Fraction::one()) {
        let pats = weighted.into_iter().map(|(_, pat)| pat).collect();
        return Ok(if alternate {
            slowcat(pats)
        } else {
            fastcat(pats)
        });
    }

    if !alternate {
        return Ok(timecat(weighted));
    }
    let total = weighted
        .iter()
        .filter(|(w, _)| w.is_positive())
        .fold(Fraction::zero(), |acc, (w, _)| acc + w);
    Ok(timecat(weighted)
        .slow(total)
        .set_steps(Some(Fraction::one())))
}

/// The value of a node that is a single literal, possibly wrapped in a
/// one-step sequence.
fn literal(node: &Node) -> Option<(&Value, Location)> {
    match node {
        Node::Leaf { value, location } | Node::Number { value, location, .. } => {
            Some((value, *location))
        }
        Node::Sequence(steps) if steps.len() == 1 && steps[0].weight == Fraction::one() => {
            literal(&steps[0].node)
        }
        _ => None,
    }
}

/// The exact value of a numeric literal, possibly wrapped in a one-step
/// sequence.
fn exact_literal(node: &Node) -> Option<&Fraction> {
    match node {
        Node::Number { exact, .. } => Some(exact),
        Node::Sequence(steps) if steps.len() == 1 && steps[0].weight == Fraction::one() => {
            exact_literal(&steps[0].node)
        }
        _ => None,
    }
}

fn literal_number(node: &Node) -> Result<Option<Fraction>, Error> {
    if let Some(exact) = exact_literal(node) {
        return Ok(Some(exact.clone()));
    }
    match literal(node) {
        Some((value, location)) => value
            .to_fraction()
            .map(Some)
            .ok_or_else(|| Error::Construction {
                offset: location.start,
                message: format!("expected a number, found '{}'", value),
            }),
        None => Ok(None),
    }
}

/// A patterned time factor. Non-numeric events are dropped.
fn compile_fraction(node: &Node) -> Result<Pattern<Fraction>, Error> {
    Ok(compile(node)?
        .filter_values(Value::is_numeric)
        .fmap(|v| v.to_fraction().unwrap_or_else(Fraction::zero)))
}

enum Count {
    Literal(i64),
    Patterned(Pattern<i64>),
}

impl Count {
    fn into_pattern(self) -> Pattern<i64> {
        match self {
            Count::Literal(n) => pure(n),
            Count::Patterned(pat) => pat,
        }
    }
}

fn euclid_count(node: &Node, what: &str) -> Result<Count, Error> {
    match literal(node) {
        Some((value, location)) => {
            value
                .as_i64()
                .map(Count::Literal)
                .ok_or_else(|| Error::Construction {
                    offset: location.start,
                    message: format!("euclidean {} must be a whole number, found '{}'", what, value),
                })
        }
        None => Ok(Count::Patterned(
            compile(node)?
                .filter_values(Value::is_numeric)
                .fmap(|v| v.as_f64().map_or(0, |x| x.floor() as i64)),
        )),
    }
}

fn compile_euclid(
    node: &Node,
    pulses: &Node,
    steps: &Node,
    rotation: Option<&Node>,
) -> Result<Pattern<Value>, Error> {
    let pat = compile(node)?;
    let pulses = euclid_count(pulses, "pulse count")?;
    let steps = euclid_count(steps, "step count")?;
    let rotation = match rotation {
        Some(rotation) => euclid_count(rotation, "rotation")?,
        None => Count::Literal(0),
    };

    Ok(match (pulses, steps, rotation) {
        (Count::Literal(k), Count::Literal(n), Count::Literal(r)) => pat.euclid_rot(k, n, r),
        (k, n, r) => pat.euclid_by(k.into_pattern(), n.into_pattern(), r.into_pattern()),
    })
}
