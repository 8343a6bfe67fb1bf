//! Restricted expression language used inside template tags.
//!
//! Only property/index paths, literals, equality and the ternary form are
//! accepted. Evaluation can reach nothing but the scope chain it is given.
//!
//! ```text
//! expr     := equality ( '?' expr ':' expr )?
//! equality := primary ( ('==' | '!=' | '===' | '!==') primary )*
//! primary  := literal | path | '(' expr ')'
//! path     := ('.' | ident) ( '.' ident | '[' (int | string) ']' )*
//! ```
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

static SINGLE_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{2018}\u{2019}]").expect("valid regex"));
static DOUBLE_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{201C}\u{201D}]").expect("valid regex"));

/// Replaces the typographic quotes Word inserts with their ASCII forms.
pub fn normalize_quotes(raw: &str) -> Cow<'_, str> {
    match SINGLE_QUOTES.replace_all(raw, "'") {
        Cow::Borrowed(s) => DOUBLE_QUOTES.replace_all(s, "\""),
        Cow::Owned(s) => Cow::Owned(DOUBLE_QUOTES.replace_all(&s, "\"").into_owned()),
    }
}

/// Parse failure, with the byte offset in the normalized expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}

/// One accessor in a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.` followed by optional accessors
    CurrentScope(Vec<Segment>),
    /// Identifier looked up through the scope chain, then accessors
    Path {
        root: String,
        segments: Vec<Segment>,
    },
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Parses tag text into an expression tree.
    pub fn parse(source: &str) -> Result<Expr, ParseError> {
        let normalized = normalize_quotes(source);
        let tokens = tokenize(&normalized)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some((position, token)) => Err(ParseError {
                position: *position,
                message: format!("unexpected {token}"),
            }),
        }
    }

    /// Evaluates against a scope chain. `None` means undefined.
    pub fn evaluate<'a>(&self, scope: &Scope<'a>) -> Option<Cow<'a, Value>> {
        match self {
            Expr::CurrentScope(segments) => walk(Cow::Borrowed(scope.value), segments),
            Expr::Path { root, segments } => {
                let found = scope.lookup(root)?;
                walk(Cow::Borrowed(found), segments)
            }
            Expr::Literal(value) => Some(Cow::Owned(value.clone())),
            Expr::Compare { op, left, right } => {
                let l = left.evaluate(scope);
                let r = right.evaluate(scope);
                let equal = match op {
                    CompareOp::LooseEq | CompareOp::LooseNe => loose_eq(l.as_deref(), r.as_deref()),
                    CompareOp::StrictEq | CompareOp::StrictNe => {
                        strict_eq(l.as_deref(), r.as_deref())
                    }
                };
                let result = match op {
                    CompareOp::LooseEq | CompareOp::StrictEq => equal,
                    CompareOp::LooseNe | CompareOp::StrictNe => !equal,
                };
                Some(Cow::Owned(Value::Bool(result)))
            }
            Expr::Ternary { condition, then, otherwise } => {
                if is_truthy(condition.evaluate(scope).as_deref()) {
                    then.evaluate(scope)
                } else {
                    otherwise.evaluate(scope)
                }
            }
        }
    }
}

/// A data context frame. Lookups fall back to the parent frame.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub value: &'a Value,
    pub parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub fn root(value: &'a Value) -> Self {
        Self {
            value,
            parent: None,
        }
    }

    pub fn child(&'a self, value: &'a Value) -> Scope<'a> {
        Scope {
            value,
            parent: Some(self),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            if let Some(value) = current.value.as_object().and_then(|obj| obj.get(name)) {
                return Some(value);
            }
            frame = current.parent;
        }
        None
    }
}

fn walk<'a>(start: Cow<'a, Value>, segments: &[Segment]) -> Option<Cow<'a, Value>> {
    let mut current = start;
    for segment in segments {
        current = match current {
            Cow::Borrowed(value) => access(value, segment)?,
            Cow::Owned(value) => Cow::Owned(access(&value, segment)?.into_owned()),
        };
    }
    Some(current)
}

fn access<'v>(value: &'v Value, segment: &Segment) -> Option<Cow<'v, Value>> {
    match (value, segment) {
        (Value::Object(obj), Segment::Key(key)) => obj.get(key).map(Cow::Borrowed),
        (Value::Array(items), Segment::Index(i)) => items.get(*i).map(Cow::Borrowed),
        (Value::Array(items), Segment::Key(key)) if key == "length" => {
            Some(Cow::Owned(Value::from(items.len())))
        }
        (Value::String(s), Segment::Key(key)) if key == "length" => {
            Some(Cow::Owned(Value::from(s.chars().count())))
        }
        _ => None,
    }
}

/// JavaScript-style truthiness over JSON values.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn strict_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn loose_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (Some(Value::Number(n)), Some(Value::String(s)))
        | (Some(Value::String(s)), Some(Value::Number(n))) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (Some(Value::Bool(b)), Some(other)) | (Some(other), Some(Value::Bool(b))) => {
            let as_number = Value::from(if *b { 1 } else { 0 });
            match other {
                Value::Bool(_) => strict_eq(left, right),
                _ => loose_eq(Some(&as_number), Some(other)),
            }
        }
        _ => strict_eq(left, right),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Value),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Question,
    Colon,
    Op(CompareOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier '{s}'"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Number(n) => write!(f, "number {n}"),
            Token::Dot => f.write_str("'.'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Question => f.write_str("'?'"),
            Token::Colon => f.write_str("':'"),
            Token::Op(op) => write!(f, "operator {op:?}"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push((pos, Token::Dot));
            }
            '[' => {
                chars.next();
                tokens.push((pos, Token::LBracket));
            }
            ']' => {
                chars.next();
                tokens.push((pos, Token::RBracket));
            }
            '(' => {
                chars.next();
                tokens.push((pos, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Token::RParen));
            }
            '?' => {
                chars.next();
                tokens.push((pos, Token::Question));
            }
            ':' => {
                chars.next();
                tokens.push((pos, Token::Colon));
            }
            '=' | '!' => {
                chars.next();
                if chars.next_if(|&(_, n)| n == '=').is_none() {
                    return Err(ParseError {
                        position: pos,
                        message: format!("unsupported operator '{c}'"),
                    });
                }
                let strict = chars.next_if(|&(_, n)| n == '=').is_some();
                let op = match (c, strict) {
                    ('=', false) => CompareOp::LooseEq,
                    ('=', true) => CompareOp::StrictEq,
                    ('!', false) => CompareOp::LooseNe,
                    _ => CompareOp::StrictNe,
                };
                tokens.push((pos, Token::Op(op)));
            }
            '\'' | '"' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                literal.push(escaped);
                            }
                        }
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => literal.push(ch),
                    }
                }
                if !closed {
                    return Err(ParseError {
                        position: pos,
                        message: "unterminated string literal".to_string(),
                    });
                }
                tokens.push((pos, Token::Str(literal)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some((_, d)) = chars.next_if(|&(_, d)| d.is_ascii_digit() || d == '.') {
                    text.push(d);
                }
                let number = if let Ok(i) = text.parse::<i64>() {
                    Value::from(i)
                } else if let Some(n) = text
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                {
                    Value::Number(n)
                } else {
                    return Err(ParseError {
                        position: pos,
                        message: format!("invalid number '{text}'"),
                    });
                };
                tokens.push((pos, Token::Number(number)));
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                while let Some((_, ch)) = chars.next_if(|&(_, ch)| is_ident_continue(ch)) {
                    ident.push(ch);
                }
                tokens.push((pos, Token::Ident(ident)));
            }
            other => {
                return Err(ParseError {
                    position: pos,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|(_, t)| t == expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map(|(p, _)| p + 1).unwrap_or(0)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        let position = self
            .peek()
            .map(|(p, _)| *p)
            .unwrap_or_else(|| self.end_position());
        Err(ParseError {
            position,
            message: message.into(),
        })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let condition = self.equality()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.expr()?;
        if !self.eat(&Token::Colon) {
            return self.error("expected ':' in conditional expression");
        }
        let otherwise = self.expr()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.primary()?;
        while let Some((_, Token::Op(op))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.primary()?;
            left = Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some((_, Token::Str(s))) => Ok(Expr::Literal(Value::String(s))),
            Some((_, Token::Number(n))) => Ok(Expr::Literal(n)),
            Some((_, Token::LParen)) => {
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return self.error("expected ')'");
                }
                Ok(inner)
            }
            Some((_, Token::Dot)) => {
                // accessors after a leading `.` never fall back to parent scopes
                if matches!(self.peek(), Some((_, Token::Ident(_)))) {
                    self.pos -= 1;
                }
                Ok(Expr::CurrentScope(self.segments()?))
            }
            Some((_, Token::Ident(ident))) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => {
                    let segments = self.segments()?;
                    if self.peek().is_some_and(|(_, t)| *t == Token::LParen) {
                        return self.error("function calls are not supported");
                    }
                    Ok(Expr::Path {
                        root: ident,
                        segments,
                    })
                }
            },
            Some((position, token)) => Err(ParseError {
                position,
                message: format!("unexpected {token}"),
            }),
            None => self.error("unexpected end of expression"),
        }
    }

    fn segments(&mut self) -> Result<Vec<Segment>, ParseError> {
        let mut segments = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.next() {
                    Some((_, Token::Ident(key))) => segments.push(Segment::Key(key)),
                    _ => {
                        self.pos -= 1;
                        return self.error("expected property name after '.'");
                    }
                }
            } else if self.eat(&Token::LBracket) {
                let segment = match self.next() {
                    Some((_, Token::Number(Value::Number(n)))) => match n.as_u64() {
                        Some(i) => Segment::Index(i as usize),
                        None => return self.error("array index must be a non-negative integer"),
                    },
                    Some((_, Token::Str(key))) => Segment::Key(key),
                    _ => return self.error("expected index or quoted key"),
                };
                if !self.eat(&Token::RBracket) {
                    return self.error("expected ']'");
                }
                segments.push(segment);
            } else {
                return Ok(segments);
            }
        }
    }
}
