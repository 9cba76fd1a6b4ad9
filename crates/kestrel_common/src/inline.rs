//! Inline expressions.
//!
//! Two flavours share the `${...}` (or `$->{...}`) placeholder syntax:
//!
//! - **Enumerations**, used for actual data nodes: `ds_${0..1}.t_order_${[0, 1]}`
//!   expands to the cartesian product of every placeholder's values.
//!   Comma-separated expressions are concatenated.
//! - **Templates**, used by inline sharding algorithms: `t_order_${order_id % 4}`
//!   is rendered once per sharding value. Placeholders hold integer arithmetic
//!   over named variables (`+ - * / %`, parentheses, unary minus).

use crate::datum::Datum;
use crate::error::ConfigError;

/// Expand an enumeration expression into every name it denotes, in order.
pub fn expand(expression: &str) -> Result<Vec<String>, ConfigError> {
    let mut result = Vec::new();
    for part in split_top_level(expression)? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut expanded = vec![String::new()];
        for segment in segments(expression, part)? {
            let choices = match segment {
                Segment::Literal(text) => vec![text.to_string()],
                Segment::Placeholder(body) => enumerate(expression, body)?,
            };
            expanded = expanded
                .iter()
                .flat_map(|prefix| choices.iter().map(move |c| format!("{prefix}{c}")))
                .collect();
        }
        result.extend(expanded);
    }
    if result.is_empty() {
        return Err(err(expression, "expression is empty"));
    }
    Ok(result)
}

/// A parsed template such as `t_order_${order_id % 4}`.
#[derive(Debug, Clone)]
pub struct InlineTemplate {
    source: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone)]
enum Part {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i128),
    Var(String),
    Neg(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

enum Evaluated {
    Int(i128),
    Value(Datum),
}

impl InlineTemplate {
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let mut parts = Vec::new();
        for segment in segments(expression, expression)? {
            match segment {
                Segment::Literal(text) => parts.push(Part::Literal(text.to_string())),
                Segment::Placeholder(body) => {
                    let tokens = tokenize(expression, body)?;
                    let mut parser = Parser {
                        source: expression,
                        tokens,
                        pos: 0,
                    };
                    let expr = parser.parse_expr()?;
                    if parser.pos != parser.tokens.len() {
                        return Err(err(expression, "unexpected trailing tokens"));
                    }
                    parts.push(Part::Expr(expr));
                }
            }
        }
        if !parts.iter().any(|p| matches!(p, Part::Expr(_))) {
            return Err(err(expression, "template has no ${...} placeholder"));
        }
        Ok(Self {
            source: expression.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names referenced by the template, first occurrence order.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        for part in &self.parts {
            if let Part::Expr(expr) = part {
                collect_vars(expr, &mut names);
            }
        }
        names
    }

    /// Render with variables resolved through `lookup`.
    pub fn render<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<Datum>,
    {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expr(expr) => match self.eval(expr, &lookup)? {
                    Evaluated::Int(v) => out.push_str(&v.to_string()),
                    Evaluated::Value(d) => out.push_str(&d.to_string()),
                },
            }
        }
        Ok(out)
    }

    fn eval<F>(&self, expr: &Expr, lookup: &F) -> Result<Evaluated, ConfigError>
    where
        F: Fn(&str) -> Option<Datum>,
    {
        match expr {
            Expr::Int(v) => Ok(Evaluated::Int(*v)),
            Expr::Var(name) => lookup(name)
                .map(Evaluated::Value)
                .ok_or_else(|| err(&self.source, &format!("no value bound for '{name}'"))),
            Expr::Neg(inner) => Ok(Evaluated::Int(-self.eval_int(inner, lookup)?)),
            Expr::Binary(lhs, op, rhs) => {
                let l = self.eval_int(lhs, lookup)?;
                let r = self.eval_int(rhs, lookup)?;
                let v = match op {
                    BinOp::Add => l.checked_add(r),
                    BinOp::Sub => l.checked_sub(r),
                    BinOp::Mul => l.checked_mul(r),
                    BinOp::Div => l.checked_div(r),
                    BinOp::Mod => l.checked_rem(r),
                };
                v.map(Evaluated::Int)
                    .ok_or_else(|| err(&self.source, "arithmetic overflow or division by zero"))
            }
        }
    }

    fn eval_int<F>(&self, expr: &Expr, lookup: &F) -> Result<i128, ConfigError>
    where
        F: Fn(&str) -> Option<Datum>,
    {
        match self.eval(expr, lookup)? {
            Evaluated::Int(v) => Ok(v),
            Evaluated::Value(d) => d.as_sharding_int().ok_or_else(|| {
                err(
                    &self.source,
                    &format!("value '{d}' of type {} is not an integer", d.kind_name()),
                )
            }),
        }
    }
}

fn collect_vars(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Int(_) => {}
        Expr::Var(name) => {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Expr::Neg(inner) => collect_vars(inner, names),
        Expr::Binary(l, _, r) => {
            collect_vars(l, names);
            collect_vars(r, names);
        }
    }
}

// ── Lexing helpers ──────────────────────────────────────────────────────────

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Split `text` into literal runs and placeholder bodies.
fn segments<'a>(source: &str, text: &'a str) -> Result<Vec<Segment<'a>>, ConfigError> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let open = match find_placeholder(rest) {
            Some(found) => found,
            None => {
                out.push(Segment::Literal(rest));
                break;
            }
        };
        let (start, body_start) = open;
        if start > 0 {
            out.push(Segment::Literal(&rest[..start]));
        }
        let close = rest[body_start..]
            .find('}')
            .ok_or_else(|| err(source, "unterminated placeholder"))?;
        out.push(Segment::Placeholder(&rest[body_start..body_start + close]));
        rest = &rest[body_start + close + 1..];
    }
    Ok(out)
}

/// Returns (placeholder start, body start) of the first `${` or `$->{`.
fn find_placeholder(text: &str) -> Option<(usize, usize)> {
    let dollar = text.find('$')?;
    let after = &text[dollar + 1..];
    if after.starts_with('{') {
        Some((dollar, dollar + 2))
    } else if after.starts_with("->{") {
        Some((dollar, dollar + 4))
    } else {
        find_placeholder(after).map(|(s, b)| (s + dollar + 1, b + dollar + 1))
    }
}

fn split_top_level(expression: &str) -> Result<Vec<&str>, ConfigError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (i, c) in expression.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(err(expression, "unbalanced '}'"));
                }
            }
            ',' if depth == 0 => {
                parts.push(&expression[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(err(expression, "unterminated placeholder"));
    }
    parts.push(&expression[last..]);
    Ok(parts)
}

fn enumerate(source: &str, body: &str) -> Result<Vec<String>, ConfigError> {
    let body = body.trim();
    if let Some(inner) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        let items: Vec<String> = inner
            .split(',')
            .map(|item| unquote(item.trim()).to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(err(source, "empty list placeholder"));
        }
        return Ok(items);
    }
    if let Some((lo, hi)) = body.split_once("..") {
        let lo: i64 = lo
            .trim()
            .parse()
            .map_err(|_| err(source, &format!("invalid range start in '{body}'")))?;
        let hi: i64 = hi
            .trim()
            .parse()
            .map_err(|_| err(source, &format!("invalid range end in '{body}'")))?;
        if lo > hi {
            return Err(err(source, &format!("range '{body}' is descending")));
        }
        return Ok((lo..=hi).map(|v| v.to_string()).collect());
    }
    Ok(vec![unquote(body).to_string()])
}

fn unquote(s: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i128),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(source: &str, body: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let v = text
                    .parse()
                    .map_err(|_| err(source, &format!("integer literal '{text}' too large")))?;
                tokens.push(Token::Int(v));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            other => return Err(err(source, &format!("unexpected character '{other}'"))),
        }
    }
    if tokens.is_empty() {
        return Err(err(source, "empty placeholder"));
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_expr(&mut self) -> Result<Expr, ConfigError> {
        let mut lhs = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.parse_term()?;
            let op = if op == '+' { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ConfigError> {
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            let op = match op {
                '*' => BinOp::Mul,
                '/' => BinOp::Div,
                _ => BinOp::Mod,
            };
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConfigError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ConfigError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| err(self.source, "unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Int(v) => Ok(Expr::Int(v)),
            Token::Ident(name) => Ok(Expr::Var(name)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(err(self.source, "missing ')'")),
                }
            }
            other => Err(err(self.source, &format!("unexpected token {other:?}"))),
        }
    }
}

fn err(expression: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidInlineExpression {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}
