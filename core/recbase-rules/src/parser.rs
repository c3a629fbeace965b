//! Recursive-descent parser: `||` binds looser than `&&`.

use crate::ast::{Comparison, Expr, Modifier, Operand, Source};
use crate::error::{RuleError, RuleResult};
use crate::lexer::{tokenize, Spanned, Token};
use recbase_types::Value;

/// Parses an expression into an unchecked syntax tree.
pub fn parse(input: &str) -> RuleResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(RuleError::syntax(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(RuleError::syntax(extra.position, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.position).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn or_expr(&mut self) -> RuleResult<Expr> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> RuleResult<Expr> {
        let mut left = self.term()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.term()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> RuleResult<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            let at = self.position();
            match self.next() {
                Some(Spanned {
                    token: Token::RParen, ..
                }) => return Ok(inner),
                _ => return Err(RuleError::syntax(at, "expected ')'")),
            }
        }
        self.comparison()
    }

    fn comparison(&mut self) -> RuleResult<Expr> {
        let left = self.operand()?;
        let at = self.position();
        let op = match self.next() {
            Some(Spanned {
                token: Token::Op(op), ..
            }) => op,
            _ => return Err(RuleError::syntax(at, "expected comparison operator")),
        };
        let right = self.operand()?;
        Ok(Expr::Cmp(Comparison { left, op, right }))
    }

    fn operand(&mut self) -> RuleResult<Operand> {
        let at = self.position();
        match self.next() {
            Some(Spanned {
                token: Token::Str(s), ..
            }) => Ok(Operand::Literal(Value::Text(s))),
            Some(Spanned {
                token: Token::Num(n), ..
            }) => Ok(Operand::Literal(Value::Number(n))),
            Some(Spanned {
                token: Token::Ident(ident),
                position,
            }) => parse_identifier(&ident, position),
            _ => Err(RuleError::syntax(at, "expected operand")),
        }
    }
}

fn parse_identifier(ident: &str, position: usize) -> RuleResult<Operand> {
    match ident {
        "true" => return Ok(Operand::Literal(Value::Bool(true))),
        "false" => return Ok(Operand::Literal(Value::Bool(false))),
        "null" => return Ok(Operand::Literal(Value::Null)),
        "@now" => return Ok(Operand::Now),
        "@request.method" => return Ok(Operand::Method),
        "@request.context" => return Ok(Operand::Context),
        _ => {}
    }

    if let Some(name) = ident.strip_prefix("@request.query.") {
        return single_name(name, position).map(Operand::Query);
    }
    if let Some(name) = ident.strip_prefix("@request.headers.") {
        return single_name(name, position).map(|n| Operand::Header(n.to_ascii_lowercase()));
    }

    let (path, modifier) = split_modifier(ident, position)?;
    let (source, rest) = if let Some(rest) = path.strip_prefix("@request.auth.") {
        (Source::Auth, rest)
    } else if let Some(rest) = path.strip_prefix("@request.body.") {
        (Source::Body, rest)
    } else if let Some(rest) = path.strip_prefix("@collection.") {
        let (name, rest) = rest
            .split_once('.')
            .ok_or_else(|| RuleError::syntax(position, "expected @collection.<name>.<field>"))?;
        (Source::Collection(name.to_string()), rest)
    } else if path.starts_with('@') {
        return Err(RuleError::syntax(position, format!("unknown identifier '{path}'")));
    } else {
        (Source::Record, path)
    };

    let segments: Vec<String> = rest.split('.').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty() || s.contains('@')) {
        return Err(RuleError::syntax(position, format!("invalid field path '{path}'")));
    }
    Ok(Operand::Path {
        source,
        segments,
        modifier,
    })
}

fn single_name(name: &str, position: usize) -> RuleResult<String> {
    if name.is_empty() || name.contains(['.', ':', '@']) {
        return Err(RuleError::syntax(position, format!("invalid parameter name '{name}'")));
    }
    Ok(name.to_string())
}

fn split_modifier(ident: &str, position: usize) -> RuleResult<(&str, Option<Modifier>)> {
    let Some((path, modifier)) = ident.split_once(':') else {
        return Ok((ident, None));
    };
    let modifier = match modifier {
        "isset" => Modifier::IsSet,
        "length" => Modifier::Length,
        "lower" => Modifier::Lower,
        other => {
            return Err(RuleError::syntax(position, format!("unknown modifier ':{other}'")));
        }
    };
    Ok((path, Some(modifier)))
}
