//! Tokenizer for filter expressions.

use crate::ast::{OpKind, Operator};
use crate::error::{RuleError, RuleResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    LParen,
    RParen,
    And,
    Or,
    Op(Operator),
    Str(String),
    Num(f64),
    /// Bare identifier: field paths, `@request.*`, `@collection.*`, keywords.
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | ':')
}

pub(crate) fn tokenize(input: &str) -> RuleResult<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let peek = chars.get(i + 1).map(|(_, c)| *c);
        let peek2 = chars.get(i + 2).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line comment.
        if c == '/' && peek == Some('/') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        let push = |tokens: &mut Vec<Spanned>, token| tokens.push(Spanned { token, position: pos });

        match c {
            '(' => {
                push(&mut tokens, Token::LParen);
                i += 1;
            }
            ')' => {
                push(&mut tokens, Token::RParen);
                i += 1;
            }
            '&' if peek == Some('&') => {
                push(&mut tokens, Token::And);
                i += 2;
            }
            '|' if peek == Some('|') => {
                push(&mut tokens, Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    let ch = chars[j].1;
                    if ch == '\\' && chars.get(j + 1).map(|(_, c)| *c) == Some(quote) {
                        value.push(quote);
                        j += 2;
                        continue;
                    }
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    value.push(ch);
                    j += 1;
                }
                if !closed {
                    return Err(RuleError::syntax(pos, "unterminated string literal"));
                }
                push(&mut tokens, Token::Str(value));
                i = j + 1;
            }
            '?' | '=' | '!' | '>' | '<' | '~' => {
                let (op, len) = operator_at(c, peek, peek2).ok_or_else(|| {
                    RuleError::syntax(pos, format!("unexpected character '{c}'"))
                })?;
                push(&mut tokens, Token::Op(op));
                i += len;
            }
            c if c.is_ascii_digit() || (c == '-' && peek.is_some_and(|p| p.is_ascii_digit())) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                let text = &input[pos..end];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| RuleError::syntax(pos, format!("invalid number '{text}'")))?;
                push(&mut tokens, Token::Num(n));
                i = j;
            }
            c if is_ident_char(c) => {
                let mut j = i + 1;
                while j < chars.len() && is_ident_char(chars[j].1) {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                push(&mut tokens, Token::Ident(input[pos..end].to_string()));
                i = j;
            }
            other => {
                return Err(RuleError::syntax(pos, format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

/// Recognizes an operator starting at `c`, returning it and its length.
fn operator_at(c: char, next: Option<char>, after: Option<char>) -> Option<(Operator, usize)> {
    let (any, c, next, offset) = if c == '?' {
        (true, next?, after, 1)
    } else {
        (false, c, next, 0)
    };
    let (kind, len) = match (c, next) {
        ('!', Some('=')) => (OpKind::Neq, 2),
        ('!', Some('~')) => (OpKind::NotLike, 2),
        ('>', Some('=')) => (OpKind::Gte, 2),
        ('<', Some('=')) => (OpKind::Lte, 2),
        ('=', _) => (OpKind::Eq, 1),
        ('>', _) => (OpKind::Gt, 1),
        ('<', _) => (OpKind::Lt, 1),
        ('~', _) => (OpKind::Like, 1),
        _ => return None,
    };
    Some((Operator { kind, any }, len + offset))
}
