//! Splits template source into literal text and tokenized `{{ }}` actions.

/// Token inside an action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.`
    Dot,
    /// `.a.b`
    Field(Vec<String>),
    /// `$` or `$.a.b`
    Root(Vec<String>),
    Ident(String),
    Str(String),
    Number(f64),
    Bool(bool),
    Nil,
    LParen,
    RParen,
    Pipe,
}

/// Top-level piece of a template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action(Vec<Token>),
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Lex `source` into items. Trim markers are applied to neighbouring text and
/// comments are dropped.
pub(crate) fn lex(source: &str) -> Result<Vec<Item>, String> {
    let mut items = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while let Some(open) = rest.find(OPEN) {
        let mut text = &rest[..open];
        if trim_next {
            text = text.trim_start();
        }
        let mut inner = &rest[open + OPEN.len()..];
        if has_trim_marker(inner) {
            text = text.trim_end();
            inner = &inner[1..];
        }
        if !text.is_empty() {
            items.push(Item::Text(text.to_string()));
        }

        let (tokens, consumed, trim_after) = if inner.trim_start().starts_with("/*") {
            let (consumed, trim_after) = skip_comment(inner)?;
            (None, consumed, trim_after)
        } else {
            let (tokens, consumed, trim_after) = lex_action(inner)?;
            (Some(tokens), consumed, trim_after)
        };
        if let Some(tokens) = tokens {
            items.push(Item::Action(tokens));
        }
        trim_next = trim_after;
        rest = &inner[consumed..];
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        items.push(Item::Text(tail.to_string()));
    }
    Ok(items)
}

/// `{{- ` trims only when the dash is followed by whitespace; `{{-3}}` is a number.
fn has_trim_marker(inner: &str) -> bool {
    let mut chars = inner.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Returns bytes consumed (including the closing delimiter) and whether the
/// comment closed with a right trim marker.
fn skip_comment(inner: &str) -> Result<(usize, bool), String> {
    let start = inner.find("/*").unwrap_or(0);
    let end = inner[start..]
        .find("*/")
        .map(|i| start + i + 2)
        .ok_or_else(|| "unclosed comment".to_string())?;
    let after = &inner[end..];
    if after.starts_with(CLOSE) {
        Ok((end + CLOSE.len(), false))
    } else if after.starts_with(" -}}") {
        Ok((end + 4, true))
    } else {
        Err("comment ends before closing delimiter".to_string())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lex one action body. Returns its tokens, bytes consumed up to and including
/// `}}`, and whether a right trim marker was present.
fn lex_action(inner: &str) -> Result<(Vec<Token>, usize, bool), String> {
    let chars: Vec<(usize, char)> = inner.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map_or(inner.len(), |(b, _)| *b);
    let mut tokens = Vec::new();
    let mut i = 0;

    loop {
        let ws_start = i;
        while i < chars.len() && chars[i].1.is_whitespace() {
            i += 1;
        }
        let rest = &inner[byte_at(i)..];
        if rest.starts_with("-}}") && i > ws_start {
            return Ok((tokens, byte_at(i) + 3, true));
        }
        if rest.starts_with(CLOSE) {
            return Ok((tokens, byte_at(i) + CLOSE.len(), false));
        }
        let Some(&(_, c)) = chars.get(i) else {
            return Err("unclosed action".to_string());
        };

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '.' => {
                let (chain, next) = lex_chain(&chars, i);
                tokens.push(if chain.is_empty() { Token::Dot } else { Token::Field(chain) });
                i = next;
            }
            '$' => {
                if chars.get(i + 1).is_some_and(|(_, c)| is_ident_char(*c)) {
                    return Err("template variables other than $ are not supported".to_string());
                }
                let (chain, next) = lex_chain(&chars, i + 1);
                tokens.push(Token::Root(chain));
                i = next;
            }
            '"' => {
                let (value, next) = lex_quoted(&chars, i + 1)?;
                tokens.push(Token::Str(value));
                i = next;
            }
            '`' => {
                let start = i + 1;
                let end = (start..chars.len())
                    .find(|&j| chars[j].1 == '`')
                    .ok_or_else(|| "unterminated raw quoted string".to_string())?;
                tokens.push(Token::Str(inner[byte_at(start)..byte_at(end)].to_string()));
                i = end + 1;
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+')
                    && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while let Some(&(_, n)) = chars.get(i) {
                    let exponent_sign = (n == '-' || n == '+')
                        && matches!(chars[i - 1].1, 'e' | 'E');
                    if n.is_ascii_digit() || n == '.' || n == 'e' || n == 'E' || n == '_' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text = inner[byte_at(start)..byte_at(i)].replace('_', "");
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("bad number syntax: {:?}", text))?;
                tokens.push(Token::Number(number));
            }
            c if is_ident_start(c) => {
                let start = i;
                while chars.get(i).is_some_and(|(_, n)| is_ident_char(*n)) {
                    i += 1;
                }
                let word = &inner[byte_at(start)..byte_at(i)];
                tokens.push(match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    _ => Token::Ident(word.to_string()),
                });
            }
            other => return Err(format!("unexpected {:?} in action", other)),
        }
    }
}

/// Lex a `.a.b` chain starting at the dot at `i`. An empty chain means a bare dot.
fn lex_chain(chars: &[(usize, char)], mut i: usize) -> (Vec<String>, usize) {
    let mut chain = Vec::new();
    while chars.get(i).is_some_and(|(_, c)| *c == '.')
        && chars.get(i + 1).is_some_and(|(_, c)| is_ident_start(*c))
    {
        i += 1;
        let mut name = String::new();
        while let Some(&(_, c)) = chars.get(i) {
            if !is_ident_char(c) {
                break;
            }
            name.push(c);
            i += 1;
        }
        chain.push(name);
    }
    if chain.is_empty() && chars.get(i).is_some_and(|(_, c)| *c == '.') {
        i += 1;
    }
    (chain, i)
}

fn lex_quoted(chars: &[(usize, char)], mut i: usize) -> Result<(String, usize), String> {
    let mut value = String::new();
    loop {
        let Some(&(_, c)) = chars.get(i) else {
            return Err("unterminated quoted string".to_string());
        };
        i += 1;
        match c {
            '"' => return Ok((value, i)),
            '\n' => return Err("unterminated quoted string".to_string()),
            '\\' => {
                let Some(&(_, escaped)) = chars.get(i) else {
                    return Err("unterminated quoted string".to_string());
                };
                i += 1;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' | '"' | '\'' => escaped,
                    other => return Err(format!("unknown escape sequence \\{}", other)),
                });
            }
            _ => value.push(c),
        }
    }
}
