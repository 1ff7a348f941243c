//! Builds the node tree from lexed items.

use serde_json::Value;

use super::funcs;
use super::lex::{Item, Token};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipe),
    If(Branch),
    With(Branch),
    Range(Branch),
}

/// Shared shape of `if`, `with` and `range`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub pipe: Pipe,
    pub body: Vec<Node>,
    pub otherwise: Vec<Node>,
}

/// Commands separated by `|`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipe {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Dot,
    Field(Vec<String>),
    Root(Vec<String>),
    Func(String),
    Literal(Value),
    Nil,
    Sub(Pipe),
}

enum Terminator {
    End,
    Else,
    ElseIf(Pipe),
    ElseWith(Pipe),
    Eof,
}

#[derive(Clone, Copy)]
enum BranchKind {
    If,
    With,
    Range,
}

impl BranchKind {
    fn wrap(self, branch: Branch) -> Node {
        match self {
            BranchKind::If => Node::If(branch),
            BranchKind::With => Node::With(branch),
            BranchKind::Range => Node::Range(branch),
        }
    }
}

/// Parse lexed items into a node list.
pub(crate) fn parse(items: &[Item]) -> Result<Vec<Node>, String> {
    let mut pos = 0;
    let (nodes, terminator) = parse_list(items, &mut pos)?;
    match terminator {
        Terminator::Eof => Ok(nodes),
        Terminator::End => Err("unexpected {{end}}".to_string()),
        _ => Err("unexpected {{else}}".to_string()),
    }
}

fn parse_list(items: &[Item], pos: &mut usize) -> Result<(Vec<Node>, Terminator), String> {
    let mut nodes = Vec::new();
    while let Some(item) = items.get(*pos) {
        *pos += 1;
        let tokens = match item {
            Item::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                continue;
            }
            Item::Action(tokens) => tokens,
        };

        let keyword = match tokens.first() {
            Some(Token::Ident(word)) => word.as_str(),
            Some(_) => "",
            None => return Err("missing value for command".to_string()),
        };
        match keyword {
            "end" => {
                if tokens.len() > 1 {
                    return Err("unexpected tokens after {{end}}".to_string());
                }
                return Ok((nodes, Terminator::End));
            }
            "else" => {
                let terminator = match tokens.get(1) {
                    None => Terminator::Else,
                    Some(Token::Ident(word)) if word == "if" => {
                        Terminator::ElseIf(parse_pipe(&tokens[2..])?)
                    }
                    Some(Token::Ident(word)) if word == "with" => {
                        Terminator::ElseWith(parse_pipe(&tokens[2..])?)
                    }
                    Some(_) => return Err("unexpected tokens after {{else}}".to_string()),
                };
                return Ok((nodes, terminator));
            }
            "if" => nodes.push(parse_branch(BranchKind::If, &tokens[1..], items, pos)?),
            "with" => nodes.push(parse_branch(BranchKind::With, &tokens[1..], items, pos)?),
            "range" => nodes.push(parse_branch(BranchKind::Range, &tokens[1..], items, pos)?),
            "define" | "template" | "block" | "break" | "continue" => {
                return Err(format!("{{{{{}}}}} is not supported", keyword));
            }
            _ => nodes.push(Node::Action(parse_pipe(tokens)?)),
        }
    }
    Ok((nodes, Terminator::Eof))
}

fn parse_branch(
    kind: BranchKind,
    tokens: &[Token],
    items: &[Item],
    pos: &mut usize,
) -> Result<Node, String> {
    let pipe = parse_pipe(tokens)?;
    let (body, terminator) = parse_list(items, pos)?;
    let otherwise = match terminator {
        Terminator::End => Vec::new(),
        Terminator::Else => {
            let (otherwise, terminator) = parse_list(items, pos)?;
            match terminator {
                Terminator::End => otherwise,
                Terminator::Eof => return Err("unexpected EOF".to_string()),
                _ => return Err("expected {{end}} after {{else}}".to_string()),
            }
        }
        Terminator::ElseIf(next) => {
            vec![parse_chained(BranchKind::If, next, items, pos)?]
        }
        Terminator::ElseWith(next) => {
            if !matches!(kind, BranchKind::With) {
                return Err("{{else with}} outside {{with}}".to_string());
            }
            vec![parse_chained(BranchKind::With, next, items, pos)?]
        }
        Terminator::Eof => return Err("unexpected EOF".to_string()),
    };
    Ok(kind.wrap(Branch { pipe, body, otherwise }))
}

/// `{{else if}}` / `{{else with}}` share the enclosing `{{end}}`.
fn parse_chained(
    kind: BranchKind,
    pipe: Pipe,
    items: &[Item],
    pos: &mut usize,
) -> Result<Node, String> {
    let (body, terminator) = parse_list(items, pos)?;
    let otherwise = match terminator {
        Terminator::End => Vec::new(),
        Terminator::Else => {
            let (otherwise, terminator) = parse_list(items, pos)?;
            if !matches!(terminator, Terminator::End) {
                return Err("expected {{end}} after {{else}}".to_string());
            }
            otherwise
        }
        Terminator::ElseIf(next) => vec![parse_chained(BranchKind::If, next, items, pos)?],
        Terminator::ElseWith(next) => vec![parse_chained(BranchKind::With, next, items, pos)?],
        Terminator::Eof => return Err("unexpected EOF".to_string()),
    };
    Ok(kind.wrap(Branch { pipe, body, otherwise }))
}

/// Parse a complete pipeline from the tokens of one action.
pub(crate) fn parse_pipe(tokens: &[Token]) -> Result<Pipe, String> {
    let mut pos = 0;
    let pipe = parse_pipe_at(tokens, &mut pos)?;
    match tokens.get(pos) {
        None => Ok(pipe),
        Some(Token::RParen) => Err("unexpected right paren".to_string()),
        Some(other) => Err(format!("unexpected {:?} in pipeline", other)),
    }
}

fn parse_pipe_at(tokens: &[Token], pos: &mut usize) -> Result<Pipe, String> {
    let mut commands = Vec::new();
    loop {
        let command = parse_command(tokens, pos)?;
        if command.args.is_empty() {
            return Err("missing value for command".to_string());
        }
        if command.args.len() == 1 && command.args[0] == Arg::Nil {
            return Err("nil is not a command".to_string());
        }
        commands.push(command);
        match tokens.get(*pos) {
            Some(Token::Pipe) => *pos += 1,
            _ => return Ok(Pipe { commands }),
        }
    }
}

fn parse_command(tokens: &[Token], pos: &mut usize) -> Result<Command, String> {
    let mut args = Vec::new();
    while let Some(token) = tokens.get(*pos) {
        let arg = match token {
            Token::Pipe | Token::RParen => break,
            Token::Dot => Arg::Dot,
            Token::Field(chain) => Arg::Field(chain.clone()),
            Token::Root(chain) => Arg::Root(chain.clone()),
            Token::Str(s) => Arg::Literal(Value::String(s.clone())),
            Token::Number(n) => Arg::Literal(Value::from(*n)),
            Token::Bool(b) => Arg::Literal(Value::Bool(*b)),
            Token::Nil => Arg::Nil,
            Token::Ident(name) => {
                if !funcs::is_defined(name) {
                    return Err(format!("function {:?} not defined", name));
                }
                Arg::Func(name.clone())
            }
            Token::LParen => {
                *pos += 1;
                let inner = parse_pipe_at(tokens, pos)?;
                if tokens.get(*pos) != Some(&Token::RParen) {
                    return Err("unclosed left paren".to_string());
                }
                Arg::Sub(inner)
            }
        };
        *pos += 1;
        args.push(arg);
    }
    Ok(Command { args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::lex::lex;

    fn parse_source(source: &str) -> Result<Vec<Node>, String> {
        parse(&lex(source)?)
    }

    #[test]
    fn test_parse_if_else() {
        let nodes = parse_source("{{if .a}}yes{{else}}no{{end}}").unwrap();
        assert_eq!(nodes.len(), 1);
        let Node::If(branch) = &nodes[0] else {
            panic!("expected if node");
        };
        assert_eq!(branch.body, vec![Node::Text("yes".to_string())]);
        assert_eq!(branch.otherwise, vec![Node::Text("no".to_string())]);
    }

    #[test]
    fn test_parse_else_if_chain_shares_end() {
        let nodes = parse_source("{{if .a}}a{{else if .b}}b{{else}}c{{end}}tail").unwrap();
        assert_eq!(nodes.len(), 2);
        let Node::If(branch) = &nodes[0] else {
            panic!("expected if node");
        };
        let Node::If(nested) = &branch.otherwise[0] else {
            panic!("expected nested if");
        };
        assert_eq!(nested.otherwise, vec![Node::Text("c".to_string())]);
        assert_eq!(nodes[1], Node::Text("tail".to_string()));
    }

    #[test]
    fn test_parse_pipeline_and_parens() {
        let nodes = parse_source("{{(len .items) | print}}").unwrap();
        let Node::Action(pipe) = &nodes[0] else {
            panic!("expected action");
        };
        assert_eq!(pipe.commands.len(), 2);
        assert!(matches!(pipe.commands[0].args[0], Arg::Sub(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_source("{{if .a}}open").is_err());
        assert!(parse_source("{{end}}").is_err());
        assert!(parse_source("{{else}}").is_err());
        assert!(parse_source("{{nosuchfunc .a}}").is_err());
        assert!(parse_source("{{}}").is_err());
        assert!(parse_source("{{nil}}").is_err());
        assert!(parse_source("{{(eq .a 1}}").is_err());
        assert!(parse_source("{{.a)}}").is_err());
        assert!(parse_source(r#"{{template "x"}}"#).is_err());
    }
}
