//! Template evaluation
//!
//! Source entries with the `.tmpl` suffix are run through a
//! [`TemplateEngine`] before they are compared with the target. The built-in
//! [`SimpleEngine`] understands a small Go-template-like language:
//!
//! - `{{ .a.b }}`: look up a field in the data; a missing field is an error
//! - `{{ name }}`: call a registered zero-argument function
//! - `{{ "text" }}`, `{{ true }}`, `{{ 42 }}`: literals
//! - `{{ if X }}...{{ else }}...{{ end }}`: conditionals
//! - `{{/* comment */}}`, and `{{-` / `-}}` to trim adjacent whitespace

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Why a template could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template {name}: {message}")]
    Syntax { name: String, message: String },

    #[error("template {name}: undefined field {field}")]
    UndefinedField { name: String, field: String },

    #[error("template {name}: function {function:?} not defined")]
    UnknownFunction { name: String, function: String },

    #[error("template {name}: error calling {function}: {message}")]
    Func {
        name: String,
        function: String,
        message: String,
    },

    #[error("template {name}: not evaluated")]
    NotEvaluated { name: String },
}

/// A template function: no arguments, a value or an error message.
pub type TemplateFunc = dyn Fn() -> Result<Value, String>;

/// Functions callable from templates, by name.
#[derive(Default)]
pub struct TemplateFuncs {
    funcs: BTreeMap<String, Box<TemplateFunc>>,
}

impl TemplateFuncs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any previous function.
    pub fn insert(&mut self, name: impl Into<String>, f: impl Fn() -> Result<Value, String> + 'static) {
        self.funcs.insert(name.into(), Box::new(f));
    }

    pub fn with(mut self, name: impl Into<String>, f: impl Fn() -> Result<Value, String> + 'static) -> Self {
        self.insert(name, f);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Call `name`, or `None` if no such function is registered.
    pub fn call(&self, name: &str) -> Option<Result<Value, String>> {
        self.funcs.get(name).map(|f| f())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.funcs.keys().map(String::as_str)
    }
}

impl fmt::Debug for TemplateFuncs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Evaluates template source into bytes.
pub trait TemplateEngine {
    fn execute(
        &self,
        name: &str,
        source: &[u8],
        data: &Value,
        funcs: &TemplateFuncs,
    ) -> Result<Vec<u8>, TemplateError>;
}

/// The built-in template language described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEngine;

impl TemplateEngine for SimpleEngine {
    fn execute(
        &self,
        name: &str,
        source: &[u8],
        data: &Value,
        funcs: &TemplateFuncs,
    ) -> Result<Vec<u8>, TemplateError> {
        let source = std::str::from_utf8(source).map_err(|e| syntax(name, format!("invalid UTF-8: {e}")))?;
        let nodes = Parser { name, funcs }.parse(&split_actions(name, source)?)?;

        let mut out = String::new();
        Evaluator { name, data, funcs }.render(&nodes, &mut out)?;
        Ok(out.into_bytes())
    }
}

fn syntax(name: &str, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        name: name.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'s> {
    Text(&'s str),
    Action(&'s str),
}

/// Split source into literal text and the trimmed insides of `{{ }}`.
fn split_actions<'s>(name: &str, source: &'s str) -> Result<Vec<Segment<'s>>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while let Some(open) = rest.find("{{") {
        let mut text = &rest[..open];
        let inner_start = &rest[open + 2..];
        let close = inner_start
            .find("}}")
            .ok_or_else(|| syntax(name, "unclosed action"))?;
        let mut action = &inner_start[..close];

        if trim_next {
            text = text.trim_start();
        }
        if let Some(stripped) = action.strip_prefix("- ") {
            text = text.trim_end();
            action = stripped;
        }
        trim_next = false;
        if let Some(stripped) = action.strip_suffix(" -") {
            trim_next = true;
            action = stripped;
        }

        segments.push(Segment::Text(text));
        segments.push(Segment::Action(action.trim()));
        rest = &inner_start[close + 2..];
    }

    segments.push(Segment::Text(if trim_next { rest.trim_start() } else { rest }));
    Ok(segments)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
}

fn tokenize(name: &str, action: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    None => return Err(syntax(name, "unterminated quoted string")),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(escaped @ ('"' | '\\')) => value.push(escaped),
                        Some(other) => {
                            return Err(syntax(name, format!("unknown escape sequence \\{other}")));
                        }
                        None => return Err(syntax(name, "unterminated quoted string")),
                    },
                    Some(other) => value.push(other),
                }
            }
            tokens.push(Token::Str(value));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Dot,
    Field(Vec<String>),
    Call(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output(Expr),
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

enum Terminator {
    Else,
    End,
}

struct Parser<'a> {
    name: &'a str,
    funcs: &'a TemplateFuncs,
}

impl Parser<'_> {
    fn parse(&self, segments: &[Segment<'_>]) -> Result<Vec<Node>, TemplateError> {
        let mut iter = segments.iter();
        match self.block(&mut iter)? {
            (nodes, None) => Ok(nodes),
            (_, Some(Terminator::Else)) => Err(syntax(self.name, "unexpected {{else}}")),
            (_, Some(Terminator::End)) => Err(syntax(self.name, "unexpected {{end}}")),
        }
    }

    fn block<'s>(
        &self,
        iter: &mut std::slice::Iter<'_, Segment<'s>>,
    ) -> Result<(Vec<Node>, Option<Terminator>), TemplateError> {
        let mut nodes = Vec::new();

        while let Some(segment) = iter.next() {
            let action = match segment {
                Segment::Text(text) => {
                    if !text.is_empty() {
                        nodes.push(Node::Text((*text).to_string()));
                    }
                    continue;
                }
                Segment::Action(action) => *action,
            };

            if action.starts_with("/*") && action.ends_with("*/") {
                continue;
            }

            let tokens = tokenize(self.name, action)?;
            match tokens.first() {
                None => return Err(syntax(self.name, "missing value for command")),
                Some(Token::Word(word)) if word == "end" && tokens.len() == 1 => {
                    return Ok((nodes, Some(Terminator::End)));
                }
                Some(Token::Word(word)) if word == "else" && tokens.len() == 1 => {
                    return Ok((nodes, Some(Terminator::Else)));
                }
                Some(Token::Word(word)) if word == "if" => {
                    let cond = self.expr(&tokens[1..])?;
                    let (then, terminator) = self.block(iter)?;
                    let otherwise = match terminator {
                        Some(Terminator::End) => Vec::new(),
                        Some(Terminator::Else) => match self.block(iter)? {
                            (otherwise, Some(Terminator::End)) => otherwise,
                            (_, Some(Terminator::Else)) => {
                                return Err(syntax(self.name, "expected {{end}}; found {{else}}"));
                            }
                            (_, None) => return Err(syntax(self.name, "unexpected EOF")),
                        },
                        None => return Err(syntax(self.name, "unexpected EOF")),
                    };
                    nodes.push(Node::If {
                        cond,
                        then,
                        otherwise,
                    });
                }
                Some(_) => nodes.push(Node::Output(self.expr(&tokens)?)),
            }
        }
        Ok((nodes, None))
    }

    fn expr(&self, tokens: &[Token]) -> Result<Expr, TemplateError> {
        let expr = match tokens.first() {
            None => return Err(syntax(self.name, "missing value for command")),
            Some(Token::Str(value)) => Expr::Literal(Value::String(value.clone())),
            Some(Token::Word(word)) => self.word(word)?,
        };
        if tokens.len() > 1 {
            return Err(syntax(
                self.name,
                format!("unexpected {:?} after value", tokens[1]),
            ));
        }
        Ok(expr)
    }

    fn word(&self, word: &str) -> Result<Expr, TemplateError> {
        if word == "." {
            return Ok(Expr::Dot);
        }
        if let Some(path) = word.strip_prefix('.') {
            let fields: Vec<String> = path.split('.').map(str::to_string).collect();
            if fields.iter().any(String::is_empty) {
                return Err(syntax(self.name, format!("bad field reference {word}")));
            }
            return Ok(Expr::Field(fields));
        }
        match word {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "nil" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }
        if word.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
            return serde_json::from_str::<serde_json::Number>(word)
                .map(|n| Expr::Literal(Value::Number(n)))
                .map_err(|_| syntax(self.name, format!("bad number syntax: {word}")));
        }
        if self.funcs.contains(word) {
            Ok(Expr::Call(word.to_string()))
        } else {
            Err(TemplateError::UnknownFunction {
                name: self.name.to_string(),
                function: word.to_string(),
            })
        }
    }
}

struct Evaluator<'a> {
    name: &'a str,
    data: &'a Value,
    funcs: &'a TemplateFuncs,
}

impl Evaluator<'_> {
    fn render(&self, nodes: &[Node], out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => match self.eval(expr)? {
                    Value::String(s) => out.push_str(&s),
                    Value::Null => {}
                    other => out.push_str(&other.to_string()),
                },
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if truthy(&self.eval(cond)?) { then } else { otherwise };
                    self.render(branch, out)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr) -> Result<Value, TemplateError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Dot => Ok(self.data.clone()),
            Expr::Field(path) => {
                let mut value = self.data;
                for field in path {
                    value = value.get(field).ok_or_else(|| TemplateError::UndefinedField {
                        name: self.name.to_string(),
                        field: format!(".{}", path.join(".")),
                    })?;
                }
                Ok(value.clone())
            }
            Expr::Call(function) => match self.funcs.call(function) {
                Some(Ok(value)) => Ok(value),
                Some(Err(message)) => Err(TemplateError::Func {
                    name: self.name.to_string(),
                    function: function.clone(),
                    message,
                }),
                None => Err(TemplateError::UnknownFunction {
                    name: self.name.to_string(),
                    function: function.clone(),
                }),
            },
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
