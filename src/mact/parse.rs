//! MACT text parsing.
//!
//! Stage 1 turns the line-oriented text into a tree of keyword lists: words
//! split on whitespace except inside quotes, `#` comments, and `{`/`}` scopes
//! attached to the preceding keyword line. Stage 2 lifts that tree into the
//! typed [`crate::logic`] model.

use std::{error, fmt};

use log::warn;

use crate::hash;
use crate::logic::{Container, FileRef, Logic, Param, Title, Tree, Value, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The text contains no keyword lines at all.
    NoRoot,
    /// The root line is not a `Bank`, `Node` or `FileReference`.
    BadRoot(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoot => write!(f, "no root element in text"),
            Self::BadRoot(title) => write!(f, "root element {title:?} is not a tree node"),
        }
    }
}

impl error::Error for Error {}

/// One line of keywords plus the scope its braces introduced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeywordNode {
    pub keywords: Vec<String>,
    pub children: Vec<KeywordNode>,
}

/// Parse MACT text all the way to the typed tree.
pub fn parse(text: &str) -> Result<Tree, Error> {
    logic_tree(&keyword_tree(text)?)
}

/// Stage 1: build the keyword tree.
pub fn keyword_tree(text: &str) -> Result<KeywordNode, Error> {
    let mut stack = vec![KeywordNode::default()];

    for (line_no, line) in text.lines().enumerate() {
        let mut word = String::new();
        let mut quoting = false;
        // the node this line's words accumulate into, if any was started
        let mut open_line_node = false;

        let flush = |word: &mut String, stack: &mut Vec<KeywordNode>, open: &mut bool| {
            if word.is_empty() {
                return;
            }
            let scope = stack.last_mut().expect("scope stack is never empty");
            if *open {
                let node = scope.children.last_mut().expect("line node was pushed");
                node.keywords.push(std::mem::take(word));
            } else {
                scope.children.push(KeywordNode {
                    keywords: vec![std::mem::take(word)],
                    children: Vec::new(),
                });
                *open = true;
            }
        };

        for c in line.chars() {
            if c == '\r' {
                continue;
            }
            if !quoting {
                if c == '#' {
                    break;
                }
                if c.is_whitespace() {
                    flush(&mut word, &mut stack, &mut open_line_node);
                    continue;
                }
                if c == '{' {
                    flush(&mut word, &mut stack, &mut open_line_node);
                    let scope = stack.last_mut().expect("scope stack is never empty");
                    match scope.children.pop() {
                        Some(owner) => stack.push(owner),
                        None => {
                            warn!("unexpected '{{' on line {}", line_no + 1);
                        }
                    }
                    open_line_node = false;
                    continue;
                }
                if c == '}' {
                    flush(&mut word, &mut stack, &mut open_line_node);
                    if stack.len() > 1 {
                        let closed = stack.pop().expect("stack checked above");
                        stack
                            .last_mut()
                            .expect("scope stack is never empty")
                            .children
                            .push(closed);
                    } else {
                        warn!("unexpected '}}' on line {}", line_no + 1);
                    }
                    open_line_node = false;
                    continue;
                }
            }
            if c == '"' || c == '\'' {
                quoting = !quoting;
            }
            word.push(c);
        }
        flush(&mut word, &mut stack, &mut open_line_node);
    }

    while stack.len() > 1 {
        warn!("unclosed '{{' at end of text");
        let closed = stack.pop().expect("stack checked above");
        stack
            .last_mut()
            .expect("scope stack is never empty")
            .children
            .push(closed);
    }

    let mut root = stack.pop().expect("scope stack is never empty");
    match root.children.len() {
        0 => Err(Error::NoRoot),
        1 => Ok(root.children.remove(0)),
        n => {
            warn!("unexpected number of roots in keyword tree ({n}), keeping the first");
            Ok(root.children.remove(0))
        }
    }
}

/// Stage 2: lift a keyword tree into the typed logic tree.
pub fn logic_tree(root: &KeywordNode) -> Result<Tree, Error> {
    lift_tree(root).ok_or_else(|| Error::BadRoot(title_of(root).to_string()))
}

fn title_of(kw: &KeywordNode) -> &str {
    kw.keywords.first().map(String::as_str).unwrap_or("")
}

fn value_of(kw: &KeywordNode) -> Option<&str> {
    if kw.keywords.len() > 2 {
        warn!("unexpected number of keywords in {:?}", kw.keywords);
    }
    kw.keywords.get(1).map(String::as_str)
}

fn lift_tree(kw: &KeywordNode) -> Option<Tree> {
    match title_of(kw) {
        "Bank" => Some(Tree::Bank(lift_container(kw))),
        "Node" => Some(Tree::Node(lift_container(kw))),
        "FileReference" => Some(Tree::FileReference(lift_file_reference(kw))),
        title => {
            if value_of(kw).is_some() {
                return None;
            }
            warn!("unable to identify kind of {title:?}, treating as node");
            Some(Tree::Node(lift_container(kw)))
        }
    }
}

fn lift_container(kw: &KeywordNode) -> Container {
    let title = match value_of(kw) {
        Some(name) => Title::parse(name),
        None => {
            warn!("container {:?} has no title", title_of(kw));
            Title::Name(String::new())
        }
    };
    let mut container = Container {
        title,
        ..Container::default()
    };
    for child in &kw.children {
        match title_of(child) {
            "ConditionGroup" => {
                container
                    .conditions
                    .extend(child.children.iter().map(lift_logic));
            }
            "Tracks" => {
                container.tracks.extend(child.children.iter().map(lift_logic));
            }
            _ => match lift_tree(child) {
                Some(node) => container.children.push(node),
                None => {
                    warn!(
                        "dropping stray parameter {:?} under container {:?}",
                        title_of(child),
                        container.title.display()
                    );
                }
            },
        }
    }
    container
}

/// A condition or a track with its parameter list.
fn lift_logic(kw: &KeywordNode) -> Logic {
    Logic {
        title: Title::parse(title_of(kw)),
        params: kw.children.iter().map(lift_param).collect(),
    }
}

fn lift_param(kw: &KeywordNode) -> Param {
    let name = title_of(kw).to_string();
    let value = match value_of(kw) {
        Some(text) => parse_value(&name, text),
        None if !kw.children.is_empty() => {
            // inline condition group
            Value::Group(kw.children.iter().map(lift_logic).collect())
        }
        None => {
            warn!("parameter {name:?} has neither a value nor children");
            Value::Bytes([0; 4])
        }
    };
    Param {
        id: crate::logic::param_id_from_name(&name),
        name,
        value,
    }
}

fn parse_value(name: &str, text: &str) -> Value {
    match ValueKind::infer(text) {
        ValueKind::Bytes => match hash::parse_pretty(text) {
            Some(bytes) => Value::Bytes(bytes),
            None => {
                warn!("un-decodable hex {text:?} for {name:?}, writing zero");
                Value::Bytes([0; 4])
            }
        },
        ValueKind::Bool => {
            let upper = text.to_uppercase();
            Value::Bool(upper.contains('1') || upper.contains("TRUE"))
        }
        ValueKind::Str => Value::Str(strip_quotes(text).to_string()),
        ValueKind::HashedStr => Value::HashedStr(strip_quotes(&text[1..]).to_string()),
        ValueKind::Float => match text.parse::<f32>() {
            Ok(v) => Value::Float(v),
            Err(_) => {
                warn!("bad float {text:?} for {name:?}, writing zero");
                Value::Float(0.0)
            }
        },
        _ => match text.parse::<i32>() {
            Ok(v) => Value::Int(v),
            Err(_) => {
                warn!("bad integer {text:?} for {name:?}, writing zero");
                Value::Int(0)
            }
        },
    }
}

fn strip_quotes(text: &str) -> &str {
    let mut out = text;
    for quote in ['"', '\''] {
        if let Some(rest) = out.strip_prefix(quote) {
            out = rest.strip_suffix(quote).unwrap_or(rest);
        }
    }
    out
}

fn lift_file_reference(kw: &KeywordNode) -> FileRef {
    let mut file_name = None;
    let mut path = None;
    let mut include = false;
    for child in &kw.children {
        let value = value_of(child).unwrap_or("");
        match title_of(child) {
            "fileName" => file_name = Some(strip_quotes(value).to_string()),
            "path" => path = Some(strip_quotes(value).to_string()),
            "includeFile" => include = value.eq_ignore_ascii_case("true"),
            other => warn!("unknown FileReference field {other:?}"),
        }
    }
    if file_name.is_none() || path.is_none() {
        warn!("FileReference is missing fileName or path");
    }
    FileRef {
        file_name: file_name.unwrap_or_default(),
        path: path.unwrap_or_default(),
        include,
    }
}
