//! MACT text rendering.

use std::fmt::Write as _;

use crate::hash;
use crate::logic::{Container, FileRef, Logic, Tree, Value};

/// Render a logic tree in the MACT outline form.
#[must_use]
pub fn render(tree: &Tree) -> String {
    let mut out = String::new();
    write_tree(&mut out, tree, 0);
    out
}

fn tabs(level: usize) -> String {
    "\t".repeat(level)
}

fn write_tree(out: &mut String, tree: &Tree, level: usize) {
    match tree {
        Tree::Bank(container) => {
            let _ = write!(out, "{}Bank {}", tabs(level), container.title.display());
            write_container(out, container, level, false);
        }
        Tree::Node(container) => {
            let _ = write!(out, "{}Node {}", tabs(level), container.title.display());
            write_container(out, container, level, true);
        }
        Tree::FileReference(reference) => write_reference(out, reference, level),
    }
}

fn write_container(out: &mut String, container: &Container, level: usize, with_tracks: bool) {
    let _ = write!(out, "\n{}{{\n", tabs(level));
    let inner = level + 1;

    let _ = write!(out, "{}ConditionGroup", tabs(inner));
    let _ = write!(out, "\n{}{{", tabs(inner));
    write_logics(out, &container.conditions, inner + 1);
    let _ = write!(out, "\n{}}}\n", tabs(inner));

    if with_tracks {
        let _ = write!(out, "{}Tracks", tabs(inner));
        let _ = write!(out, "\n{}{{", tabs(inner));
        write_logics(out, &container.tracks, inner + 1);
        let _ = write!(out, "\n{}}}\n", tabs(inner));
    }

    for child in &container.children {
        write_tree(out, child, inner);
    }
    let _ = write!(out, "{}}}\n", tabs(level));
}

fn write_reference(out: &mut String, reference: &FileRef, level: usize) {
    let _ = write!(out, "{}FileReference", tabs(level));
    let _ = write!(out, "\n{}{{\n", tabs(level));
    let inner = tabs(level + 1);
    let _ = write!(out, "{inner}fileName\t\"{}\"\n", reference.file_name);
    let _ = write!(out, "{inner}path\t\"{}\"\n", reference.path);
    let include = if reference.include { "true" } else { "false" };
    let _ = write!(out, "{inner}includeFile\t{include}");
    let _ = write!(out, "\n{}}}\n", tabs(level));
}

/// Conditions of a group or tracks of a `Tracks` section.
fn write_logics(out: &mut String, logics: &[Logic], level: usize) {
    for logic in logics {
        let _ = write!(out, "\n{}{}", tabs(level), logic.title.display());
        let _ = write!(out, "\n{}{{\n", tabs(level));
        let inner = level + 1;
        for param in &logic.params {
            // the id-0 hash parameter never appears in text
            if param.id == Some(0) {
                continue;
            }
            match &param.value {
                Value::Group(group) => {
                    let _ = write!(out, "{}{}", tabs(inner), param.name);
                    let _ = write!(out, "\n{}{{", tabs(inner));
                    write_logics(out, group, inner + 1);
                    let _ = write!(out, "\n{}}}\n", tabs(inner));
                }
                value => {
                    let _ = write!(
                        out,
                        "{}{}\t{}\n",
                        tabs(inner),
                        param.name,
                        format_value(value)
                    );
                }
            }
        }
        let _ = write!(out, "{}}}", tabs(level));
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(v) => if *v { "true" } else { "false" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format!("{v:.6}"),
        Value::Bytes(bytes) => hash::pretty(*bytes),
        Value::Str(s) => format!("\"{s}\""),
        Value::HashedStr(s) => format!("h\"{s}\""),
        Value::Group(_) => hash::pretty([0; 4]),
    }
}
