//! Pretty printer for the instruction language AST
//!
//! `parse(print(ast))` reproduces `ast` up to whitespace: this is exercised
//! by the round-trip property test in `mnemo-kernel`.

use crate::parser::{Atom, Binding, Expr, Metadata};
use std::fmt::Write;

/// Render an expression back to instruction-language source text.
pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Atom { value, .. } => write_atom(out, value),
        Expr::Query { intent, meta, .. } => {
            write!(out, "(QUERY ").unwrap();
            write_expr(out, intent);
            write_optional_metadata(out, meta);
            out.push(')');
        }
        Expr::Execute { tool, args, meta, .. } => {
            write!(out, "(EXECUTE {}", tool).unwrap();
            write_args(out, args);
            write_optional_metadata(out, meta);
            out.push(')');
        }
        Expr::SandboxedExecute { tool, args, limits, .. } => {
            write!(out, "(SANDBOXED-EXECUTE {}", tool).unwrap();
            write_args(out, args);
            write_optional_metadata(out, limits);
            out.push(')');
        }
        Expr::Plan { steps, .. } => {
            out.push_str("(PLAN");
            write_args(out, steps);
            out.push(')');
        }
        Expr::Communicate { recipient, message, .. } => {
            out.push_str("(COMMUNICATE ");
            write_expr(out, recipient);
            out.push(' ');
            write_expr(out, message);
            out.push(')');
        }
        Expr::Let { bindings, body, .. } => {
            out.push_str("(LET (");
            for (i, Binding { name, value }) in bindings.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write!(out, "({} ", name).unwrap();
                write_expr(out, value);
                out.push(')');
            }
            out.push_str(") ");
            write_expr(out, body);
            out.push(')');
        }
        Expr::Try { body, fail_body, .. } => {
            out.push_str("(TRY ");
            write_expr(out, body);
            out.push_str(" ON-FAIL ");
            write_expr(out, fail_body);
            out.push(')');
        }
        Expr::Await { event, meta, .. } => {
            out.push_str("(AWAIT ");
            write_expr(out, event);
            write_optional_metadata(out, meta);
            out.push(')');
        }
        Expr::Clarify { question, options, .. } => {
            out.push_str("(CLARIFY ");
            write_expr(out, question);
            write_args(out, options);
            out.push(')');
        }
        Expr::Event { meta, .. } => {
            out.push_str("(EVENT ");
            write_metadata(out, meta);
            out.push(')');
        }
    }
}

fn write_args(out: &mut String, args: &[Expr]) {
    for arg in args {
        out.push(' ');
        write_expr(out, arg);
    }
}

fn write_atom(out: &mut String, atom: &Atom) {
    match atom {
        Atom::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
        Atom::Number(n) => write!(out, "{}", n).unwrap(),
        Atom::Boolean(b) => write!(out, "{}", b).unwrap(),
        Atom::Identifier(id) => out.push_str(id),
        Atom::Variable(v) => write!(out, "${}", v).unwrap(),
    }
}

fn write_optional_metadata(out: &mut String, meta: &Option<Metadata>) {
    if let Some(meta) = meta {
        out.push(' ');
        write_metadata(out, meta);
    }
}

fn write_metadata(out: &mut String, meta: &Metadata) {
    out.push('{');
    for (i, (key, value)) in meta.entries.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{}=", key).unwrap();
        write_atom(out, value);
    }
    out.push('}');
}
