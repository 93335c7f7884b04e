//! Lexical scope stack for `LET` bindings and the `$error` binding `TRY`
//! introduces around its fail-body.

use crate::value::Value;
use std::collections::HashMap;

/// A stack of variable frames. `LET` pushes a frame before evaluating its
/// body and pops it afterward regardless of outcome, so bindings never leak
/// past the form that introduced them.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, Value>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { frames: vec![HashMap::new()] }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.frames
            .last_mut()
            .expect("scope stack always has at least one frame")
            .insert(name.into(), value);
    }

    /// Looks up a variable from the innermost frame outward.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }
}
