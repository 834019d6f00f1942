//! Header transformation: add/remove/rename/regex-modify, applied in order
//! (spec §4.6).

use crate::request::Headers;
use regex::Regex;

#[derive(Debug, Clone)]
pub enum HeaderOp {
    Add { name: String, value: String },
    Remove { name: String },
    Rename { from: String, to: String },
    /// Strips every match of `pattern` from the header's value (spec §4.6:
    /// "a precompiled regex replacement that removes matches").
    Modify { name: String, pattern: Regex },
}

/// An ordered list of header operations applied left to right.
#[derive(Debug, Clone, Default)]
pub struct HeaderTransform {
    ops: Vec<HeaderOp>,
}

impl HeaderTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(HeaderOp::Add { name: name.into(), value: value.into() });
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.ops.push(HeaderOp::Remove { name: name.into() });
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.ops.push(HeaderOp::Rename { from: from.into(), to: to.into() });
        self
    }

    pub fn modify(mut self, name: impl Into<String>, pattern: Regex) -> Self {
        self.ops.push(HeaderOp::Modify { name: name.into(), pattern });
        self
    }

    /// Applies every operation in order, returning a new `Headers`.
    pub fn apply(&self, headers: &Headers) -> Headers {
        let mut result = headers.clone();
        for op in &self.ops {
            match op {
                HeaderOp::Add { name, value } => result.insert(name.clone(), value.clone()),
                HeaderOp::Remove { name } => {
                    result.remove(name);
                }
                HeaderOp::Rename { from, to } => result.rename(from, to),
                HeaderOp::Modify { name, pattern } => {
                    if let Some(current) = result.get(name) {
                        let replaced = pattern.replace_all(current, "").into_owned();
                        result.insert(name.clone(), replaced);
                    }
                }
            }
        }
        result
    }
}
