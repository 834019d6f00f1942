//! JSON body transformation: dot-path add/remove/rename/modify/filter over
//! `serde_json::Value` (spec §4.6).

use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone)]
pub enum JsonOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Rename { from: String, to: String },
    Modify { path: String, value: Value },
    /// Retains only array entries at `path` satisfying `predicate`.
    Filter { path: String, predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync> },
}

impl std::fmt::Debug for JsonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonOp::Add { path, value } => f.debug_struct("Add").field("path", path).field("value", value).finish(),
            JsonOp::Remove { path } => f.debug_struct("Remove").field("path", path).finish(),
            JsonOp::Rename { from, to } => f.debug_struct("Rename").field("from", from).field("to", to).finish(),
            JsonOp::Modify { path, value } => f.debug_struct("Modify").field("path", path).field("value", value).finish(),
            JsonOp::Filter { path, .. } => f.debug_struct("Filter").field("path", path).finish(),
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Walks to the parent map of the final path segment, creating intermediate
/// maps on demand. Returns `None` if a non-terminal segment addresses a
/// non-object value.
fn walk_to_parent_mut<'a>(root: &'a mut Value, segments: &[&str]) -> Option<(&'a mut Map<String, Value>, &'a str)> {
    let (last, init) = segments.split_last()?;
    let mut current = root;
    for segment in init {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let obj = current.as_object_mut()?;
        current = obj.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    Some((current.as_object_mut()?, last))
}

fn read_path<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// An ordered list of JSON operations. An unknown operation or a failing
/// operation is recorded and skipped; the last known-good value is carried
/// forward to the next operation (spec §4.6).
#[derive(Clone, Default)]
pub struct JsonTransform {
    ops: Vec<JsonOp>,
}

impl std::fmt::Debug for JsonTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonTransform").field("ops", &self.ops).finish()
    }
}

impl JsonTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, path: impl Into<String>, value: Value) -> Self {
        self.ops.push(JsonOp::Add { path: path.into(), value });
        self
    }

    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.ops.push(JsonOp::Remove { path: path.into() });
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.ops.push(JsonOp::Rename { from: from.into(), to: to.into() });
        self
    }

    pub fn modify(mut self, path: impl Into<String>, value: Value) -> Self {
        self.ops.push(JsonOp::Modify { path: path.into(), value });
        self
    }

    pub fn filter<F>(mut self, path: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.ops.push(JsonOp::Filter { path: path.into(), predicate: Arc::new(predicate) });
        self
    }

    /// Applies every operation in order. Each operation's failure is
    /// swallowed; the document from before the failed op is kept and the
    /// next operation runs against it.
    pub fn apply(&self, value: Value) -> Value {
        let mut current = value;
        for op in &self.ops {
            let candidate = current.clone();
            match self.apply_one(op, candidate) {
                Some(next) => current = next,
                None => continue,
            }
        }
        current
    }

    fn apply_one(&self, op: &JsonOp, mut value: Value) -> Option<Value> {
        match op {
            JsonOp::Add { path, value: new_value } => {
                let segments = split_path(path);
                let (parent, key) = walk_to_parent_mut(&mut value, &segments)?;
                parent.insert(key.to_string(), new_value.clone());
                Some(value)
            }
            JsonOp::Remove { path } => {
                let segments = split_path(path);
                if let Some((last, init)) = segments.split_last() {
                    if let Some(parent) = navigate_object_mut(&mut value, init) {
                        parent.remove(*last);
                    }
                }
                Some(value)
            }
            JsonOp::Rename { from, to } => {
                let from_segments = split_path(from);
                let existing = read_path(&value, &from_segments).cloned();
                let Some(existing) = existing else {
                    return Some(value);
                };
                if let Some((last, init)) = from_segments.split_last() {
                    if let Some(parent) = navigate_object_mut(&mut value, init) {
                        parent.remove(*last);
                    }
                }
                let to_segments = split_path(to);
                let (parent, key) = walk_to_parent_mut(&mut value, &to_segments)?;
                parent.insert(key.to_string(), existing);
                Some(value)
            }
            JsonOp::Modify { path, value: new_value } => {
                let segments = split_path(path);
                if read_path(&value, &segments).is_none() {
                    return Some(value);
                }
                if let Some((last, init)) = segments.split_last() {
                    if let Some(parent) = navigate_object_mut(&mut value, init) {
                        if parent.contains_key(*last) {
                            parent.insert(last.to_string(), new_value.clone());
                        }
                    }
                }
                Some(value)
            }
            JsonOp::Filter { path, predicate } => {
                let segments = split_path(path);
                if let Some((last, init)) = segments.split_last() {
                    if let Some(parent) = navigate_object_mut(&mut value, init) {
                        if let Some(Value::Array(items)) = parent.get_mut(*last) {
                            items.retain(|item| predicate(item));
                        }
                    }
                }
                Some(value)
            }
        }
    }
}

fn navigate_object_mut<'a>(root: &'a mut Value, segments: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut current = root;
    for segment in segments {
        current = current.as_object_mut()?.get_mut(*segment)?;
    }
    current.as_object_mut()
}
