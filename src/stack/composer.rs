//! # Resource Composer
//!
//! Minimal resource-composition surface the injection engine needs: composed manifests
//! keyed by resource id, lookup by kind, and a path-merge primitive.
//!
//! Merge rules at the target path:
//! - missing location: the value is written as-is
//! - array + array: elements are appended
//! - array + anything else: the value is appended as one element
//! - object + object: deep merge with the same rules
//! - equal scalars: no-op
//! - any other combination is rejected

use crate::error::{Result, SecretError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ResourceComposer {
    resources: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl ResourceComposer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, id: &str, manifest: Value) -> Result<&mut Self> {
        if self.resources.contains_key(id) {
            return Err(SecretError::Configuration(format!(
                "Resource '{id}' is already defined in this stack"
            )));
        }
        if !manifest.is_object() {
            return Err(SecretError::Configuration(format!(
                "Resource '{id}' must be a mapping"
            )));
        }
        self.resources.insert(id.to_string(), manifest);
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.resources.get(id)
    }

    #[must_use]
    pub fn resources(&self) -> &BTreeMap<String, Value> {
        &self.resources
    }

    #[must_use]
    pub fn into_resources(self) -> BTreeMap<String, Value> {
        self.resources
    }

    /// Ids of resources whose `kind` matches, case-insensitively, in id order
    #[must_use]
    pub fn find_resource_ids_by_kind(&self, kind: &str) -> Vec<String> {
        self.resources
            .iter()
            .filter(|(_, manifest)| {
                manifest
                    .get("kind")
                    .and_then(Value::as_str)
                    .is_some_and(|k| k.eq_ignore_ascii_case(kind))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Merge `value` into resource `id` at a dotted path such as `spec.template.spec.containers[0].env`
    pub fn inject(&mut self, id: &str, path: &str, value: Value) -> Result<()> {
        let segments = parse_path(path)?;
        let resource = self.resources.get_mut(id).ok_or_else(|| {
            SecretError::InjectionResolution(format!("Resource '{id}' does not exist in this stack"))
        })?;

        let mut current = resource;
        for (position, segment) in segments.iter().enumerate() {
            let walked = render_path(&segments[..=position]);
            current = match segment {
                Segment::Key(key) => {
                    let object = current.as_object_mut().ok_or_else(|| {
                        SecretError::InjectionResolution(format!(
                            "Cannot descend into '{walked}' of resource '{id}': parent is not a mapping"
                        ))
                    })?;
                    object
                        .entry(key.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                }
                Segment::Index(index) => {
                    let array = current.as_array_mut().ok_or_else(|| {
                        SecretError::InjectionResolution(format!(
                            "Cannot index '{walked}' of resource '{id}': parent is not a list"
                        ))
                    })?;
                    let length = array.len();
                    array.get_mut(*index).ok_or_else(|| {
                        SecretError::InjectionResolution(format!(
                            "Index out of bounds at '{walked}' of resource '{id}' (length {length})"
                        ))
                    })?
                }
            };
        }

        // a freshly created placeholder is replaced outright
        if current.as_object().is_some_and(Map::is_empty) && !value.is_object() {
            *current = value;
            return Ok(());
        }
        merge_value(current, value, &format!("{id}:{path}"))
    }
}

fn merge_value(existing: &mut Value, incoming: Value, location: &str) -> Result<()> {
    match (existing, incoming) {
        (Value::Array(items), Value::Array(new_items)) => {
            items.extend(new_items);
            Ok(())
        }
        (Value::Array(items), other) => {
            items.push(other);
            Ok(())
        }
        (Value::Object(object), Value::Object(new_object)) => {
            for (key, value) in new_object {
                match object.get_mut(&key) {
                    Some(slot) => merge_value(slot, value, &format!("{location}.{key}"))?,
                    None => {
                        object.insert(key, value);
                    }
                }
            }
            Ok(())
        }
        (existing, incoming) if *existing == incoming => Ok(()),
        (existing, incoming) => Err(SecretError::InjectionResolution(format!(
            "Cannot merge {} into {} at '{location}'",
            type_name(&incoming),
            type_name(existing)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    crate::provider::common::json_type_name(value)
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let invalid = || SecretError::InjectionResolution(format!("Invalid target path '{path}'"));
    if path.trim().is_empty() {
        return Err(invalid());
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() {
            return Err(invalid());
        }
        segments.push(Segment::Key(key.to_string()));

        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Ok(segments)
}

fn render_path(segments: &[Segment]) -> String {
    let mut rendered = String::new();
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(key);
            }
            Segment::Index(index) => {
                rendered.push_str(&format!("[{index}]"));
            }
        }
    }
    rendered
}
