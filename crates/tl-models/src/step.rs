//! Assembly and template steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single named transformation operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, referenced by other steps through `use`
    pub name: String,
    /// Robot that performs the operation (e.g. `/image/resize`)
    pub robot: String,
    /// Robot parameters
    pub options: Map<String, Value>,
}

impl Step {
    pub fn new(name: impl Into<String>, robot: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            robot: robot.into(),
            options,
        }
    }

    /// Wire form of the step: its options plus the `robot` key.
    pub fn to_value(&self) -> Value {
        let mut map = self.options.clone();
        map.insert("robot".to_string(), Value::String(self.robot.clone()));
        Value::Object(map)
    }
}

/// Named steps of an assembly or template.
///
/// Step names are unique; adding a step under an existing name replaces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Steps {
    all: BTreeMap<String, Step>,
}

impl Steps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, replacing any step with the same name.
    pub fn add(&mut self, name: impl Into<String>, robot: impl Into<String>, options: Map<String, Value>) {
        let step = Step::new(name, robot, options);
        self.all.insert(step.name.clone(), step);
    }

    /// Remove the step with the given name, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<Step> {
        self.all.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.all.get(name)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.all.values()
    }

    /// Steps as the JSON object sent under the `steps` key.
    pub fn to_map(&self) -> Map<String, Value> {
        self.all
            .iter()
            .map(|(name, step)| (name.clone(), step.to_value()))
            .collect()
    }
}
